//! Search validation.
//!
//! A [`SearchStep`] checks that a search by a combination of parameters returns
//! matching resources while tolerating two kinds of server variance:
//!
//! - servers that reject an underspecified search with `400` plus an
//!   OperationOutcome and require a status filter; the search is retried once
//!   with every known status code for the resource type;
//! - servers that index only one of `value` and `system|value` for coded
//!   parameters; both forms are issued and must both return matches.
//!
//! Parameters the server does not declare are never sent: the step skips
//! before any network round trip.

use std::fmt;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use crate::assertions::{
    expect_operation_outcome, no_resources_message, undocumented_rejection_warning,
};
use crate::capability::Interaction;
use crate::context::{ExecutionContext, keys};
use crate::date::dates_match;
use crate::document::{self, SearchValue};
use crate::outcome::{Verdict, fail, skip, skip_if};
use crate::reference::same_target;
use crate::scope::StepScope;
use crate::step::{StepBody, TestStep};

// ============================================================================
// Query descriptor
// ============================================================================

/// One parameter value of a search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryValue {
    pub value: String,
    pub system: Option<String>,
    /// Send as `system|value` instead of `value`.
    pub qualify_with_system: bool,
}

impl QueryValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            system: None,
            qualify_with_system: false,
        }
    }

    /// Wire form of the value.
    pub fn render(&self) -> String {
        match (&self.system, self.qualify_with_system) {
            (Some(system), true) => format!("{system}|{}", self.value),
            _ => self.value.clone(),
        }
    }
}

impl From<SearchValue> for QueryValue {
    fn from(value: SearchValue) -> Self {
        Self {
            value: value.value,
            system: value.system,
            qualify_with_system: false,
        }
    }
}

/// Parameter name/value pairs for one search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub resource_type: String,
    pub params: IndexMap<String, QueryValue>,
}

impl SearchQuery {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            params: IndexMap::new(),
        }
    }

    /// Set `name`, replacing an existing value in place.
    pub fn with(mut self, name: impl Into<String>, value: QueryValue) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(name, value)| (name.clone(), value.render()))
            .collect()
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .to_query_pairs()
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        write!(f, "{}?{}", self.resource_type, pairs.join("&"))
    }
}

// ============================================================================
// Parameter definitions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Token,
    Reference,
    String,
    Date,
    Other,
}

/// Where a parameter's search value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Resources of the searched type saved by an earlier discovery step.
    Discovered,
    /// Resources stored as `Vec<serde_json::Value>` under `key`.
    FromContext { key: String },
    Fixed(SearchValue),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParamDef {
    pub name: String,
    /// Dotted path of the element the parameter indexes.
    pub path: String,
    pub kind: ParamKind,
    /// The server should also accept `system|value`.
    pub supports_system: bool,
    pub source: ValueSource,
}

impl SearchParamDef {
    pub fn new(name: impl Into<String>, path: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
            supports_system: false,
            source: ValueSource::Discovered,
        }
    }

    pub fn token(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, path, ParamKind::Token)
    }

    pub fn reference(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, path, ParamKind::Reference)
    }

    pub fn string(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, path, ParamKind::String)
    }

    pub fn date(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, path, ParamKind::Date)
    }

    pub fn with_system(mut self) -> Self {
        self.supports_system = true;
        self
    }

    pub fn fixed(mut self, value: impl Into<String>) -> Self {
        self.source = ValueSource::Fixed(SearchValue::new(value));
        self
    }

    pub fn from_context(mut self, key: impl Into<String>) -> Self {
        self.source = ValueSource::FromContext { key: key.into() };
        self
    }

    /// Search values the element at `path` in `resource` offers.
    fn candidates(&self, resource: &Value) -> Vec<SearchValue> {
        document::resolve(resource, &self.path)
            .into_iter()
            .flat_map(document::candidates)
            .collect()
    }
}

// ============================================================================
// Status fallback
// ============================================================================

/// Status parameter a server may require, with every code it can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFilter {
    pub param: &'static str,
    pub path: &'static str,
    pub codes: &'static [&'static str],
}

impl StatusFilter {
    /// Comma-joined codes, i.e. a search for any of them.
    pub fn joined(&self) -> String {
        self.codes.join(",")
    }
}

/// Status filter used when a search for `resource_type` is rejected.
pub fn status_filter_for(resource_type: &str) -> Option<StatusFilter> {
    let filter = match resource_type {
        "AllergyIntolerance" => status(
            "clinical-status",
            "clinicalStatus",
            &["active", "inactive", "resolved"],
        ),
        "CarePlan" => status(
            "status",
            "status",
            &[
                "draft",
                "active",
                "on-hold",
                "revoked",
                "completed",
                "entered-in-error",
                "unknown",
            ],
        ),
        "CareTeam" => status(
            "status",
            "status",
            &["proposed", "active", "suspended", "inactive", "entered-in-error"],
        ),
        "Condition" => status(
            "clinical-status",
            "clinicalStatus",
            &[
                "active",
                "recurrence",
                "relapse",
                "inactive",
                "remission",
                "resolved",
            ],
        ),
        "DiagnosticReport" => status(
            "status",
            "status",
            &[
                "registered",
                "partial",
                "preliminary",
                "final",
                "amended",
                "corrected",
                "appended",
                "cancelled",
                "entered-in-error",
                "unknown",
            ],
        ),
        "DocumentReference" => status(
            "status",
            "status",
            &["current", "superseded", "entered-in-error"],
        ),
        "Encounter" => status(
            "status",
            "status",
            &[
                "planned",
                "arrived",
                "triaged",
                "in-progress",
                "onleave",
                "finished",
                "cancelled",
                "entered-in-error",
                "unknown",
            ],
        ),
        "Goal" => status(
            "lifecycle-status",
            "lifecycleStatus",
            &[
                "proposed",
                "planned",
                "accepted",
                "active",
                "on-hold",
                "completed",
                "cancelled",
                "entered-in-error",
                "rejected",
            ],
        ),
        "Immunization" => status(
            "status",
            "status",
            &["completed", "entered-in-error", "not-done"],
        ),
        "MedicationRequest" => status(
            "status",
            "status",
            &[
                "active",
                "on-hold",
                "cancelled",
                "completed",
                "entered-in-error",
                "stopped",
                "draft",
                "unknown",
            ],
        ),
        "Observation" => status(
            "status",
            "status",
            &[
                "registered",
                "preliminary",
                "final",
                "amended",
                "corrected",
                "cancelled",
                "entered-in-error",
                "unknown",
            ],
        ),
        "Procedure" => status(
            "status",
            "status",
            &[
                "preparation",
                "in-progress",
                "not-done",
                "on-hold",
                "stopped",
                "completed",
                "entered-in-error",
                "unknown",
            ],
        ),
        _ => return None,
    };
    Some(filter)
}

const fn status(
    param: &'static str,
    path: &'static str,
    codes: &'static [&'static str],
) -> StatusFilter {
    StatusFilter { param, path, codes }
}

// ============================================================================
// Step
// ============================================================================

enum Fetched {
    /// `400` with an OperationOutcome.
    Rejected,
    Resources(Vec<Value>),
}

/// Search by a combination of parameters and verify the results match them.
#[derive(Debug, Clone)]
pub struct SearchStep {
    resource_type: String,
    params: Vec<SearchParamDef>,
    save_as: Option<String>,
}

impl SearchStep {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            params: Vec::new(),
            save_as: None,
        }
    }

    pub fn param(mut self, param: SearchParamDef) -> Self {
        self.params.push(param);
        self
    }

    /// Store the matching resources under `key` as `Vec<serde_json::Value>`.
    pub fn save_as(mut self, key: impl Into<String>) -> Self {
        self.save_as = Some(key.into());
        self
    }

    /// Store the matching resources where [`ValueSource::Discovered`] looks for them.
    pub fn save_discovered(self) -> Self {
        let key = keys::resources(&self.resource_type);
        self.save_as(key)
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Wrap into a test step that requires every context key the values come from.
    pub fn into_step(self, id: impl Into<String>, title: impl Into<String>) -> TestStep {
        let prerequisites = self.context_keys();
        let mut step = TestStep::new(id, title, self);
        for key in prerequisites {
            step = step.requires(key);
        }
        step
    }

    fn source_key(&self, source: &ValueSource) -> Option<String> {
        match source {
            ValueSource::Discovered => Some(keys::resources(&self.resource_type)),
            ValueSource::FromContext { key } => Some(key.clone()),
            ValueSource::Fixed(_) => None,
        }
    }

    fn context_keys(&self) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for key in self.params.iter().filter_map(|p| self.source_key(&p.source)) {
            if !found.contains(&key) {
                found.push(key);
            }
        }
        found
    }

    fn check_capabilities(&self, scope: &StepScope) -> Verdict {
        let rt = &self.resource_type;
        let capabilities = scope.capabilities();
        skip_if(
            !capabilities.supports_interaction(rt, Interaction::SearchType),
            format!("This server does not support {rt} search operation(s) according to conformance statement."),
        )?;

        let names: Vec<&str> = self.params.iter().map(|p| p.name.as_str()).collect();
        let unsupported = capabilities.unsupported_search_params(rt, &names);
        skip_if(
            !unsupported.is_empty(),
            format!(
                "This server does not support the following search parameters for {rt}: {}",
                unsupported.join(", ")
            ),
        )
    }

    /// Resolve every parameter value.
    ///
    /// Parameters reading the same context key take their values from the
    /// first resource that resolves all of them; within an element the first
    /// candidate in document order wins.
    pub fn build_query(&self, context: &ExecutionContext) -> Verdict<SearchQuery> {
        let mut resolved: IndexMap<&str, SearchValue> = IndexMap::new();
        let mut groups: IndexMap<String, Vec<&SearchParamDef>> = IndexMap::new();
        for param in &self.params {
            match (&param.source, self.source_key(&param.source)) {
                (ValueSource::Fixed(value), _) => {
                    resolved.insert(param.name.as_str(), value.clone());
                }
                (_, Some(key)) => groups.entry(key).or_default().push(param),
                (_, None) => {}
            }
        }

        for (key, params) in &groups {
            let resources = context.require::<Vec<Value>>(key)?;
            let found = resources.iter().find_map(|resource| {
                params
                    .iter()
                    .map(|p| document::resolve_search_value(resource, &p.path).map(|v| (p.name.as_str(), v)))
                    .collect::<Option<Vec<_>>>()
            });

            let Some(values) = found else {
                let unresolved: Vec<&str> = params
                    .iter()
                    .filter(|p| {
                        !resources
                            .iter()
                            .any(|r| document::resolve_search_value(r, &p.path).is_some())
                    })
                    .map(|p| p.name.as_str())
                    .collect();
                let names = if unresolved.is_empty() {
                    params.iter().map(|p| p.name.as_str()).collect()
                } else {
                    unresolved
                };
                return skip(format!(
                    "Could not resolve all parameters ({}) in any resource.",
                    names.join(", ")
                ));
            };
            resolved.extend(values);
        }

        let query = self.params.iter().fold(
            SearchQuery::new(&self.resource_type),
            |query, param| match resolved.get(param.name.as_str()) {
                Some(value) => query.with(&param.name, value.clone().into()),
                None => query,
            },
        );
        Ok(query)
    }

    /// `query` with every system-capable value expressed as `system|value`,
    /// or `None` when no value has a system.
    pub fn qualified(&self, query: &SearchQuery) -> Option<SearchQuery> {
        let mut qualified = query.clone();
        let mut changed = false;
        for param in self.params.iter().filter(|p| p.supports_system) {
            if let Some(value) = qualified.params.get_mut(&param.name)
                && value.system.is_some()
            {
                value.qualify_with_system = true;
                changed = true;
            }
        }
        changed.then_some(qualified)
    }

    /// Issue `query` and collect every page of results.
    async fn fetch(&self, scope: &mut StepScope, query: &SearchQuery) -> Verdict<Fetched> {
        tracing::debug!(query = %query, "Issuing search");
        let response = scope
            .search(&self.resource_type, query.to_query_pairs())
            .await?;
        if response.status == 400 {
            let issues = expect_operation_outcome(&response)?;
            scope.warn(undocumented_rejection_warning(400, &issues));
            return Ok(Fetched::Rejected);
        }
        let resources = scope
            .fetch_all_bundled_resources(&response, &self.resource_type)
            .await?;
        Ok(Fetched::Resources(resources))
    }

    /// Primary search, retried once with a status filter when rejected.
    async fn search_with_status_fallback(
        &self,
        scope: &mut StepScope,
        query: SearchQuery,
    ) -> Verdict<(SearchQuery, Vec<Value>, Option<StatusFilter>)> {
        let rt = &self.resource_type;
        if let Fetched::Resources(resources) = self.fetch(scope, &query).await? {
            skip_if(resources.is_empty(), no_resources_message(rt))?;
            return Ok((query, resources, None));
        }

        let Some(filter) = status_filter_for(rt) else {
            return fail(format!(
                "Server rejected the search {query} and no {rt} status values are known to retry with."
            ));
        };
        if query.params.contains_key(filter.param) {
            return fail(format!(
                "Bad response code: expected 200, but found 400. The search {query} already filters on {}.",
                filter.param
            ));
        }
        let retry = query.with(filter.param, QueryValue::new(filter.joined()));
        scope.warn(format!(
            "The search was rejected; retrying as {retry}. The server may require a {} parameter that it does not document.",
            filter.param
        ));

        let Fetched::Resources(resources) = self.fetch(scope, &retry).await? else {
            return fail(format!(
                "Bad response code: expected 200, but found 400. The search {retry} was rejected even with a {} filter.",
                filter.param
            ));
        };
        skip_if(resources.is_empty(), no_resources_message(rt))?;
        Ok((retry, resources, Some(filter)))
    }

    /// Every returned resource must satisfy every parameter of `query`.
    fn validate(
        &self,
        scope: &mut StepScope,
        query: &SearchQuery,
        resources: &[Value],
        status_filter: Option<StatusFilter>,
    ) -> Verdict {
        let base_url = scope.config().server.base_url.clone();
        let mut first_mismatch = None;
        let mut invalid = 0u64;

        for resource in resources {
            let mismatch = query.params.iter().find_map(|(name, requested)| {
                let (kind, candidates) = match self.params.iter().find(|p| &p.name == name) {
                    Some(param) => (param.kind, param.candidates(resource)),
                    None => match status_filter.filter(|f| f.param == name.as_str()) {
                        Some(filter) => (
                            ParamKind::Token,
                            document::resolve(resource, filter.path)
                                .into_iter()
                                .flat_map(document::candidates)
                                .collect(),
                        ),
                        None => return None,
                    },
                };
                if satisfies(kind, &candidates, requested, &base_url) {
                    return None;
                }
                let found = if candidates.is_empty() {
                    "none".to_string()
                } else {
                    candidates
                        .iter()
                        .map(|c| c.value.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                Some(format!(
                    "{name} in {} ({found}) does not match {name} requested ({})",
                    document::label(resource),
                    requested.render()
                ))
            });

            if let Some(message) = mismatch {
                invalid += 1;
                if first_mismatch.is_none() {
                    first_mismatch = Some(message);
                }
            }
        }

        match first_mismatch {
            Some(message) => {
                scope
                    .context_mut()
                    .increment(&keys::invalid_count(&self.resource_type), invalid);
                fail(message)
            }
            None => Ok(()),
        }
    }
}

/// Whether any candidate satisfies the requested value.
///
/// A comma in the requested value means any of the listed values.
fn satisfies(
    kind: ParamKind,
    candidates: &[SearchValue],
    requested: &QueryValue,
    base_url: &str,
) -> bool {
    requested.value.split(',').any(|wanted| {
        candidates.iter().any(|candidate| match kind {
            ParamKind::Reference => same_target(&candidate.value, wanted, Some(base_url)),
            ParamKind::Token => {
                candidate.value == wanted
                    && (!requested.qualify_with_system || candidate.system == requested.system)
            }
            ParamKind::String => candidate
                .value
                .to_lowercase()
                .starts_with(&wanted.to_lowercase()),
            ParamKind::Date => dates_match(&candidate.value, wanted),
            ParamKind::Other => candidate.value == wanted,
        })
    })
}

#[async_trait]
impl StepBody for SearchStep {
    async fn run(&self, scope: &mut StepScope) -> Verdict {
        self.check_capabilities(scope)?;
        let query = self.build_query(scope.context())?;

        let (query, resources, status_filter) =
            self.search_with_status_fallback(scope, query).await?;
        self.validate(scope, &query, &resources, status_filter)?;

        if let Some(qualified) = self.qualified(&query) {
            let Fetched::Resources(found) = self.fetch(scope, &qualified).await? else {
                return fail(format!(
                    "Bad response code: expected 200, but found 400. The search {qualified} was rejected."
                ));
            };
            if found.is_empty() {
                return fail(format!(
                    "The search {qualified} returned no {} resources, but the same search without coding systems did.",
                    self.resource_type
                ));
            }
            self.validate(scope, &qualified, &found, status_filter)?;
        }

        if let Some(key) = &self.save_as {
            tracing::debug!(key = %key, count = resources.len(), "Saving search results");
            scope.context_mut().set(key.clone(), resources);
        }
        Ok(())
    }
}
