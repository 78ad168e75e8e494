//! Capability descriptors: what the server under test claims to support.
//!
//! Steps consult the descriptor before issuing requests so that an undeclared
//! parameter or interaction becomes a `Skip` without a network round trip.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde_json::Value;

use crate::error::{ConformanceError, Result};
use crate::http::{HttpClient, HttpRequest};

/// FHIR RESTful interaction codes as they appear in a CapabilityStatement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interaction {
    Read,
    Vread,
    Update,
    Patch,
    Delete,
    HistoryInstance,
    HistoryType,
    Create,
    SearchType,
}

impl Interaction {
    pub fn code(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Vread => "vread",
            Self::Update => "update",
            Self::Patch => "patch",
            Self::Delete => "delete",
            Self::HistoryInstance => "history-instance",
            Self::HistoryType => "history-type",
            Self::Create => "create",
            Self::SearchType => "search-type",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "read" => Self::Read,
            "vread" => Self::Vread,
            "update" => Self::Update,
            "patch" => Self::Patch,
            "delete" => Self::Delete,
            "history-instance" => Self::HistoryInstance,
            "history-type" => Self::HistoryType,
            "create" => Self::Create,
            "search-type" => Self::SearchType,
            _ => return None,
        })
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Read-only view of a server's declared capabilities.
pub trait CapabilityDescriptor: Send + Sync {
    /// Search parameter names declared for `resource_type`.
    fn supported_search_params(&self, resource_type: &str) -> BTreeSet<String>;

    fn supports_interaction(&self, _resource_type: &str, _interaction: Interaction) -> bool {
        true
    }

    /// Members of `params` that are not declared, in the order given.
    fn unsupported_search_params(&self, resource_type: &str, params: &[&str]) -> Vec<String> {
        let supported = self.supported_search_params(resource_type);
        params
            .iter()
            .filter(|p| !supported.contains(**p))
            .map(|p| (*p).to_string())
            .collect()
    }
}

/// Descriptor that declares support for everything.
///
/// Used when no CapabilityStatement is available for the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unrestricted;

impl CapabilityDescriptor for Unrestricted {
    fn supported_search_params(&self, _resource_type: &str) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn unsupported_search_params(&self, _resource_type: &str, _params: &[&str]) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Default)]
struct ResourceCapabilities {
    interactions: BTreeSet<String>,
    search_params: BTreeSet<String>,
}

/// Capabilities parsed from a FHIR `CapabilityStatement`.
#[derive(Debug, Clone, Default)]
pub struct ServerCapabilities {
    by_type: HashMap<String, ResourceCapabilities>,
}

impl ServerCapabilities {
    /// Build from a CapabilityStatement document.
    ///
    /// Every `rest` entry contributes; entries for the same type are merged.
    pub fn from_statement(statement: &Value) -> Result<Self> {
        if statement.get("resourceType").and_then(Value::as_str) != Some("CapabilityStatement") {
            return Err(ConformanceError::invalid_document(
                "expected a CapabilityStatement",
            ));
        }

        let mut by_type: HashMap<String, ResourceCapabilities> = HashMap::new();
        let resources = statement
            .get("rest")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|rest| rest.get("resource").and_then(Value::as_array))
            .flatten();

        for resource in resources {
            let Some(resource_type) = resource.get("type").and_then(Value::as_str) else {
                continue;
            };
            let entry = by_type.entry(resource_type.to_string()).or_default();
            entry.interactions.extend(names(resource, "interaction", "code"));
            entry.search_params.extend(names(resource, "searchParam", "name"));
        }

        tracing::debug!(resource_types = by_type.len(), "Parsed CapabilityStatement");
        Ok(Self { by_type })
    }

    /// Fetch `{base_url}/metadata` and parse it.
    pub async fn discover(client: &dyn HttpClient, base_url: &str) -> Result<Self> {
        let url = format!("{}/metadata", base_url.trim_end_matches('/'));
        let response = client.send(HttpRequest::get(url)).await?;
        if !response.is_success() {
            return Err(ConformanceError::invalid_document(format!(
                "metadata request returned HTTP {}",
                response.status
            )));
        }
        Self::from_statement(&response.body_json()?)
    }

    pub fn resource_types(&self) -> BTreeSet<&str> {
        self.by_type.keys().map(String::as_str).collect()
    }
}

fn names<'a>(resource: &'a Value, list: &str, field: &'a str) -> impl Iterator<Item = String> + 'a {
    resource
        .get(list)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(move |item| item.get(field).and_then(Value::as_str))
        .map(str::to_string)
}

impl CapabilityDescriptor for ServerCapabilities {
    fn supported_search_params(&self, resource_type: &str) -> BTreeSet<String> {
        self.by_type
            .get(resource_type)
            .map(|r| r.search_params.clone())
            .unwrap_or_default()
    }

    fn supports_interaction(&self, resource_type: &str, interaction: Interaction) -> bool {
        self.by_type
            .get(resource_type)
            .is_some_and(|r| r.interactions.contains(interaction.code()))
    }
}
