use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::assertions::{expect_json, expect_resource_type, expect_status};
use crate::capability::CapabilityDescriptor;
use crate::config::HarnessConfig;
use crate::context::ExecutionContext;
use crate::document;
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::outcome::{Outcome, Verdict, fail, omit};

/// Everything a step body can touch while it runs.
///
/// Owns the run's [`ExecutionContext`] for the duration of one step and hands
/// it back to the runner afterwards, together with the warnings the step
/// recorded.
pub struct StepScope {
    context: ExecutionContext,
    client: Arc<dyn HttpClient>,
    capabilities: Arc<dyn CapabilityDescriptor>,
    config: Arc<HarnessConfig>,
    warnings: Vec<String>,
}

impl StepScope {
    pub fn new(
        context: ExecutionContext,
        client: Arc<dyn HttpClient>,
        capabilities: Arc<dyn CapabilityDescriptor>,
        config: Arc<HarnessConfig>,
    ) -> Self {
        Self {
            context,
            client,
            capabilities,
            config,
            warnings: Vec::new(),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.context
    }

    pub fn capabilities(&self) -> &dyn CapabilityDescriptor {
        self.capabilities.as_ref()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Record a non-fatal observation about the server.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(warning = %message, "Step warning");
        self.warnings.push(message);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Hand back the context and warnings once the step is over.
    pub fn into_parts(self) -> (ExecutionContext, Vec<String>) {
        (self.context, self.warnings)
    }

    /// Absolute URL for `path` under the configured base URL.
    ///
    /// Absolute URLs (e.g. Bundle `next` links) are returned unchanged.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.config.server.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Omit the step when no bearer token is configured.
    pub fn require_token(&self) -> Verdict<&str> {
        match self.config.server.bearer_token.as_deref() {
            Some(token) if !token.is_empty() => Ok(token),
            _ => omit("No bearer token is configured for this run."),
        }
    }

    // ========================================================================
    // HTTP
    // ========================================================================

    /// Send `request`; transport failures become `Outcome::Error`.
    pub async fn send(&self, request: HttpRequest) -> Verdict<HttpResponse> {
        let label = format!("{} {}", request.method, request.url);
        self.client
            .send(request)
            .await
            .map_err(|err| Outcome::error(format!("{label} could not be completed"), err))
    }

    pub async fn get(&self, path: &str, query: Vec<(String, String)>) -> Verdict<HttpResponse> {
        self.send(HttpRequest::get(self.url(path)).with_query(query))
            .await
    }

    /// `GET {base}/{resource_type}?{query}`
    pub async fn search(
        &self,
        resource_type: &str,
        query: Vec<(String, String)>,
    ) -> Verdict<HttpResponse> {
        self.get(resource_type, query).await
    }

    /// `GET {base}/{resource_type}/{id}`
    pub async fn read(&self, resource_type: &str, id: &str) -> Verdict<HttpResponse> {
        self.get(&format!("{resource_type}/{id}"), Vec::new()).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Verdict<HttpResponse> {
        let bytes = serde_json::to_vec(body)
            .map_err(|err| Outcome::error("Request body could not be serialized", err.into()))?;
        self.send(HttpRequest::post(self.url(path), bytes)).await
    }

    /// Collect every `resource_type` entry of a searchset, following `next` links.
    ///
    /// Every page must be a 200 Bundle. Paging stops after `search.max_pages`
    /// pages; a page link the server already returned fails the step.
    pub async fn fetch_all_bundled_resources(
        &mut self,
        response: &HttpResponse,
        resource_type: &str,
    ) -> Verdict<Vec<Value>> {
        let max_pages = self.config.search.max_pages;
        let mut seen = HashSet::new();
        let mut resources = Vec::new();

        let mut page = bundle_page(response)?;
        let mut pages = 1;
        loop {
            resources.extend(
                document::bundle_resources(&page, Some(resource_type))
                    .into_iter()
                    .cloned(),
            );

            let Some(next) = document::next_link(&page).map(str::to_string) else {
                break;
            };
            if pages >= max_pages {
                self.warn(format!(
                    "Stopped following {resource_type} search pages after {max_pages} pages."
                ));
                break;
            }
            if !seen.insert(next.clone()) {
                return fail(format!(
                    "Server returned the same {resource_type} search page link more than once: {next}"
                ));
            }

            let response = self.get(&next, Vec::new()).await?;
            page = bundle_page(&response)?;
            pages += 1;
        }

        tracing::debug!(resource_type, pages, count = resources.len(), "Collected bundled resources");
        Ok(resources)
    }
}

fn bundle_page(response: &HttpResponse) -> Verdict<Value> {
    expect_status(response, &[200])?;
    let body = expect_json(response)?;
    expect_resource_type(&body, "Bundle")?;
    Ok(body)
}
