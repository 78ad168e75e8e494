use std::time::Duration;

use async_trait::async_trait;

use crate::config::ServerSettings;
use crate::error::Result;
use crate::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};

/// [`HttpClient`] backed by `reqwest`.
///
/// Adds the configured `Accept` header and bearer token to every request that
/// does not set them itself.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    http: reqwest::Client,
    accept: String,
    bearer_token: Option<String>,
}

impl ReqwestClient {
    pub fn new(settings: &ServerSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            accept: settings.accept.clone(),
            bearer_token: settings.bearer_token.clone(),
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            method,
            url,
            query,
            headers,
            body,
        } = request;
        let has_header = |name: &str| headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name));

        let http_method = match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };
        let mut req = self.http.request(http_method, &url);
        if !query.is_empty() {
            req = req.query(&query);
        }
        if !has_header("accept") {
            req = req.header("Accept", &self.accept);
        }
        if let Some(token) = &self.bearer_token
            && !has_header("authorization")
        {
            req = req.bearer_auth(token);
        }
        if body.is_some() && !has_header("content-type") {
            req = req.header("Content-Type", "application/fhir+json");
        }
        for (name, value) in &headers {
            req = req.header(name, value);
        }
        if let Some(body) = body {
            req = req.body(body);
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let response_headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = resp.bytes().await?.to_vec();

        tracing::debug!(method = %method, url = %url, status, "HTTP round trip");

        Ok(HttpResponse {
            status,
            headers: response_headers,
            body,
        })
    }
}
