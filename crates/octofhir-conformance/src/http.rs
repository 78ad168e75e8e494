//! HTTP collaborator contract.
//!
//! The engine only needs "send a request, get status and body back". Retries,
//! pooling, TLS and timeouts belong to the implementation.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Value of query parameter `name`, if present.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Response with a JSON body and `application/fhir+json` content type.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), "application/fhir+json".into())],
            body: body.to_string().into_bytes(),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn body_json(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Transport used by a sequence run.
///
/// Implementations must be thread-safe (`Send + Sync`) because independent runs
/// may share one client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform one round trip. Non-2xx statuses are responses, not errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;

    async fn get(
        &self,
        url: &str,
        query: Vec<(String, String)>,
        headers: Vec<(String, String)>,
    ) -> Result<HttpResponse> {
        let mut request = HttpRequest::get(url).with_query(query);
        request.headers = headers;
        self.send(request).await
    }

    async fn post(
        &self,
        url: &str,
        query: Vec<(String, String)>,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    ) -> Result<HttpResponse> {
        let mut request = HttpRequest::post(url, body).with_query(query);
        request.headers = headers;
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_classification() {
        assert!(HttpResponse::new(201, "").is_success());
        assert!(!HttpResponse::new(302, "").is_success());
        assert!(HttpResponse::new(400, "").is_client_error());
        assert!(!HttpResponse::new(500, "").is_client_error());
    }

    #[test]
    fn test_json_response() {
        let resp = HttpResponse::json(200, &json!({"resourceType": "Bundle"}));
        assert_eq!(resp.header("Content-Type"), Some("application/fhir+json"));
        assert_eq!(resp.body_json().unwrap()["resourceType"], "Bundle");
    }

    #[test]
    fn test_invalid_body_json() {
        let resp = HttpResponse::new(200, "<html>");
        assert!(resp.body_json().is_err());
    }

    #[test]
    fn test_request_builders() {
        let req = HttpRequest::get("http://x/Observation")
            .with_query(vec![("patient".into(), "85".into())])
            .with_header("Accept", "application/fhir+json");

        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.query_param("patient"), Some("85"));
        assert_eq!(req.query_param("code"), None);
        assert_eq!(req.headers.len(), 1);
        assert_eq!(HttpMethod::Post.to_string(), "POST");
    }
}
