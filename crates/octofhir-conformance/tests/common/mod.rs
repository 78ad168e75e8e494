//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use octofhir_conformance::{
    CapabilityDescriptor, HarnessConfig, HttpClient, HttpRequest, HttpResponse, Result,
    SequenceRunner,
};
use serde_json::{Value, json};

pub const BASE_URL: &str = "http://fhir.test/r4";

type Route = dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync;

/// In-memory HTTP collaborator that answers from a routing closure and keeps
/// every request it saw.
pub struct ScriptedClient {
    route: Box<Route>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedClient {
    pub fn new(route: impl Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            route: Box::new(route),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Client that fails the test on any request.
    pub fn silent() -> Arc<Self> {
        Self::new(|req| panic!("unexpected request: {} {}", req.method, req.url))
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = (self.route)(&request);
        self.requests.lock().unwrap().push(request);
        Ok(response)
    }
}

/// Capability double declaring a fixed set of search parameters per type.
pub struct DeclaredParams(pub Vec<(&'static str, Vec<&'static str>)>);

impl CapabilityDescriptor for DeclaredParams {
    fn supported_search_params(&self, resource_type: &str) -> BTreeSet<String> {
        self.0
            .iter()
            .filter(|(rt, _)| *rt == resource_type)
            .flat_map(|(_, params)| params.iter().map(|p| p.to_string()))
            .collect()
    }
}

pub fn runner(client: Arc<dyn HttpClient>) -> SequenceRunner {
    SequenceRunner::new(client, HarnessConfig::for_server(BASE_URL))
}

pub fn searchset(resources: Vec<Value>) -> Value {
    let entries: Vec<Value> = resources
        .into_iter()
        .map(|resource| json!({ "resource": resource }))
        .collect();
    json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "total": entries.len(),
        "entry": entries
    })
}

pub fn operation_outcome(diagnostics: &str) -> Value {
    json!({
        "resourceType": "OperationOutcome",
        "issue": [{ "severity": "error", "code": "required", "diagnostics": diagnostics }]
    })
}

pub fn observation(id: &str, status: &str, code: &str) -> Value {
    json!({
        "resourceType": "Observation",
        "id": id,
        "status": status,
        "subject": { "reference": "Patient/85" },
        "code": { "coding": [{ "system": "http://loinc.org", "code": code }] }
    })
}
