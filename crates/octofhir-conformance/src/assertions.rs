//! Baseline response assertions used by step bodies.
//!
//! Each helper returns a [`Verdict`] so a step body can chain them with `?`;
//! the first violated expectation stops the body.

use serde_json::Value;

use crate::document;
use crate::http::HttpResponse;
use crate::outcome::{Outcome, Verdict, fail, skip};
use crate::scope::StepScope;

/// Fixed failure text for a 4xx response that carries no OperationOutcome.
pub const MISSING_OPERATION_OUTCOME: &str = "Server returned a non-success status without an accompanying error payload (OperationOutcome).";

/// Fail unless the response status is one of `codes`.
pub fn expect_status(response: &HttpResponse, codes: &[u16]) -> Verdict {
    expect_status_with(response, codes, "")
}

/// Like [`expect_status`], appending `message` after the fixed prefix.
pub fn expect_status_with(response: &HttpResponse, codes: &[u16], message: &str) -> Verdict {
    if codes.contains(&response.status) {
        return Ok(());
    }
    let expected = codes
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    fail(format!(
        "Bad response code: expected {expected}, but found {}. {message}",
        response.status
    ))
}

/// Parse the response body; a body that is not JSON is a harness-level error.
pub fn expect_json(response: &HttpResponse) -> Verdict<Value> {
    response.body_json().map_err(|err| {
        Outcome::error(
            format!("Response body (HTTP {}) is not valid JSON", response.status),
            err,
        )
    })
}

pub fn expect_resource_type(body: &Value, expected: &str) -> Verdict {
    let found = document::resource_type(body);
    if found == Some(expected) {
        return Ok(());
    }
    fail(format!(
        "Expected FHIR {expected} but found: {}",
        found.unwrap_or("no resourceType")
    ))
}

/// `Skip` when a valid Bundle carries no `resource_type` entries.
pub fn expect_bundle_nonempty<'a>(bundle: &'a Value, resource_type: &str) -> Verdict<Vec<&'a Value>> {
    let resources = document::bundle_resources(bundle, Some(resource_type));
    if resources.is_empty() {
        return skip(no_resources_message(resource_type));
    }
    Ok(resources)
}

pub(crate) fn no_resources_message(resource_type: &str) -> String {
    format!(
        "No {resource_type} resources appear to be available. Please use patients with more information."
    )
}

/// Compare media types, ignoring parameters such as `charset`.
pub fn expect_content_type(response: &HttpResponse, expected: &str) -> Verdict {
    let found = response.header("content-type").unwrap_or_default();
    let media_type = found.split(';').next().unwrap_or_default().trim();
    if media_type.eq_ignore_ascii_case(expected) {
        return Ok(());
    }
    fail(format!(
        "Expected content-type {expected} but found {}",
        if found.is_empty() { "none" } else { found }
    ))
}

/// Require an OperationOutcome body and return its issue messages.
pub fn expect_operation_outcome(response: &HttpResponse) -> Verdict<Vec<String>> {
    let Ok(body) = response.body_json() else {
        return fail(MISSING_OPERATION_OUTCOME);
    };
    if document::resource_type(&body) != Some("OperationOutcome") {
        return fail(MISSING_OPERATION_OUTCOME);
    }
    Ok(document::outcome_messages(&body))
}

/// How a step classifies a documented 4xx rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectionPolicy {
    #[default]
    Skip,
    Fail,
}

/// Warn-then-stop handling of a 4xx response.
///
/// Non-4xx responses pass through. A 4xx without an OperationOutcome fails with
/// [`MISSING_OPERATION_OUTCOME`]. A 4xx with one records a warning and stops the
/// step according to `policy`.
pub fn expect_operation_outcome_on_4xx(
    scope: &mut StepScope,
    response: &HttpResponse,
    policy: RejectionPolicy,
) -> Verdict {
    if !response.is_client_error() {
        return Ok(());
    }
    let issues = expect_operation_outcome(response)?;
    scope.warn(undocumented_rejection_warning(response.status, &issues));

    let message = format!("Server rejected the request with HTTP {}", response.status);
    match policy {
        RejectionPolicy::Skip => skip(message),
        RejectionPolicy::Fail => fail(message),
    }
}

pub(crate) fn undocumented_rejection_warning(status: u16, issues: &[String]) -> String {
    let mut warning = format!(
        "Server returned HTTP {status} with an OperationOutcome; this interaction may be undocumented."
    );
    if !issues.is_empty() {
        warning.push_str(" Issues: ");
        warning.push_str(&issues.join("; "));
    }
    warning
}
