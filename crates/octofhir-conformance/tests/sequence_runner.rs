//! Integration tests for the sequence runner.
//!
//! These tests drive whole sequences and check the per-step results the
//! reporting layer receives.

mod common;

use std::sync::Arc;

use common::{ScriptedClient, runner};
use octofhir_conformance::prelude::*;
use octofhir_conformance::{ErrorCategory, HttpResponse};
use serde_json::json;

fn marks_patient() -> TestStep {
    TestStep::from_fn("capture", "Capture the patient under test", |scope| {
        Box::pin(async move {
            scope.context_mut().set("patient_id", "85".to_string());
            Verdict::Ok(())
        })
    })
}

fn uses_patient() -> TestStep {
    TestStep::from_fn("use", "Use the captured patient", |scope| {
        Box::pin(async move {
            let id = scope.context().require::<String>("patient_id")?;
            ensure(id == "85", format!("unexpected patient {id}"))
        })
    })
}

fn panics() -> TestStep {
    TestStep::from_fn("explode", "Body with a bug", |_scope| {
        Box::pin(async move {
            let entries: Vec<u8> = Vec::new();
            assert!(!entries.is_empty(), "boom");
            Verdict::Ok(())
        })
    })
}

fn mixed_sequence() -> Sequence {
    Sequence::new("mixed", "Every outcome kind")
        .with_step(marks_patient())
        .unwrap()
        .with_step(TestStep::from_fn("fails", "Fails", |_scope| {
            Box::pin(async move { fail::<()>("Expected FHIR Bundle but found: Observation") })
        }))
        .unwrap()
        .with_step(panics())
        .unwrap()
        .with_step(TestStep::from_fn("omits", "Needs a token", |scope| {
            Box::pin(async move {
                scope.require_token()?;
                Verdict::Ok(())
            })
        }))
        .unwrap()
        .with_step(uses_patient())
        .unwrap()
}

// =============================================================================
// Classification
// =============================================================================

#[tokio::test]
async fn test_one_result_per_step_whatever_happens() {
    let report = runner(ScriptedClient::silent()).run(&mixed_sequence()).await;

    let statuses: Vec<StepStatus> = report.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![
            StepStatus::Passed,
            StepStatus::Failed,
            StepStatus::Errored,
            StepStatus::Omitted,
            StepStatus::Passed,
        ]
    );
    assert!(!report.is_successful());
    assert_eq!(report.summary().counted(), 4);
}

#[tokio::test]
async fn test_normal_return_is_pass_without_message() {
    let report = runner(ScriptedClient::silent()).run(&mixed_sequence()).await;
    let capture = report.step("capture").unwrap();

    assert_eq!(capture.status, StepStatus::Passed);
    assert_eq!(capture.message, None);
    assert!(capture.warnings.is_empty());
}

#[tokio::test]
async fn test_panic_becomes_error_with_cause() {
    let report = runner(ScriptedClient::silent()).run(&mixed_sequence()).await;
    let explode = report.step("explode").unwrap();

    assert_eq!(explode.status, StepStatus::Errored);
    assert_eq!(explode.cause.as_deref(), Some("Step body panicked: boom"));
}

#[tokio::test]
async fn test_missing_prerequisite_is_skip() {
    let sequence = Sequence::new("prereq", "Prerequisites")
        .with_step(uses_patient().requires("patient_id"))
        .unwrap();

    let report = runner(ScriptedClient::silent()).run(&sequence).await;
    let step = &report.steps[0];

    assert_eq!(step.status, StepStatus::Skipped);
    assert_eq!(
        step.message.as_deref(),
        Some("Prerequisite data is missing: patient_id")
    );
}

#[tokio::test]
async fn test_missing_context_value_inside_body_is_skip() {
    let sequence = Sequence::new("guard", "Guard")
        .with_step(uses_patient())
        .unwrap();

    let report = runner(ScriptedClient::silent()).run(&sequence).await;
    assert_eq!(report.steps[0].status, StepStatus::Skipped);
}

#[tokio::test]
async fn test_transport_failure_is_error() {
    let sequence = Sequence::new("metadata", "Metadata")
        .with_step(TestStep::from_fn("fetch", "Fetch metadata", |scope| {
            Box::pin(async move {
                let response = scope.get("metadata", Vec::new()).await?;
                expect_status(&response, &[200])
            })
        }))
        .unwrap();

    let runner = SequenceRunner::from_config(HarnessConfig::for_server("http://127.0.0.1:1")).unwrap();
    let report = runner.run(&sequence).await;
    let step = &report.steps[0];

    assert_eq!(step.status, StepStatus::Errored);
    assert!(step.message.as_deref().unwrap().contains("GET http://127.0.0.1:1/metadata"));
    assert!(step.cause.as_deref().unwrap().starts_with("HTTP transport error"));
}

// =============================================================================
// Context and lookup
// =============================================================================

#[tokio::test]
async fn test_runs_are_idempotent() {
    let client = ScriptedClient::new(|_req| {
        HttpResponse::json(200, &json!({ "resourceType": "CapabilityStatement" }))
    });
    let sequence = mixed_sequence();
    let runner = runner(client);

    let first = runner.run(&sequence).await;
    let second = runner.run(&sequence).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_run_step_by_id_with_context() {
    let sequence = mixed_sequence();
    let runner = runner(ScriptedClient::silent());

    let (skipped, context) = runner
        .run_step(&sequence, "use", ExecutionContext::new())
        .await
        .unwrap();
    assert_eq!(skipped.status, StepStatus::Skipped);

    let (_, context) = runner.run_step(&sequence, "capture", context).await.unwrap();
    let (passed, context) = runner.run_step(&sequence, "use", context).await.unwrap();
    assert_eq!(passed.status, StepStatus::Passed);
    assert!(context.contains("patient_id"));
}

#[tokio::test]
async fn test_run_selected_keeps_declaration_order() {
    let report = runner(ScriptedClient::silent())
        .run_selected(&mixed_sequence(), &["use", "capture"])
        .await
        .unwrap();

    let ids: Vec<&str> = report.steps.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["capture", "use"]);
    assert!(report.is_successful());
}

#[tokio::test]
async fn test_concurrent_runs_do_not_share_context() {
    let writer = Sequence::new("writer", "Writer")
        .with_step(marks_patient())
        .unwrap();
    let reader = Sequence::new("reader", "Reader")
        .with_step(uses_patient())
        .unwrap();

    let reports = runner(ScriptedClient::silent())
        .run_all(&[writer, reader])
        .await;

    assert_eq!(reports[0].steps[0].status, StepStatus::Passed);
    assert_eq!(reports[1].steps[0].status, StepStatus::Skipped);
}

#[tokio::test]
async fn test_wait_is_recorded_and_run_continues() {
    let sequence = Sequence::new("launch", "Launch")
        .with_step(TestStep::from_fn("await-launch", "Wait for launch", |_scope| {
            Box::pin(async move { wait::<()>("Waiting for the EHR to launch the app") })
        }))
        .unwrap()
        .with_step(marks_patient())
        .unwrap();

    let report = runner(ScriptedClient::silent()).run(&sequence).await;
    assert_eq!(report.steps[0].status, StepStatus::Waiting);
    assert_eq!(report.steps[1].status, StepStatus::Passed);
    assert!(report.is_successful());
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let err = Sequence::new("dup", "Duplicates")
        .with_step(marks_patient())
        .unwrap()
        .with_step(marks_patient())
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Registration);
}

#[tokio::test]
async fn test_report_serializes_for_reporting_layer() {
    let client: Arc<ScriptedClient> = ScriptedClient::silent();
    let report = runner(client).run(&mixed_sequence()).await;
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(json["sequence"], "mixed");
    assert_eq!(json["steps"][1]["status"], "failed");
    assert_eq!(
        json["steps"][1]["message"],
        "Expected FHIR Bundle but found: Observation"
    );
}
