//! Sequence runner.
//!
//! Steps run strictly one at a time, in declaration order, sharing one
//! [`ExecutionContext`]. Every step ends with exactly one [`StepReport`]; a
//! failing, skipped or panicking step never stops the run. Independent
//! sequences can run concurrently because each run owns its own context.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::join_all;
use tracing::Instrument;

use crate::capability::{CapabilityDescriptor, Unrestricted};
use crate::client::ReqwestClient;
use crate::config::HarnessConfig;
use crate::context::ExecutionContext;
use crate::error::{ConformanceError, Result};
use crate::http::HttpClient;
use crate::outcome::{Outcome, StepStatus};
use crate::report::{SequenceReport, StepReport};
use crate::scope::StepScope;
use crate::sequence::Sequence;
use crate::step::TestStep;

pub struct SequenceRunner {
    client: Arc<dyn HttpClient>,
    capabilities: Arc<dyn CapabilityDescriptor>,
    config: Arc<HarnessConfig>,
}

impl SequenceRunner {
    pub fn new(client: Arc<dyn HttpClient>, config: HarnessConfig) -> Self {
        Self {
            client,
            capabilities: Arc::new(Unrestricted),
            config: Arc::new(config),
        }
    }

    /// Runner using [`ReqwestClient`] configured from `config.server`.
    pub fn from_config(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let client = ReqwestClient::new(&config.server)?;
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn with_capabilities(mut self, capabilities: Arc<dyn CapabilityDescriptor>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run every step of `sequence` against a fresh context.
    pub async fn run(&self, sequence: &Sequence) -> SequenceReport {
        self.run_with_context(sequence, ExecutionContext::new())
            .await
            .0
    }

    /// Run every step of `sequence` starting from `context`, returning the
    /// context as the last step left it.
    pub async fn run_with_context(
        &self,
        sequence: &Sequence,
        context: ExecutionContext,
    ) -> (SequenceReport, ExecutionContext) {
        let steps: Vec<&TestStep> = sequence.steps().collect();
        self.run_steps(sequence, &steps, context).await
    }

    /// Run the steps named by `ids`, in declaration order, against a fresh context.
    pub async fn run_selected(&self, sequence: &Sequence, ids: &[&str]) -> Result<SequenceReport> {
        if let Some(unknown) = ids.iter().find(|id| sequence.get(id).is_none()) {
            return Err(ConformanceError::unknown_step(sequence.id(), *unknown));
        }
        let steps: Vec<&TestStep> = sequence
            .steps()
            .filter(|step| ids.iter().any(|id| *id == step.id()))
            .collect();
        Ok(self
            .run_steps(sequence, &steps, ExecutionContext::new())
            .await
            .0)
    }

    /// Execute the single step `id` against `context`, returning the context as
    /// the step left it.
    ///
    /// An unknown id is an error and hands `context` back untouched.
    pub async fn run_step(
        &self,
        sequence: &Sequence,
        id: &str,
        context: ExecutionContext,
    ) -> std::result::Result<(StepReport, ExecutionContext), (ConformanceError, ExecutionContext)>
    {
        let Some(step) = sequence.get(id) else {
            return Err((ConformanceError::unknown_step(sequence.id(), id), context));
        };
        Ok(self.execute(sequence.id(), step, context).await)
    }

    /// Run independent sequences concurrently, each with its own context.
    pub async fn run_all(&self, sequences: &[Sequence]) -> Vec<SequenceReport> {
        join_all(sequences.iter().map(|sequence| self.run(sequence))).await
    }

    async fn run_steps(
        &self,
        sequence: &Sequence,
        steps: &[&TestStep],
        mut context: ExecutionContext,
    ) -> (SequenceReport, ExecutionContext) {
        let mut reports = Vec::with_capacity(steps.len());
        let mut remaining = steps.iter();

        for step in remaining.by_ref() {
            let (report, updated) = self.execute(sequence.id(), step, context).await;
            context = updated;
            let suspend = report.status == StepStatus::Waiting && self.config.runner.suspend_on_wait;
            reports.push(report);
            if suspend {
                tracing::info!(sequence = %sequence.id(), "Run suspended waiting for an external action");
                break;
            }
        }
        reports.extend(remaining.map(|step| StepReport::not_run(step.id(), step.title())));

        let report = SequenceReport {
            sequence: sequence.id().to_string(),
            title: sequence.title().to_string(),
            steps: reports,
        };
        let summary = report.summary();
        tracing::info!(
            sequence = %report.sequence,
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            omitted = summary.omitted,
            waiting = summary.waiting,
            errored = summary.errored,
            not_run = summary.not_run,
            "Sequence finished"
        );
        (report, context)
    }

    async fn execute(
        &self,
        sequence_id: &str,
        step: &TestStep,
        context: ExecutionContext,
    ) -> (StepReport, ExecutionContext) {
        let span = tracing::info_span!("step", sequence = %sequence_id, step = %step.id());
        async move {
            let mut scope = StepScope::new(
                context,
                self.client.clone(),
                self.capabilities.clone(),
                self.config.clone(),
            );

            let missing = scope.context().missing(step.prerequisites());
            let result = if missing.is_empty() {
                match AssertUnwindSafe(step.body().run(&mut scope))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        tracing::error!(panic = %message, "Step body panicked");
                        Err(Outcome::from(ConformanceError::panicked(message)))
                    }
                }
            } else {
                Err(Outcome::skip(format!(
                    "Prerequisite data is missing: {}",
                    missing.join(", ")
                )))
            };

            let (context, warnings) = scope.into_parts();
            let report = match result {
                Ok(()) => StepReport::passed(step.id(), step.title(), warnings),
                Err(outcome) => StepReport::from_outcome(step.id(), step.title(), &outcome, warnings),
            };
            tracing::debug!(status = %report.status, "Step finished");
            (report, context)
        }
        .instrument(span)
        .await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpRequest, HttpResponse};
    use crate::outcome::{Verdict, fail, wait};
    use crate::step::StepBody;
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl HttpClient for Offline {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse> {
            Ok(HttpResponse::new(503, ""))
        }
    }

    struct Waits;

    #[async_trait]
    impl StepBody for Waits {
        async fn run(&self, _scope: &mut StepScope) -> Verdict {
            wait("Waiting for the client to register")
        }
    }

    struct Fails;

    #[async_trait]
    impl StepBody for Fails {
        async fn run(&self, _scope: &mut StepScope) -> Verdict {
            fail("nope")
        }
    }

    fn sequence() -> Sequence {
        Sequence::new("registration", "Registration")
            .with_step(TestStep::new("wait", "Wait for registration", Waits))
            .unwrap()
            .with_step(TestStep::new("check", "Check", Fails))
            .unwrap()
    }

    fn runner(suspend_on_wait: bool) -> SequenceRunner {
        let mut config = HarnessConfig::for_server("http://fhir.test");
        config.runner.suspend_on_wait = suspend_on_wait;
        SequenceRunner::new(Arc::new(Offline), config)
    }

    #[tokio::test]
    async fn test_wait_moves_on_by_default() {
        let report = runner(false).run(&sequence()).await;
        let statuses: Vec<StepStatus> = report.steps.iter().map(|s| s.status).collect();
        assert_eq!(statuses, vec![StepStatus::Waiting, StepStatus::Failed]);
    }

    #[tokio::test]
    async fn test_wait_suspends_when_configured() {
        let report = runner(true).run(&sequence()).await;
        let statuses: Vec<StepStatus> = report.steps.iter().map(|s| s.status).collect();
        assert_eq!(statuses, vec![StepStatus::Waiting, StepStatus::NotRun]);
        assert_eq!(report.steps.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_step_id() {
        let runner = runner(false);
        let mut context = ExecutionContext::new();
        context.set("client_id", "app".to_string());
        let (err, context) = runner
            .run_step(&sequence(), "missing", context)
            .await
            .unwrap_err();
        assert!(matches!(err, ConformanceError::UnknownStep { .. }));
        assert!(context.contains("client_id"));

        let err = runner.run_selected(&sequence(), &["check", "nope"]).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown step id in sequence registration: nope");
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("kaboom")), "kaboom");
        assert_eq!(panic_message(&42u8), "Unknown panic");
    }
}
