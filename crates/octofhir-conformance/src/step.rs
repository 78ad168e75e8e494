//! Test step definitions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::outcome::Verdict;
use crate::scope::StepScope;

/// Executable body of a test step.
///
/// Returning `Ok(())` classifies the step as a pass; returning `Err(outcome)`
/// classifies it as that outcome.
#[async_trait]
pub trait StepBody: Send + Sync {
    async fn run(&self, scope: &mut StepScope) -> Verdict;
}

struct FnStep<F>(F);

#[async_trait]
impl<F> StepBody for FnStep<F>
where
    F: for<'a> Fn(&'a mut StepScope) -> BoxFuture<'a, Verdict> + Send + Sync,
{
    async fn run(&self, scope: &mut StepScope) -> Verdict {
        (self.0)(scope).await
    }
}

/// One checkable behavior within a sequence.
#[derive(Clone)]
pub struct TestStep {
    id: String,
    title: String,
    description: Option<String>,
    prerequisites: Vec<String>,
    body: Arc<dyn StepBody>,
}

impl TestStep {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl StepBody + 'static) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            prerequisites: Vec::new(),
            body: Arc::new(body),
        }
    }

    /// Build a step from an async closure.
    ///
    /// ```ignore
    /// TestStep::from_fn("capture-patient", "Capture patient id", |scope| {
    ///     Box::pin(async move {
    ///         scope.context_mut().set("patient_id", "85".to_string());
    ///         Verdict::Ok(())
    ///     })
    /// });
    /// ```
    pub fn from_fn<F>(id: impl Into<String>, title: impl Into<String>, body: F) -> Self
    where
        F: for<'a> Fn(&'a mut StepScope) -> BoxFuture<'a, Verdict> + Send + Sync + 'static,
    {
        Self::new(id, title, FnStep(body))
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare a context key the step expects an earlier step to have written.
    pub fn requires(mut self, key: impl Into<String>) -> Self {
        self.prerequisites.push(key.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn prerequisites(&self) -> &[String] {
        &self.prerequisites
    }

    pub fn body(&self) -> &dyn StepBody {
        self.body.as_ref()
    }
}

impl fmt::Debug for TestStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestStep")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("prerequisites", &self.prerequisites)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Unrestricted;
    use crate::config::HarnessConfig;
    use crate::context::ExecutionContext;
    use crate::error::Result;
    use crate::http::{HttpClient, HttpRequest, HttpResponse};
    use crate::outcome::{StepStatus, skip};
    use tokio_test::block_on;

    struct Unreachable;

    #[async_trait]
    impl HttpClient for Unreachable {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse> {
            unreachable!("no requests expected")
        }
    }

    fn scope() -> StepScope {
        StepScope::new(
            ExecutionContext::new(),
            Arc::new(Unreachable),
            Arc::new(Unrestricted),
            Arc::new(HarnessConfig::for_server("http://fhir.test")),
        )
    }

    struct Noop;

    #[async_trait]
    impl StepBody for Noop {
        async fn run(&self, _scope: &mut StepScope) -> Verdict {
            Ok(())
        }
    }

    #[test]
    fn test_builder() {
        let step = TestStep::new("read-patient", "Server returns Patient by id", Noop)
            .describe("Reads the Patient captured by the search step")
            .requires("resources.Patient");

        assert_eq!(step.id(), "read-patient");
        assert_eq!(step.prerequisites(), ["resources.Patient"]);
        assert!(step.description().is_some());
        assert!(format!("{step:?}").contains("read-patient"));
    }

    #[test]
    fn test_closure_body_writes_context() {
        let step = TestStep::from_fn("capture", "Capture patient id", |scope| {
            Box::pin(async move {
                scope.context_mut().set("patient_id", "85".to_string());
                Verdict::Ok(())
            })
        });

        let mut scope = scope();
        block_on(step.body().run(&mut scope)).unwrap();
        assert_eq!(
            scope.context().get::<String>("patient_id").map(String::as_str),
            Some("85")
        );
    }

    #[test]
    fn test_closure_body_outcome() {
        let step = TestStep::from_fn("gate", "Needs data", |_scope| {
            Box::pin(async move { skip::<()>("No Patient resources appear to be available.") })
        });

        let outcome = block_on(step.body().run(&mut scope())).unwrap_err();
        assert_eq!(outcome.status(), StepStatus::Skipped);
    }
}
