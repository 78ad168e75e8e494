use async_trait::async_trait;
use serde_json::Value;

use crate::assertions::{
    RejectionPolicy, expect_content_type, expect_json, expect_operation_outcome_on_4xx,
    expect_resource_type, expect_status, no_resources_message,
};
use crate::capability::Interaction;
use crate::context::keys;
use crate::document;
use crate::outcome::{Verdict, ensure, skip, skip_if};
use crate::scope::StepScope;
use crate::step::{StepBody, TestStep};

/// Read a previously discovered resource by id and check the server returns it.
#[derive(Debug, Clone)]
pub struct ReadStep {
    resource_type: String,
    source_key: String,
}

impl ReadStep {
    /// Reads the first resource saved under `resources.{resource_type}`.
    pub fn new(resource_type: impl Into<String>) -> Self {
        let resource_type = resource_type.into();
        Self {
            source_key: keys::resources(&resource_type),
            resource_type,
        }
    }

    /// Take the resource from `key` instead.
    pub fn from_context(mut self, key: impl Into<String>) -> Self {
        self.source_key = key.into();
        self
    }

    pub fn into_step(self, id: impl Into<String>, title: impl Into<String>) -> TestStep {
        let key = self.source_key.clone();
        TestStep::new(id, title, self).requires(key)
    }
}

#[async_trait]
impl StepBody for ReadStep {
    async fn run(&self, scope: &mut StepScope) -> Verdict {
        let rt = &self.resource_type;
        skip_if(
            !scope
                .capabilities()
                .supports_interaction(rt, Interaction::Read),
            format!("This server does not support {rt} read operation(s) according to conformance statement."),
        )?;

        let resources = scope.context().require::<Vec<Value>>(&self.source_key)?;
        let Some(id) = resources
            .iter()
            .filter(|r| document::resource_type(r) == Some(rt.as_str()))
            .find_map(document::id)
            .map(str::to_string)
        else {
            return skip(no_resources_message(rt));
        };

        let response = scope.read(rt, &id).await?;
        expect_operation_outcome_on_4xx(scope, &response, RejectionPolicy::Fail)?;
        expect_status(&response, &[200])?;
        if let Err(outcome) = expect_content_type(&response, "application/fhir+json") {
            scope.warn(outcome.message());
        }

        let body = expect_json(&response)?;
        expect_resource_type(&body, rt)?;
        let found = document::id(&body);
        ensure(
            found == Some(id.as_str()),
            format!(
                "Expected resource to have id: `{id}`, but found `{}`",
                found.unwrap_or("none")
            ),
        )
    }
}
