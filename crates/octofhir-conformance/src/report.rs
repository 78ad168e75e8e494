//! Step and sequence results handed to the reporting layer.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::outcome::{Outcome, StepStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub id: String,
    pub title: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Root cause of an `error` outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl StepReport {
    /// Report for a body that returned normally.
    pub fn passed(id: impl Into<String>, title: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: StepStatus::Passed,
            message: None,
            cause: None,
            warnings,
        }
    }

    pub fn from_outcome(
        id: impl Into<String>,
        title: impl Into<String>,
        outcome: &Outcome,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: outcome.status(),
            message: Some(outcome.message().to_string()),
            cause: outcome.cause().map(ToString::to_string),
            warnings,
        }
    }

    pub fn not_run(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: StepStatus::NotRun,
            message: None,
            cause: None,
            warnings: Vec::new(),
        }
    }
}

/// Per-status counts of a sequence run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub omitted: usize,
    pub waiting: usize,
    pub errored: usize,
    pub not_run: usize,
}

impl Summary {
    fn record(&mut self, status: StepStatus) {
        let slot = match status {
            StepStatus::Passed => &mut self.passed,
            StepStatus::Failed => &mut self.failed,
            StepStatus::Skipped => &mut self.skipped,
            StepStatus::Omitted => &mut self.omitted,
            StepStatus::Waiting => &mut self.waiting,
            StepStatus::Errored => &mut self.errored,
            StepStatus::NotRun => &mut self.not_run,
        };
        *slot += 1;
    }

    /// Steps that count towards the result; omitted steps do not.
    pub fn counted(&self) -> usize {
        self.passed + self.failed + self.skipped + self.waiting + self.errored + self.not_run
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceReport {
    pub sequence: String,
    pub title: String,
    pub steps: Vec<StepReport>,
}

impl SequenceReport {
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for step in &self.steps {
            summary.record(step.status);
        }
        summary
    }

    /// `Fail` is the only status that makes a run unsuccessful.
    pub fn is_successful(&self) -> bool {
        self.steps.iter().all(|s| s.status != StepStatus::Failed)
    }

    pub fn step(&self, id: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
