//! Step outcome vocabulary.
//!
//! A step body returns [`Verdict`]. `Ok(_)` means the body ran to completion and
//! is classified as a pass; `Err(outcome)` stops the body at that point with a
//! definite classification. The first outcome produced wins because `?` and
//! `return` both leave the body immediately.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConformanceError;

/// Result type returned by step bodies and the helpers they call.
pub type Verdict<T = ()> = std::result::Result<T, Outcome>;

/// Why a step stopped executing.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// All checks succeeded.
    Pass(String),
    /// The server violated a required rule.
    Fail(String),
    /// The check could not be exercised with the data or features available.
    Skip(String),
    /// The check does not apply under the current configuration.
    Omit(String),
    /// The check needs an external action before it can complete.
    Wait(String),
    /// Unexpected harness condition, with its root cause.
    Error {
        message: String,
        cause: Arc<ConformanceError>,
    },
}

impl Outcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self::Pass(message.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }

    pub fn skip(message: impl Into<String>) -> Self {
        Self::Skip(message.into())
    }

    pub fn omit(message: impl Into<String>) -> Self {
        Self::Omit(message.into())
    }

    pub fn wait(message: impl Into<String>) -> Self {
        Self::Wait(message.into())
    }

    pub fn error(message: impl Into<String>, cause: ConformanceError) -> Self {
        Self::Error {
            message: message.into(),
            cause: Arc::new(cause),
        }
    }

    /// Terminal status this outcome maps to.
    pub fn status(&self) -> StepStatus {
        match self {
            Self::Pass(_) => StepStatus::Passed,
            Self::Fail(_) => StepStatus::Failed,
            Self::Skip(_) => StepStatus::Skipped,
            Self::Omit(_) => StepStatus::Omitted,
            Self::Wait(_) => StepStatus::Waiting,
            Self::Error { .. } => StepStatus::Errored,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Pass(m) | Self::Fail(m) | Self::Skip(m) | Self::Omit(m) | Self::Wait(m) => m,
            Self::Error { message, .. } => message,
        }
    }

    pub fn cause(&self) -> Option<&ConformanceError> {
        match self {
            Self::Error { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error { message, cause } => write!(f, "{}: {message} ({cause})", self.status()),
            other => write!(f, "{}: {}", other.status(), other.message()),
        }
    }
}

impl From<ConformanceError> for Outcome {
    fn from(err: ConformanceError) -> Self {
        Self::Error {
            message: err.to_string(),
            cause: Arc::new(err),
        }
    }
}

/// Per-step state. `NotRun` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotRun,
    Passed,
    Failed,
    Skipped,
    Omitted,
    Waiting,
    Errored,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::NotRun)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRun => write!(f, "not_run"),
            Self::Passed => write!(f, "pass"),
            Self::Failed => write!(f, "fail"),
            Self::Skipped => write!(f, "skip"),
            Self::Omitted => write!(f, "omit"),
            Self::Waiting => write!(f, "wait"),
            Self::Errored => write!(f, "error"),
        }
    }
}

// ============================================================================
// Early-exit helpers
// ============================================================================

pub fn fail<T>(message: impl Into<String>) -> Verdict<T> {
    Err(Outcome::fail(message))
}

pub fn skip<T>(message: impl Into<String>) -> Verdict<T> {
    Err(Outcome::skip(message))
}

pub fn omit<T>(message: impl Into<String>) -> Verdict<T> {
    Err(Outcome::omit(message))
}

pub fn wait<T>(message: impl Into<String>) -> Verdict<T> {
    Err(Outcome::wait(message))
}

/// Fail with `message` unless `condition` holds.
pub fn ensure(condition: bool, message: impl Into<String>) -> Verdict {
    if condition { Ok(()) } else { fail(message) }
}

pub fn skip_if(condition: bool, message: impl Into<String>) -> Verdict {
    if condition { skip(message) } else { Ok(()) }
}

pub fn omit_if(condition: bool, message: impl Into<String>) -> Verdict {
    if condition { omit(message) } else { Ok(()) }
}
