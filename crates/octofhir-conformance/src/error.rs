use thiserror::Error;

/// Engine-level errors for conformance runs.
///
/// These are harness or transport problems, never verdicts about the server
/// under test. Inside a step body they convert into [`crate::Outcome::Error`].
#[derive(Debug, Error)]
pub enum ConformanceError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] ::config::ConfigError),

    #[error("Duplicate step id in sequence {sequence}: {id}")]
    DuplicateStep { sequence: String, id: String },

    #[error("Unknown step id in sequence {sequence}: {id}")]
    UnknownStep { sequence: String, id: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid document: {message}")]
    InvalidDocument { message: String },

    #[error("Step body panicked: {0}")]
    Panicked(String),
}

impl ConformanceError {
    /// Create a new DuplicateStep error
    pub fn duplicate_step(sequence: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateStep {
            sequence: sequence.into(),
            id: id.into(),
        }
    }

    /// Create a new UnknownStep error
    pub fn unknown_step(sequence: impl Into<String>, id: impl Into<String>) -> Self {
        Self::UnknownStep {
            sequence: sequence.into(),
            id: id.into(),
        }
    }

    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a new InvalidDocument error
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Create a new Panicked error
    pub fn panicked(message: impl Into<String>) -> Self {
        Self::Panicked(message.into())
    }

    /// Get error category for logging/reporting
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) | Self::Url(_) => ErrorCategory::Transport,
            Self::Json(_) | Self::InvalidDocument { .. } => ErrorCategory::Serialization,
            Self::DuplicateStep { .. } | Self::UnknownStep { .. } => ErrorCategory::Registration,
            Self::Configuration(_) | Self::ConfigSource(_) => ErrorCategory::Configuration,
            Self::Panicked(_) => ErrorCategory::Internal,
        }
    }
}

/// Error categories for logging and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transport,
    Serialization,
    Registration,
    Configuration,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Serialization => write!(f, "serialization"),
            Self::Registration => write!(f, "registration"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Convenience result type for engine operations
pub type Result<T> = std::result::Result<T, ConformanceError>;
