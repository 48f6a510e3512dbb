//! Error types shared across the retrace crates.

use thiserror::Error;

use crate::model::PlaybackFailure;

/// Errors produced by the scenario core.
#[derive(Error, Debug)]
pub enum RetraceError {
    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Scenario '{scenario}' depends on unknown scenario '{dependency}'")]
    DependencyNotFound { scenario: String, dependency: String },

    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error("Missing required parameter '{parameter}' for scenario '{scenario}'")]
    MissingParameter { scenario: String, parameter: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Playback(Box<PlaybackFailure>),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RetraceError {
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Referential errors are reported before any page action runs.
    pub fn is_referential(&self) -> bool {
        matches!(
            self,
            Self::ScenarioNotFound(_)
                | Self::DependencyNotFound { .. }
                | Self::DependencyCycle { .. }
                | Self::MissingParameter { .. }
        )
    }
}

/// Result type alias for retrace operations.
pub type Result<T> = std::result::Result<T, RetraceError>;
