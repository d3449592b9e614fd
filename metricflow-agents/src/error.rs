//! Error types for the Metricflow agents.

use metricflow_core::{BackendError, MetricflowError, ReasoningError};
use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Error types for agent operations
#[derive(Error, Debug)]
pub enum AgentError {
    /// Core Metricflow errors
    #[error("Core error: {0}")]
    Core(#[from] MetricflowError),

    /// Reasoning service errors
    #[error("Reasoning error: {0}")]
    Reasoning(#[from] ReasoningError),

    /// Metric backend errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// The outline could not be produced within its retry budget
    #[error("Outline generation exhausted after {attempts} attempts: {last_error}")]
    OutlineGenerationExhausted {
        /// Attempts made
        attempts: u32,
        /// Last validation or gateway error
        last_error: String,
    },

    /// A component was asked to act in a state where no valid action exists
    #[error("Policy violation: {message}")]
    PolicyViolation {
        /// Error message
        message: String,
    },

    /// Agent configuration errors
    #[error("Agent configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },
}

impl AgentError {
    /// Create an outline exhaustion error
    pub fn outline_exhausted(attempts: u32, last_error: impl Into<String>) -> Self {
        Self::OutlineGenerationExhausted {
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Create a policy violation error
    pub fn policy_violation(message: impl Into<String>) -> Self {
        Self::PolicyViolation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Get the error category for logging
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Core(_) => "core",
            Self::Reasoning(_) => "reasoning",
            Self::Backend(_) => "backend",
            Self::OutlineGenerationExhausted { .. } => "outline_exhausted",
            Self::PolicyViolation { .. } => "policy_violation",
            Self::Configuration { .. } => "configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = AgentError::outline_exhausted(3, "missing global metrics");
        assert!(matches!(
            err,
            AgentError::OutlineGenerationExhausted { attempts: 3, .. }
        ));
        assert_eq!(err.category(), "outline_exhausted");
        assert!(err.to_string().contains("missing global metrics"));
    }

    #[test]
    fn test_error_category() {
        let err: AgentError = ReasoningError::Timeout { timeout_ms: 100 }.into();
        assert_eq!(err.category(), "reasoning");

        let err: AgentError = BackendError::validation("bad payload").into();
        assert_eq!(err.category(), "backend");

        let err: AgentError = MetricflowError::configuration("bad threshold").into();
        assert_eq!(err.category(), "core");
        assert_eq!(AgentError::policy_violation("no action").category(), "policy_violation");
    }
}
