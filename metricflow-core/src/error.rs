//! Error types for the Metricflow framework.
//!
//! This module holds the crate-wide [`MetricflowError`] plus the two failure
//! taxonomies exchanged with external collaborators: [`ReasoningError`] for
//! the reasoning service and [`BackendError`] for metric backends.

use std::path::PathBuf;

use thiserror::Error;

/// Core error types for Metricflow.
///
/// Covers configuration loading and any error that is not specific to one
/// collaborator.
#[derive(Error, Debug)]
pub enum MetricflowError {
    /// A configuration file or directory could not be read
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        /// Path being read
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON parsing or decoding errors
    #[error("Serialization error in {context}: {source}")]
    Serialization {
        /// What was being parsed or decoded
        context: String,
        /// The underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Configuration validation errors
    #[error("Configuration error: {message}")]
    Configuration {
        /// Detailed error message
        message: String,
    },

    /// Resource not found errors
    #[error("Not found: {resource}")]
    NotFound {
        /// Name of the missing resource
        resource: String,
    },

    /// Internal framework errors
    #[error("Internal error: {message}")]
    Internal {
        /// Detailed error message
        message: String,
    },
}

impl MetricflowError {
    /// Create an IO error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error with a description of what was parsed.
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Create a new configuration error with a message.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new not found error with a resource name.
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a new internal error with a message.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Failure modes of a reasoning service request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReasoningError {
    /// The request did not complete in time
    #[error("reasoning request timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// The service answered, but the payload is not the expected structure
    #[error("malformed reasoning response: {message}")]
    MalformedResponse {
        /// What was wrong with the payload
        message: String,
    },

    /// The service could not be reached or refused the request
    #[error("reasoning service unavailable: {message}")]
    ServiceUnavailable {
        /// Error message
        message: String,
    },
}

impl ReasoningError {
    /// Create a malformed response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Create a service unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }
}

/// Failure modes of a metric backend invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Network-level failure (connection refused, 5xx, reset)
    #[error("transient backend failure: {message}")]
    Transient {
        /// Error message
        message: String,
    },

    /// The invocation exceeded its deadline and was cancelled
    #[error("backend call timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// The backend rejected the request or returned an unusable payload
    #[error("backend validation failure: {message}")]
    Validation {
        /// Error message
        message: String,
    },

    /// The backend has no rule or capability for this metric
    #[error("no applicable rule for metric '{metric_id}'")]
    NoApplicableRule {
        /// Metric identifier
        metric_id: String,
    },

    /// No backend is configured for the requested selection
    #[error("backend unavailable: {message}")]
    Unavailable {
        /// Error message
        message: String,
    },
}

impl BackendError {
    /// Create a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a no-applicable-rule error.
    pub fn no_applicable_rule(metric_id: impl Into<String>) -> Self {
        Self::NoApplicableRule {
            metric_id: metric_id.into(),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Only network and timeout failures are retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }
}

/// Result type alias for Metricflow operations.
pub type Result<T> = std::result::Result<T, MetricflowError>;
