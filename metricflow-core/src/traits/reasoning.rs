//! Reasoning service abstraction.
//!
//! The reasoning service is the external capability that produces judgment
//! based artifacts (planning explanations, report outlines) from structured
//! context. The core only relies on the request/response contract below and
//! validates every response it receives.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ReasoningError;

/// Kind of artifact requested from the reasoning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningKind {
    /// Explanation and prioritisation for a planning decision.
    PlanningDecision,
    /// A report outline.
    OutlineGeneration,
}

impl fmt::Display for ReasoningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlanningDecision => f.write_str("planning_decision"),
            Self::OutlineGeneration => f.write_str("outline_generation"),
        }
    }
}

/// A structured request to the reasoning service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningRequest {
    /// What is being asked for.
    pub kind: ReasoningKind,
    /// Schema-specific structured context.
    pub context: serde_json::Value,
}

impl ReasoningRequest {
    /// Create a new request.
    #[must_use]
    pub fn new(kind: ReasoningKind, context: serde_json::Value) -> Self {
        Self { kind, context }
    }
}

/// Gateway to the external reasoning service.
///
/// Implementations handle any natural-language mediation internally and
/// return a structured JSON payload. Callers treat the payload as untrusted.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use metricflow_core::error::ReasoningError;
/// use metricflow_core::traits::{ReasoningGateway, ReasoningRequest};
///
/// #[derive(Debug)]
/// struct Canned(serde_json::Value);
///
/// #[async_trait]
/// impl ReasoningGateway for Canned {
///     async fn request(
///         &self,
///         _request: &ReasoningRequest,
///     ) -> Result<serde_json::Value, ReasoningError> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
#[async_trait]
pub trait ReasoningGateway: Send + Sync + std::fmt::Debug {
    /// Send a request and wait for the structured response.
    ///
    /// # Errors
    ///
    /// Returns [`ReasoningError::Timeout`], [`ReasoningError::MalformedResponse`]
    /// or [`ReasoningError::ServiceUnavailable`].
    async fn request(
        &self,
        request: &ReasoningRequest,
    ) -> std::result::Result<serde_json::Value, ReasoningError>;

    /// Get a human-readable name for this gateway.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
