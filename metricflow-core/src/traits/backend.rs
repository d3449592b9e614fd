//! Metric computation backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

use crate::{
    error::BackendError,
    types::{MetricSpec, MetricValue, Record},
};

/// The two interchangeable backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Low-latency deterministic backend keyed by pre-registered rules.
    RuleEngine,
    /// Higher-latency backend driven by a free-form instruction.
    Flexible,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RuleEngine => f.write_str("rule_engine"),
            Self::Flexible => f.write_str("flexible"),
        }
    }
}

/// Per-call options passed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeOptions {
    /// Deadline for this call; the dispatcher enforces it as well.
    pub timeout: Duration,
    /// 1-based attempt number within the current dispatch.
    pub attempt: u32,
}

impl Default for ComputeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(180),
            attempt: 1,
        }
    }
}

/// A service that can compute a metric value from records.
#[async_trait]
pub trait MetricBackend: Send + Sync + std::fmt::Debug {
    /// Which family this backend belongs to.
    fn kind(&self) -> BackendKind;

    /// Get a human-readable name for this backend.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capability check: whether this backend can compute `spec` at all.
    ///
    /// Used by automatic selection to decide whether to fall back.
    async fn supports(&self, _spec: &MetricSpec) -> bool {
        true
    }

    /// Compute one metric.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`]; only transient variants are retried.
    async fn compute(
        &self,
        spec: &MetricSpec,
        records: &[Record],
        options: &ComputeOptions,
    ) -> std::result::Result<MetricValue, BackendError>;
}
