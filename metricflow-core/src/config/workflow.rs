//! Configuration for the report workflow.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::{MetricflowError, Result, traits::BackendKind};

/// How the dispatcher picks a backend for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Prefer the rule engine when it claims the metric, else flexible.
    #[default]
    Auto,
    /// Always use the rule engine.
    RuleEngineOnly,
    /// Always use the flexible backend.
    FlexibleOnly,
}

/// Backend selection policy.
///
/// Per-metric overrides win over the mode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendPolicy {
    /// Global selection mode.
    pub mode: SelectionMode,
    /// Metric id to forced backend.
    pub overrides: HashMap<String, BackendKind>,
}

impl BackendPolicy {
    /// Policy with the given mode and no overrides.
    #[must_use]
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            mode,
            overrides: HashMap::new(),
        }
    }

    /// Force `metric_id` onto `kind`.
    #[must_use]
    pub fn with_override(mut self, metric_id: impl Into<String>, kind: BackendKind) -> Self {
        self.overrides.insert(metric_id.into(), kind);
        self
    }
}

/// What happens when the outline cannot be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlineFailurePolicy {
    /// Terminate with an aborted outcome.
    #[default]
    Abort,
    /// Terminate asking for clarification.
    Clarify,
}

/// Tunables of the control loop.
///
/// Every field has a default, so partial JSON documents deserialize.
///
/// # Examples
///
/// ```rust
/// use metricflow_core::config::WorkflowConfig;
///
/// let config = WorkflowConfig::default()
///     .with_coverage_threshold(0.9)
///     .with_dispatch_concurrency_limit(8);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Fraction of required metrics needed before finalizing.
    pub coverage_threshold: f64,
    /// Outline generation attempts per request.
    pub outline_retry_budget: u32,
    /// Initial delay between outline attempts.
    pub outline_retry_delay_ms: u64,
    /// Minimum sections a valid outline must have.
    pub min_outline_sections: usize,
    /// Records shown to the reasoning service when generating an outline.
    pub outline_sample_size: usize,
    /// Failed attempts after which a metric is no longer eligible.
    pub metric_retry_budget: u32,
    /// Deadline for a single backend call.
    pub metric_timeout_ms: u64,
    /// Initial delay between metric attempts.
    pub metric_retry_delay_ms: u64,
    /// Maximum concurrent backend calls in one dispatch.
    pub dispatch_concurrency_limit: usize,
    /// Maximum planning steps before aborting.
    pub controller_step_budget: u32,
    /// Backend selection policy.
    pub backend_policy: BackendPolicy,
    /// Behaviour when no outline can be produced.
    pub outline_failure_policy: OutlineFailurePolicy,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            coverage_threshold: 0.8,
            outline_retry_budget: 3,
            outline_retry_delay_ms: 2_000,
            min_outline_sections: 3,
            outline_sample_size: 3,
            metric_retry_budget: 3,
            metric_timeout_ms: 180_000,
            metric_retry_delay_ms: 500,
            dispatch_concurrency_limit: 4,
            controller_step_budget: 10,
            backend_policy: BackendPolicy::default(),
            outline_failure_policy: OutlineFailurePolicy::default(),
        }
    }
}

impl WorkflowConfig {
    /// Set the coverage threshold.
    #[must_use]
    pub fn with_coverage_threshold(mut self, threshold: f64) -> Self {
        self.coverage_threshold = threshold;
        self
    }

    /// Set the outline retry budget.
    #[must_use]
    pub fn with_outline_retry_budget(mut self, budget: u32) -> Self {
        self.outline_retry_budget = budget;
        self
    }

    /// Set the initial outline retry delay.
    #[must_use]
    pub fn with_outline_retry_delay(mut self, delay: Duration) -> Self {
        self.outline_retry_delay_ms = duration_ms(delay);
        self
    }

    /// Set the minimum number of outline sections.
    #[must_use]
    pub fn with_min_outline_sections(mut self, sections: usize) -> Self {
        self.min_outline_sections = sections;
        self
    }

    /// Set the outline sample size.
    #[must_use]
    pub fn with_outline_sample_size(mut self, size: usize) -> Self {
        self.outline_sample_size = size;
        self
    }

    /// Set the metric retry budget.
    #[must_use]
    pub fn with_metric_retry_budget(mut self, budget: u32) -> Self {
        self.metric_retry_budget = budget;
        self
    }

    /// Set the per-call metric timeout.
    #[must_use]
    pub fn with_metric_timeout(mut self, timeout: Duration) -> Self {
        self.metric_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the initial metric retry delay.
    #[must_use]
    pub fn with_metric_retry_delay(mut self, delay: Duration) -> Self {
        self.metric_retry_delay_ms = duration_ms(delay);
        self
    }

    /// Set the dispatch concurrency limit.
    #[must_use]
    pub fn with_dispatch_concurrency_limit(mut self, limit: usize) -> Self {
        self.dispatch_concurrency_limit = limit;
        self
    }

    /// Set the controller step budget.
    #[must_use]
    pub fn with_controller_step_budget(mut self, budget: u32) -> Self {
        self.controller_step_budget = budget;
        self
    }

    /// Set the backend policy.
    #[must_use]
    pub fn with_backend_policy(mut self, policy: BackendPolicy) -> Self {
        self.backend_policy = policy;
        self
    }

    /// Set the outline failure policy.
    #[must_use]
    pub fn with_outline_failure_policy(mut self, policy: OutlineFailurePolicy) -> Self {
        self.outline_failure_policy = policy;
        self
    }

    /// Per-call metric timeout.
    #[must_use]
    pub fn metric_timeout(&self) -> Duration {
        Duration::from_millis(self.metric_timeout_ms)
    }

    /// Initial metric retry delay.
    #[must_use]
    pub fn metric_retry_delay(&self) -> Duration {
        Duration::from_millis(self.metric_retry_delay_ms)
    }

    /// Initial outline retry delay.
    #[must_use]
    pub fn outline_retry_delay(&self) -> Duration {
        Duration::from_millis(self.outline_retry_delay_ms)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MetricflowError::Configuration`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if !(self.coverage_threshold > 0.0 && self.coverage_threshold <= 1.0) {
            return Err(MetricflowError::configuration(
                "coverage_threshold must be in (0, 1]",
            ));
        }
        if self.outline_retry_budget == 0 {
            return Err(MetricflowError::configuration(
                "outline_retry_budget must be greater than 0",
            ));
        }
        if self.min_outline_sections == 0 {
            return Err(MetricflowError::configuration(
                "min_outline_sections must be greater than 0",
            ));
        }
        if self.metric_retry_budget == 0 {
            return Err(MetricflowError::configuration(
                "metric_retry_budget must be greater than 0",
            ));
        }
        if self.metric_timeout_ms == 0 {
            return Err(MetricflowError::configuration(
                "metric_timeout_ms must be greater than 0",
            ));
        }
        if self.dispatch_concurrency_limit == 0 {
            return Err(MetricflowError::configuration(
                "dispatch_concurrency_limit must be greater than 0",
            ));
        }
        if self.controller_step_budget == 0 {
            return Err(MetricflowError::configuration(
                "controller_step_budget must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
