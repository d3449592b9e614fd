//! Metric dispatch.
//!
//! [`MetricDispatcher`] takes a batch of metric ids, routes each one to a
//! backend, and runs the calls concurrently under a semaphore. Workers never
//! touch the workflow state: each produces its own result, and results are
//! merged into the state after every worker has joined.

pub mod selection;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use metricflow_core::{
    BackendError, FailureKind, MetricFailure, MetricOutcome, MetricSpec, MetricValue, Record,
    WorkflowState,
    config::WorkflowConfig,
    traits::{ComputeOptions, MetricBackend},
};

use crate::retry::{AttemptState, RetryPolicy, run_with_retry};

pub use selection::{BackendSelector, Selection};

/// Per-id outcomes of one dispatch, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    /// Outcome for every distinct requested id.
    pub outcomes: IndexMap<String, MetricOutcome>,
}

impl DispatchReport {
    /// Outcome for one id.
    #[must_use]
    pub fn outcome(&self, id: &str) -> Option<&MetricOutcome> {
        self.outcomes.get(id)
    }

    /// Ids computed in this dispatch.
    #[must_use]
    pub fn succeeded(&self) -> Vec<&str> {
        self.ids_where(MetricOutcome::is_success)
    }

    /// Ids attempted and failed in this dispatch.
    #[must_use]
    pub fn failed(&self) -> Vec<&str> {
        self.ids_where(|o| matches!(o, MetricOutcome::Failure(_)))
    }

    /// Ids left pending because of unmet dependencies.
    #[must_use]
    pub fn deferred(&self) -> Vec<&str> {
        self.ids_where(|o| matches!(o, MetricOutcome::Deferred { .. }))
    }

    fn ids_where(&self, predicate: impl Fn(&MetricOutcome) -> bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| predicate(outcome))
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

#[derive(Debug)]
struct AttemptError {
    error: BackendError,
    backend: &'static str,
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.backend)
    }
}

struct Job {
    id: String,
    spec: MetricSpec,
    prior_failures: u32,
}

enum JobResult {
    Success {
        value: MetricValue,
        backend: &'static str,
        attempts: u32,
    },
    Failure {
        failure: MetricFailure,
        failed_attempts: u32,
    },
}

/// Computes metrics through the configured backends.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use metricflow_agents::backends::FlexibleBackend;
/// use metricflow_agents::dispatch::{BackendSelector, MetricDispatcher};
/// use metricflow_core::{WorkflowState, config::WorkflowConfig};
///
/// # async fn example(state: &mut WorkflowState) -> Result<(), Box<dyn std::error::Error>> {
/// let config = WorkflowConfig::default();
/// let selector = BackendSelector::new(config.backend_policy.clone())
///     .with_flexible(Arc::new(FlexibleBackend::new("http://localhost:9090/compute")?));
/// let dispatcher = MetricDispatcher::new(selector, &config);
///
/// let ids = state.pending_metric_ids();
/// let report = dispatcher.compute(state, &ids).await;
/// println!("computed {:?}", report.succeeded());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MetricDispatcher {
    selector: BackendSelector,
    retry: RetryPolicy,
    timeout: Duration,
    concurrency_limit: usize,
}

impl MetricDispatcher {
    /// Create a dispatcher from the workflow configuration.
    #[must_use]
    pub fn new(selector: BackendSelector, config: &WorkflowConfig) -> Self {
        Self {
            selector,
            retry: RetryPolicy::for_metrics(config),
            timeout: config.metric_timeout(),
            concurrency_limit: config.dispatch_concurrency_limit.max(1),
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the concurrency limit.
    #[must_use]
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    /// The backend selector.
    #[must_use]
    pub fn selector(&self) -> &BackendSelector {
        &self.selector
    }

    /// Failed attempts after which a metric is no longer dispatched.
    #[must_use]
    pub fn retry_budget(&self) -> u32 {
        self.retry.max_attempts
    }

    /// Compute `ids`, skipping those that already have a value.
    pub async fn compute(&self, state: &mut WorkflowState, ids: &[String]) -> DispatchReport {
        self.dispatch(state, ids, false).await
    }

    /// Compute `ids` even if they already have a value or exhausted their
    /// budget. Dependency ordering still applies.
    pub async fn recompute(&self, state: &mut WorkflowState, ids: &[String]) -> DispatchReport {
        self.dispatch(state, ids, true).await
    }

    #[instrument(skip(self, state, ids), fields(batch = ids.len()))]
    async fn dispatch(
        &self,
        state: &mut WorkflowState,
        ids: &[String],
        force: bool,
    ) -> DispatchReport {
        let budget = self.retry.max_attempts;
        let mut immediate: HashMap<String, MetricOutcome> = HashMap::new();
        let mut jobs = Vec::new();

        for id in ids {
            if immediate.contains_key(id) || jobs.iter().any(|job: &Job| &job.id == id) {
                continue;
            }
            let Some(spec) = state.outline().and_then(|outline| outline.metric(id)) else {
                warn!(metric_id = %id, "Metric is not declared by the outline");
                immediate.insert(id.clone(), MetricOutcome::UnknownMetric);
                continue;
            };
            if !force && state.is_computed(id) {
                debug!(metric_id = %id, "Metric already computed, skipping");
                immediate.insert(id.clone(), MetricOutcome::AlreadyComputed);
                continue;
            }
            let prior_failures = if force { 0 } else { state.failed_attempts(id) };
            if prior_failures >= budget {
                debug!(metric_id = %id, prior_failures, "Retry budget exhausted, skipping");
                immediate.insert(id.clone(), MetricOutcome::Exhausted);
                continue;
            }
            let unmet: Vec<String> = spec
                .dependencies
                .iter()
                .filter(|dependency| !state.is_computed(dependency))
                .cloned()
                .collect();
            if !unmet.is_empty() {
                debug!(metric_id = %id, ?unmet, "Dependencies not computed, deferring");
                immediate.insert(id.clone(), MetricOutcome::Deferred { unmet });
                continue;
            }
            jobs.push(Job {
                id: id.clone(),
                spec: spec.clone(),
                prior_failures,
            });
        }

        info!(
            "Dispatching {} metrics ({} skipped) with concurrency {}",
            jobs.len(),
            immediate.len(),
            self.concurrency_limit
        );

        let records = state.shared_data();
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));

        // Futures are created in request order and the semaphore is FIFO, so
        // permits are granted in declaration order.
        let futures = jobs.iter().map(|job| {
            let semaphore = Arc::clone(&semaphore);
            let records = Arc::clone(&records);
            async move {
                let result = match semaphore.acquire().await {
                    Ok(_permit) => self.run_job(job, &records).await,
                    Err(e) => JobResult::Failure {
                        failure: MetricFailure {
                            kind: FailureKind::Unsupported,
                            last_error: format!("dispatch aborted: {e}"),
                            backend: None,
                            attempts: 0,
                        },
                        failed_attempts: job.prior_failures,
                    },
                };
                (job.id.clone(), result)
            }
        });
        let mut results: HashMap<String, JobResult> = join_all(futures).await.into_iter().collect();

        let mut outcomes = IndexMap::new();
        for id in ids {
            if outcomes.contains_key(id) {
                continue;
            }
            let outcome = if let Some(outcome) = immediate.remove(id) {
                outcome
            } else if let Some(result) = results.remove(id) {
                merge(state, id, result)
            } else {
                continue;
            };
            outcomes.insert(id.clone(), outcome);
        }

        let report = DispatchReport { outcomes };
        info!(
            succeeded = report.succeeded().len(),
            failed = report.failed().len(),
            deferred = report.deferred().len(),
            coverage = state.coverage(),
            "Dispatch batch finished"
        );
        report
    }

    async fn run_job(&self, job: &Job, records: &[Record]) -> JobResult {
        let budget = self.retry.max_attempts;
        let selection = match self.selector.select(&job.spec).await {
            Ok(selection) => selection,
            Err(error) => {
                return JobResult::Failure {
                    failure: MetricFailure {
                        kind: FailureKind::from(&error),
                        last_error: error.to_string(),
                        backend: None,
                        attempts: 0,
                    },
                    failed_attempts: budget,
                };
            }
        };

        let policy = self
            .retry
            .clone()
            .with_max_attempts(budget - job.prior_failures);
        let outcome = run_with_retry(
            &policy,
            |e: &AttemptError| e.error.is_transient(),
            |attempt| self.attempt(&job.spec, records, &selection, attempt),
        )
        .await;

        match outcome {
            AttemptState::Succeeded {
                value: (value, backend),
                attempts,
            } => JobResult::Success {
                value,
                backend,
                attempts,
            },
            AttemptState::ExhaustedFailed {
                attempts,
                last_error,
                retryable,
            } => {
                // Non-transient failures will not clear up on retry.
                let failed_attempts = if retryable {
                    (job.prior_failures + attempts).min(budget)
                } else {
                    budget
                };
                JobResult::Failure {
                    failure: MetricFailure {
                        kind: FailureKind::from(&last_error.error),
                        last_error: last_error.error.to_string(),
                        backend: Some(last_error.backend.to_string()),
                        attempts,
                    },
                    failed_attempts,
                }
            }
            AttemptState::Attempting(attempt) => JobResult::Failure {
                failure: MetricFailure {
                    kind: FailureKind::Transient,
                    last_error: format!("retry loop stopped at attempt {attempt}"),
                    backend: None,
                    attempts: attempt,
                },
                failed_attempts: job.prior_failures + attempt,
            },
        }
    }

    async fn attempt(
        &self,
        spec: &MetricSpec,
        records: &[Record],
        selection: &Selection,
        attempt: u32,
    ) -> Result<(MetricValue, &'static str), AttemptError> {
        let options = ComputeOptions {
            timeout: self.timeout,
            attempt,
        };
        debug!(
            metric_id = %spec.id,
            attempt,
            backend = selection.primary.name(),
            "Computing metric"
        );

        let primary = self.call(&selection.primary, spec, records, &options).await;
        let (backend, result) = match (primary, &selection.fallback) {
            (Err(BackendError::NoApplicableRule { .. }), Some(fallback)) => {
                debug!(
                    metric_id = %spec.id,
                    "No applicable rule, falling back to {}",
                    fallback.name()
                );
                (fallback, self.call(fallback, spec, records, &options).await)
            }
            (result, _) => (&selection.primary, result),
        };

        result
            .map(|value| (value, backend.name()))
            .map_err(|error| AttemptError {
                error,
                backend: backend.name(),
            })
    }

    async fn call(
        &self,
        backend: &Arc<dyn MetricBackend>,
        spec: &MetricSpec,
        records: &[Record],
        options: &ComputeOptions,
    ) -> Result<MetricValue, BackendError> {
        match tokio::time::timeout(options.timeout, backend.compute(spec, records, options)).await
        {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                timeout_ms: u64::try_from(options.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

fn merge(state: &mut WorkflowState, id: &str, result: JobResult) -> MetricOutcome {
    match result {
        JobResult::Success {
            value,
            backend,
            attempts,
        } => {
            info!(metric_id = %id, backend, attempts, "Metric computed");
            state.record_success(id, value.clone());
            MetricOutcome::Success(value)
        }
        JobResult::Failure {
            failure,
            failed_attempts,
        } => {
            warn!(
                metric_id = %id,
                attempts = failure.attempts,
                failed_attempts,
                kind = ?failure.kind,
                "Metric computation failed: {}",
                failure.last_error
            );
            state.record_error(format!("metric '{id}' failed: {}", failure.last_error));
            state.record_failure(id, failed_attempts, failure.clone());
            MetricOutcome::Failure(failure)
        }
    }
}
