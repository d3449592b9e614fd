//! The workflow state threaded through every step of the control loop.
//!
//! [`WorkflowState`] is owned by the controller and mutated only through the
//! methods defined here. Coverage, pending and eligible metric ids are derived
//! on demand from the outline and the computed values, never stored.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    decision::{Decision, WorkflowOutcome},
    metric::{MetricFailure, MetricValue},
    outline::Outline,
};

/// One input record: field name to value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Entry in the plan history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    /// Planning step that produced the decision.
    pub step: u32,
    /// The decision.
    pub decision: Decision,
    /// Explanation attached to it.
    pub rationale: String,
    /// When the decision was taken.
    pub at: DateTime<Utc>,
}

/// Diagnostic snapshot of a workflow, attached to aborted outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Session identifier.
    pub session_id: Uuid,
    /// Planning steps taken.
    pub planning_step: u32,
    /// Current outline version, 0 when none was installed.
    pub outline_version: u32,
    /// Coverage at snapshot time.
    pub coverage: f64,
    /// Computed metric ids.
    pub computed: Vec<String>,
    /// Pending metric ids.
    pub pending: Vec<String>,
    /// Pending ids that exhausted their retry budget.
    pub exhausted: Vec<String>,
    /// Errors recorded so far.
    pub errors: Vec<String>,
}

/// Mutable record of one report request.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    session_id: Uuid,
    objective: String,
    data_sample: Arc<Vec<Record>>,
    outline: Option<Outline>,
    outline_version: u32,
    computed_metrics: IndexMap<String, MetricValue>,
    failed_attempts: HashMap<String, u32>,
    metric_failures: HashMap<String, MetricFailure>,
    planning_step: u32,
    plan_history: Vec<PlanRecord>,
    errors: Vec<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    terminal_result: Option<WorkflowOutcome>,
}

impl WorkflowState {
    /// Create the state for a new report request.
    pub fn new(objective: impl Into<String>, data_sample: Vec<Record>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            objective: objective.into(),
            data_sample: Arc::new(data_sample),
            outline: None,
            outline_version: 0,
            computed_metrics: IndexMap::new(),
            failed_attempts: HashMap::new(),
            metric_failures: HashMap::new(),
            planning_step: 0,
            plan_history: Vec::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            terminal_result: None,
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// The analysis objective.
    #[must_use]
    pub fn objective(&self) -> &str {
        &self.objective
    }

    /// The input records.
    #[must_use]
    pub fn data_sample(&self) -> &[Record] {
        &self.data_sample
    }

    /// Shared read-only handle to the input records, for concurrent workers.
    #[must_use]
    pub fn shared_data(&self) -> Arc<Vec<Record>> {
        Arc::clone(&self.data_sample)
    }

    /// The first `n` records.
    #[must_use]
    pub fn sample_slice(&self, n: usize) -> &[Record] {
        &self.data_sample[..n.min(self.data_sample.len())]
    }

    /// Sorted union of the field names across all records.
    #[must_use]
    pub fn field_names(&self) -> BTreeSet<String> {
        self.data_sample
            .iter()
            .flat_map(|record| record.keys().cloned())
            .collect()
    }

    /// The current outline, if one has been installed.
    #[must_use]
    pub fn outline(&self) -> Option<&Outline> {
        self.outline.as_ref()
    }

    /// Number of successful outline installs.
    #[must_use]
    pub fn outline_version(&self) -> u32 {
        self.outline_version
    }

    /// Replace the outline and bump the version.
    ///
    /// Computed values and failure counters survive only for metric ids whose
    /// specification is unchanged in the new outline and whose dependencies
    /// all survive as well.
    pub fn install_outline(&mut self, outline: Outline) -> u32 {
        let unchanged = |id: &str| match (&self.outline, outline.metric(id)) {
            (Some(previous), Some(spec)) => previous.metric(id) == Some(spec),
            _ => false,
        };
        let mut keep: BTreeSet<String> = self
            .computed_metrics
            .keys()
            .chain(self.failed_attempts.keys())
            .filter(|id| unchanged(id))
            .cloned()
            .collect();

        // A value computed from a dropped dependency is stale too.
        loop {
            let stale: Vec<String> = keep
                .iter()
                .filter(|id| {
                    outline.metric(id).is_some_and(|spec| {
                        spec.dependencies
                            .iter()
                            .any(|dependency| !keep.contains(dependency))
                    })
                })
                .cloned()
                .collect();
            if stale.is_empty() {
                break;
            }
            for id in &stale {
                keep.remove(id);
            }
        }

        self.computed_metrics.retain(|id, _| keep.contains(id));
        self.failed_attempts.retain(|id, _| keep.contains(id));
        self.metric_failures.retain(|id, _| keep.contains(id));

        self.outline = Some(outline);
        self.outline_version += 1;
        self.outline_version
    }

    /// Computed values keyed by metric id.
    #[must_use]
    pub fn computed_metrics(&self) -> &IndexMap<String, MetricValue> {
        &self.computed_metrics
    }

    /// The computed value of one metric.
    #[must_use]
    pub fn computed(&self, id: &str) -> Option<&MetricValue> {
        self.computed_metrics.get(id)
    }

    /// Whether a value is stored for `id`.
    #[must_use]
    pub fn is_computed(&self, id: &str) -> bool {
        self.computed_metrics.contains_key(id)
    }

    /// Consecutive failed attempts for `id`.
    #[must_use]
    pub fn failed_attempts(&self, id: &str) -> u32 {
        self.failed_attempts.get(id).copied().unwrap_or(0)
    }

    /// Latest failure details for `id`.
    #[must_use]
    pub fn metric_failure(&self, id: &str) -> Option<&MetricFailure> {
        self.metric_failures.get(id)
    }

    /// Store a computed value and reset the failure counter.
    pub fn record_success(&mut self, id: impl Into<String>, value: MetricValue) {
        let id = id.into();
        self.failed_attempts.insert(id.clone(), 0);
        self.metric_failures.remove(&id);
        self.computed_metrics.insert(id, value);
    }

    /// Record a failed dispatch; the value slot stays absent.
    ///
    /// `failed_attempts` is the new consecutive failure count for the metric.
    pub fn record_failure(
        &mut self,
        id: impl Into<String>,
        failed_attempts: u32,
        failure: MetricFailure,
    ) {
        let id = id.into();
        self.failed_attempts.insert(id.clone(), failed_attempts);
        self.metric_failures.insert(id, failure);
    }

    /// Metric ids declared by the outline, in declaration order.
    #[must_use]
    pub fn required_metric_ids(&self) -> Vec<String> {
        self.outline
            .as_ref()
            .map(|o| o.metric_ids().cloned().collect())
            .unwrap_or_default()
    }

    /// Fraction of required metrics that have a value; 0 without requirements.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coverage(&self) -> f64 {
        let Some(outline) = &self.outline else {
            return 0.0;
        };
        let required = outline.global_metrics.len();
        if required == 0 {
            return 0.0;
        }
        let computed = outline
            .metric_ids()
            .filter(|id| self.computed_metrics.contains_key(*id))
            .count();
        computed as f64 / required as f64
    }

    /// Required ids without a value, in declaration order.
    #[must_use]
    pub fn pending_metric_ids(&self) -> Vec<String> {
        self.required_metric_ids()
            .into_iter()
            .filter(|id| !self.computed_metrics.contains_key(id))
            .collect()
    }

    /// Pending ids whose failure count is still below `max_attempts`.
    #[must_use]
    pub fn eligible_pending_metric_ids(&self, max_attempts: u32) -> Vec<String> {
        self.pending_metric_ids()
            .into_iter()
            .filter(|id| self.failed_attempts(id) < max_attempts)
            .collect()
    }

    /// Pending ids whose failure count reached `max_attempts`.
    #[must_use]
    pub fn exhausted_metric_ids(&self, max_attempts: u32) -> Vec<String> {
        self.pending_metric_ids()
            .into_iter()
            .filter(|id| self.failed_attempts(id) >= max_attempts)
            .collect()
    }

    /// Planning steps taken so far.
    #[must_use]
    pub fn planning_step(&self) -> u32 {
        self.planning_step
    }

    /// Advance the planning counter, returning the new step number.
    pub fn advance_step(&mut self) -> u32 {
        self.planning_step += 1;
        self.planning_step
    }

    /// Decisions taken so far.
    #[must_use]
    pub fn plan_history(&self) -> &[PlanRecord] {
        &self.plan_history
    }

    /// Append a decision to the plan history.
    pub fn record_decision(&mut self, decision: Decision, rationale: impl Into<String>) {
        self.plan_history.push(PlanRecord {
            step: self.planning_step,
            decision,
            rationale: rationale.into(),
            at: Utc::now(),
        });
    }

    /// Errors recorded so far.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Record an error message.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// When the request was created.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the workflow reached a terminal state.
    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// The terminal outcome, once the workflow has finished.
    #[must_use]
    pub fn terminal_result(&self) -> Option<&WorkflowOutcome> {
        self.terminal_result.as_ref()
    }

    /// Whether a terminal outcome has been recorded.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.terminal_result.is_some()
    }

    /// Record the terminal outcome and the finish time.
    ///
    /// The first outcome wins; later calls leave the state unchanged.
    pub fn finish(&mut self, outcome: WorkflowOutcome) -> &WorkflowOutcome {
        self.finished_at.get_or_insert_with(Utc::now);
        self.terminal_result.get_or_insert(outcome)
    }

    /// Capture a diagnostic snapshot.
    #[must_use]
    pub fn snapshot(&self, max_attempts: u32) -> StateSnapshot {
        StateSnapshot {
            session_id: self.session_id,
            planning_step: self.planning_step,
            outline_version: self.outline_version,
            coverage: self.coverage(),
            computed: self.computed_metrics.keys().cloned().collect(),
            pending: self.pending_metric_ids(),
            exhausted: self.exhausted_metric_ids(max_attempts),
            errors: self.errors.clone(),
        }
    }
}
