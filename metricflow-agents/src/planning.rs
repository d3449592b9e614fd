//! Planning agent.
//!
//! [`PlanningAgent`] maps a [`WorkflowState`] onto the next [`Decision`].
//! The decision itself comes from a fixed rule table evaluated in order:
//!
//! 1. no outline: generate one
//! 2. the outline declares no metrics: generate it again
//! 3. coverage below the threshold: compute the metrics that can still make
//!    progress, or ask for clarification when none can
//! 4. otherwise: finalize
//!
//! The reasoning gateway, when configured, only contributes the rationale and
//! may reorder the ids of a [`Decision::ComputeMetrics`] batch.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use metricflow_core::{
    Decision, PlanningDecision, WorkflowState,
    config::WorkflowConfig,
    traits::{ReasoningGateway, ReasoningKind, ReasoningRequest},
};

/// Chooses the next action of the control loop.
#[derive(Debug, Clone)]
pub struct PlanningAgent {
    gateway: Option<Arc<dyn ReasoningGateway>>,
    coverage_threshold: f64,
    max_attempts: u32,
}

impl PlanningAgent {
    /// Create a rule-only planner from the workflow configuration.
    #[must_use]
    pub fn new(config: &WorkflowConfig) -> Self {
        Self {
            gateway: None,
            coverage_threshold: config.coverage_threshold,
            max_attempts: config.metric_retry_budget,
        }
    }

    /// Ask `gateway` for rationales and batch priorities.
    #[must_use]
    pub fn with_gateway(mut self, gateway: Arc<dyn ReasoningGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Coverage required before finalizing.
    #[must_use]
    pub fn coverage_threshold(&self) -> f64 {
        self.coverage_threshold
    }

    /// Apply the decision rules without consulting the gateway.
    #[must_use]
    pub fn evaluate(&self, state: &WorkflowState) -> PlanningDecision {
        let Some(outline) = state.outline() else {
            return planned(Decision::GenerateOutline, "No outline has been generated yet");
        };
        if outline.global_metrics.is_empty() {
            return planned(
                Decision::GenerateOutline,
                "The outline declares no metrics and is considered incomplete",
            );
        }

        let coverage = state.coverage();
        if coverage >= self.coverage_threshold {
            return planned(
                Decision::FinalizeReport,
                format!(
                    "Coverage {coverage:.2} meets the threshold {:.2}",
                    self.coverage_threshold
                ),
            );
        }

        let candidates = dispatchable_metric_ids(state, self.max_attempts);
        if candidates.is_empty() {
            let question = self.clarification(state);
            return planned(Decision::ClarifyRequirements(question.clone()), question);
        }

        let rationale = format!(
            "Coverage {coverage:.2} is below the threshold {:.2}; {} of {} pending metrics can be computed",
            self.coverage_threshold,
            candidates.len(),
            state.pending_metric_ids().len()
        );
        planned(Decision::ComputeMetrics(candidates), rationale)
    }

    /// Decide the next action.
    ///
    /// The variant and the set of ids always match [`Self::evaluate`]. A
    /// gateway failure falls back to the rule rationale.
    #[instrument(skip(self, state), fields(step = state.planning_step()))]
    pub async fn decide(&self, state: &WorkflowState) -> PlanningDecision {
        let mut decision = self.evaluate(state);
        let Some(gateway) = &self.gateway else {
            return decision;
        };

        let request = ReasoningRequest::new(
            ReasoningKind::PlanningDecision,
            self.status_digest(state, &decision.decision),
        );
        match gateway.request(&request).await {
            Ok(response) => {
                if let Some(rationale) = response
                    .get("rationale")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                {
                    decision.rationale = rationale.to_string();
                }
                if let Decision::ComputeMetrics(ids) = &mut decision.decision {
                    let priority = priority_metrics(&response);
                    if !priority.is_empty() {
                        debug!(?priority, "Reordering batch by priority");
                        prioritize(ids, &priority);
                    }
                }
            }
            Err(e) => {
                warn!("Planning rationale unavailable, keeping rule rationale: {}", e);
            }
        }
        decision
    }

    fn clarification(&self, state: &WorkflowState) -> String {
        let exhausted = state.exhausted_metric_ids(self.max_attempts);
        let eligible: HashSet<String> = state
            .eligible_pending_metric_ids(self.max_attempts)
            .into_iter()
            .collect();
        let blocked: Vec<String> = state
            .pending_metric_ids()
            .into_iter()
            .filter(|id| eligible.contains(id))
            .collect();

        let mut question = format!(
            "Coverage {:.2} is below the threshold {:.2} and no remaining metric can be computed.",
            state.coverage(),
            self.coverage_threshold
        );
        if !exhausted.is_empty() {
            question.push_str(&format!(
                " Permanently failed metrics: {}.",
                exhausted.join(", ")
            ));
        }
        if !blocked.is_empty() {
            question.push_str(&format!(
                " Metrics blocked by failed or missing dependencies: {}.",
                blocked.join(", ")
            ));
        }
        question.push_str(" Please revise the objective, the data, or the metric definitions.");
        question
    }

    fn status_digest(&self, state: &WorkflowState, decision: &Decision) -> Value {
        let failed_attempts: BTreeMap<String, u32> = state
            .pending_metric_ids()
            .into_iter()
            .map(|id| {
                let attempts = state.failed_attempts(&id);
                (id, attempts)
            })
            .filter(|(_, attempts)| *attempts > 0)
            .collect();
        let batch = match decision {
            Decision::ComputeMetrics(ids) => ids.clone(),
            _ => Vec::new(),
        };
        json!({
            "objective": state.objective(),
            "step": state.planning_step(),
            "outline_version": state.outline_version(),
            "decision": decision.label(),
            "coverage": state.coverage(),
            "coverage_threshold": self.coverage_threshold,
            "computed": state.computed_metrics().keys().collect::<Vec<_>>(),
            "pending": state.pending_metric_ids(),
            "batch": batch,
            "exhausted": state.exhausted_metric_ids(self.max_attempts),
            "failed_attempts": failed_attempts,
        })
    }
}

fn planned(decision: Decision, rationale: impl Into<String>) -> PlanningDecision {
    PlanningDecision {
        decision,
        rationale: rationale.into(),
    }
}

/// Eligible pending ids whose dependency chains can still be satisfied.
///
/// A metric is dispatchable when every dependency is either computed or is
/// itself dispatchable; metrics waiting on exhausted, undeclared or cyclic
/// dependencies are left out. Declaration order is kept.
pub fn dispatchable_metric_ids(state: &WorkflowState, max_attempts: u32) -> Vec<String> {
    let Some(outline) = state.outline() else {
        return Vec::new();
    };
    let eligible = state.eligible_pending_metric_ids(max_attempts);
    let mut reachable: HashSet<&str> = state
        .computed_metrics()
        .keys()
        .map(String::as_str)
        .collect();

    loop {
        let before = reachable.len();
        for id in &eligible {
            if reachable.contains(id.as_str()) {
                continue;
            }
            let ready = outline.metric(id).is_some_and(|spec| {
                spec.dependencies
                    .iter()
                    .all(|dependency| reachable.contains(dependency.as_str()))
            });
            if ready {
                reachable.insert(id.as_str());
            }
        }
        if reachable.len() == before {
            break;
        }
    }

    eligible
        .iter()
        .filter(|id| reachable.contains(id.as_str()))
        .cloned()
        .collect()
}

fn priority_metrics(response: &Value) -> Vec<String> {
    response
        .get("priority_metrics")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Move the ids named in `priority` to the front, keeping the rest in order.
/// Unknown priority ids are ignored.
fn prioritize(ids: &mut Vec<String>, priority: &[String]) {
    let mut ordered: Vec<String> = Vec::with_capacity(ids.len());
    for id in priority {
        if ids.contains(id) && !ordered.contains(id) {
            ordered.push(id.clone());
        }
    }
    for id in ids.iter() {
        if !ordered.contains(id) {
            ordered.push(id.clone());
        }
    }
    *ids = ordered;
}
