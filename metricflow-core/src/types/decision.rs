//! Planning decisions and controller states.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{report::Report, state::StateSnapshot};

/// The next action chosen by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "payload", rename_all = "snake_case")]
pub enum Decision {
    /// Produce (or re-produce) the report outline.
    GenerateOutline,
    /// Compute the listed metric ids.
    ComputeMetrics(Vec<String>),
    /// Assemble the final report.
    FinalizeReport,
    /// Stop and ask for external input.
    ClarifyRequirements(String),
}

impl Decision {
    /// Short label used in logs and plan history.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::GenerateOutline => "generate_outline",
            Self::ComputeMetrics(_) => "compute_metrics",
            Self::FinalizeReport => "finalize_report",
            Self::ClarifyRequirements(_) => "clarify_requirements",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ComputeMetrics(ids) => write!(f, "{}({})", self.label(), ids.join(", ")),
            _ => f.write_str(self.label()),
        }
    }
}

/// A decision together with its explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningDecision {
    /// What to do next.
    pub decision: Decision,
    /// Why, as explained by the reasoning service or the rule that fired.
    pub rationale: String,
}

/// States of the controller state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Nothing has run yet.
    Start,
    /// Asking the planner for the next decision.
    Planning,
    /// Generating the outline.
    OutlineGeneration,
    /// Running a metric dispatch batch.
    MetricComputation,
    /// Assembling the report.
    Finalizing,
    /// Preparing a clarification request.
    Clarifying,
    /// Report assembled.
    Done,
    /// Waiting for external input.
    ClarificationNeeded,
    /// Gave up.
    Aborted,
}

impl ControllerState {
    /// Terminal states end the control loop.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::ClarificationNeeded | Self::Aborted)
    }
}

/// Why a workflow was aborted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AbortReason {
    /// The controller ran out of planning steps.
    StepBudgetExhausted {
        /// The configured budget.
        budget: u32,
    },
    /// The outline could not be produced within its retry budget.
    OutlineGenerationExhausted {
        /// Attempts made.
        attempts: u32,
        /// Last validation or gateway error.
        last_error: String,
    },
    /// No valid action could be derived.
    PolicyViolation {
        /// What went wrong.
        message: String,
    },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StepBudgetExhausted { budget } => {
                write!(f, "step budget of {budget} exhausted")
            }
            Self::OutlineGenerationExhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "outline generation exhausted after {attempts} attempts: {last_error}"
            ),
            Self::PolicyViolation { message } => write!(f, "policy violation: {message}"),
        }
    }
}

/// Terminal result of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    /// The report was assembled.
    Done {
        /// The final report.
        report: Report,
    },
    /// External input is required before the workflow can continue.
    ClarificationNeeded {
        /// What needs clarifying.
        question: String,
    },
    /// The workflow gave up.
    Aborted {
        /// Why.
        reason: AbortReason,
        /// State at the time of the abort.
        snapshot: StateSnapshot,
    },
}

impl WorkflowOutcome {
    /// The controller state this outcome corresponds to.
    #[must_use]
    pub fn state(&self) -> ControllerState {
        match self {
            Self::Done { .. } => ControllerState::Done,
            Self::ClarificationNeeded { .. } => ControllerState::ClarificationNeeded,
            Self::Aborted { .. } => ControllerState::Aborted,
        }
    }

    /// The report, when the workflow completed.
    #[must_use]
    pub fn report(&self) -> Option<&Report> {
        match self {
            Self::Done { report } => Some(report),
            _ => None,
        }
    }
}
