//! The control loop.
//!
//! [`Controller`] drives a [`WorkflowState`] through the state machine
//!
//! ```text
//! Start -> Planning -> {OutlineGeneration | MetricComputation | Finalizing | Clarifying}
//!       -> Planning -> ... -> Done | ClarificationNeeded | Aborted
//! ```
//!
//! One decision is fully acted upon before the next planning call. The step
//! budget bounds the number of iterations, so every run terminates.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use metricflow_core::{
    AbortReason, ControllerState, Decision, WorkflowOutcome, WorkflowState,
    config::{OutlineFailurePolicy, WorkflowConfig},
    traits::{MetricBackend, ReasoningGateway},
};

use crate::dispatch::{BackendSelector, MetricDispatcher};
use crate::error::{AgentError, Result};
use crate::finalizer::ReportFinalizer;
use crate::outline::OutlineAgent;
use crate::planning::PlanningAgent;

/// Runs the planning loop for one report request at a time.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use metricflow_agents::backends::RuleEngineBackend;
/// use metricflow_agents::controller::Controller;
/// use metricflow_agents::llm::{LlmGatewayConfig, SiumaiReasoningGateway};
/// use metricflow_core::{WorkflowState, config::WorkflowConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let gateway = SiumaiReasoningGateway::from_config(&LlmGatewayConfig::new("openai", "gpt-4o-mini")).await?;
/// let mut controller = Controller::builder()
///     .gateway(Arc::new(gateway))
///     .rule_engine(Arc::new(RuleEngineBackend::new("http://localhost:8081")?))
///     .config(WorkflowConfig::default())
///     .build()?;
///
/// let mut state = WorkflowState::new("Summarize account activity", Vec::new());
/// let outcome = controller.run(&mut state).await;
/// println!("{:?}", outcome.state());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Controller {
    planner: PlanningAgent,
    outline_agent: OutlineAgent,
    dispatcher: MetricDispatcher,
    finalizer: ReportFinalizer,
    config: WorkflowConfig,
    current: ControllerState,
}

impl Controller {
    /// Start building a controller.
    #[must_use]
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    /// Assemble a controller from its parts.
    #[must_use]
    pub fn from_parts(
        planner: PlanningAgent,
        outline_agent: OutlineAgent,
        dispatcher: MetricDispatcher,
        finalizer: ReportFinalizer,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            planner,
            outline_agent,
            dispatcher,
            finalizer,
            config,
            current: ControllerState::Start,
        }
    }

    /// The current state-machine state.
    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.current
    }

    /// Whether the controller reached a terminal state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.current.is_terminal()
    }

    /// The workflow configuration.
    #[must_use]
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// The metric dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &MetricDispatcher {
        &self.dispatcher
    }

    /// Run until the workflow reaches a terminal state.
    #[instrument(skip(self, state), fields(session = %state.session_id()))]
    pub async fn run(&mut self, state: &mut WorkflowState) -> WorkflowOutcome {
        info!("Starting workflow: {}", state.objective());
        loop {
            if let Some(outcome) = self.step(state).await {
                return outcome;
            }
        }
    }

    /// Run one planning iteration.
    ///
    /// Returns the outcome once a terminal state is reached, `None` while
    /// there is more work to do. A finished workflow is not planned again:
    /// its recorded outcome is returned as is.
    pub async fn step(&mut self, state: &mut WorkflowState) -> Option<WorkflowOutcome> {
        if let Some(outcome) = state.terminal_result() {
            debug!(state = ?outcome.state(), "Workflow already finished");
            self.current = outcome.state();
            return Some(outcome.clone());
        }

        let budget = self.config.controller_step_budget;
        if state.planning_step() >= budget {
            return Some(self.abort(state, AbortReason::StepBudgetExhausted { budget }));
        }

        let step = state.advance_step();
        self.transition(ControllerState::Planning);
        let planned = self.planner.decide(state).await;
        info!(
            step,
            decision = %planned.decision,
            coverage = state.coverage(),
            "Planning decision: {}",
            planned.rationale
        );
        state.record_decision(planned.decision.clone(), planned.rationale);

        let outcome = match planned.decision {
            Decision::GenerateOutline => self.generate_outline(state).await,
            Decision::ComputeMetrics(ids) => self.compute_metrics(state, &ids).await,
            Decision::FinalizeReport => Some(self.finalize(state)),
            Decision::ClarifyRequirements(question) => {
                self.transition(ControllerState::Clarifying);
                Some(WorkflowOutcome::ClarificationNeeded { question })
            }
        };

        match outcome {
            Some(outcome) => Some(self.finish(state, outcome)),
            None if state.planning_step() >= budget => {
                Some(self.abort(state, AbortReason::StepBudgetExhausted { budget }))
            }
            None => None,
        }
    }

    async fn generate_outline(&mut self, state: &mut WorkflowState) -> Option<WorkflowOutcome> {
        self.transition(ControllerState::OutlineGeneration);
        match self.outline_agent.generate_into(state).await {
            Ok(_) => None,
            Err(AgentError::OutlineGenerationExhausted {
                attempts,
                last_error,
            }) => Some(match self.config.outline_failure_policy {
                OutlineFailurePolicy::Abort => WorkflowOutcome::Aborted {
                    reason: AbortReason::OutlineGenerationExhausted {
                        attempts,
                        last_error,
                    },
                    snapshot: state.snapshot(self.dispatcher.retry_budget()),
                },
                OutlineFailurePolicy::Clarify => WorkflowOutcome::ClarificationNeeded {
                    question: format!(
                        "No valid report outline after {attempts} attempts ({last_error}). \
                         Please refine the objective or provide more representative data."
                    ),
                },
            }),
            Err(e) => {
                error!(category = e.category(), "Outline generation failed: {}", e);
                Some(WorkflowOutcome::Aborted {
                    reason: AbortReason::PolicyViolation {
                        message: e.to_string(),
                    },
                    snapshot: state.snapshot(self.dispatcher.retry_budget()),
                })
            }
        }
    }

    async fn compute_metrics(
        &mut self,
        state: &mut WorkflowState,
        ids: &[String],
    ) -> Option<WorkflowOutcome> {
        self.transition(ControllerState::MetricComputation);
        if ids.is_empty() {
            let message = "planner requested an empty metric batch";
            state.record_error(message);
            return Some(WorkflowOutcome::Aborted {
                reason: AbortReason::PolicyViolation {
                    message: message.to_string(),
                },
                snapshot: state.snapshot(self.dispatcher.retry_budget()),
            });
        }
        self.dispatcher.compute(state, ids).await;
        None
    }

    fn finalize(&mut self, state: &mut WorkflowState) -> WorkflowOutcome {
        self.transition(ControllerState::Finalizing);
        match self.finalizer.finalize(state) {
            Ok(report) => WorkflowOutcome::Done { report },
            Err(e) => {
                state.record_error(e.to_string());
                WorkflowOutcome::Aborted {
                    reason: AbortReason::PolicyViolation {
                        message: e.to_string(),
                    },
                    snapshot: state.snapshot(self.dispatcher.retry_budget()),
                }
            }
        }
    }

    fn abort(&mut self, state: &mut WorkflowState, reason: AbortReason) -> WorkflowOutcome {
        state.record_error(reason.to_string());
        let outcome = WorkflowOutcome::Aborted {
            reason,
            snapshot: state.snapshot(self.dispatcher.retry_budget()),
        };
        self.finish(state, outcome)
    }

    fn finish(&mut self, state: &mut WorkflowState, outcome: WorkflowOutcome) -> WorkflowOutcome {
        let outcome = state.finish(outcome).clone();
        self.transition(outcome.state());
        match &outcome {
            WorkflowOutcome::Done { report } => info!(
                steps = state.planning_step(),
                coverage = report.summary.coverage,
                "Workflow done"
            ),
            WorkflowOutcome::ClarificationNeeded { question } => {
                warn!(steps = state.planning_step(), "Clarification needed: {}", question);
            }
            WorkflowOutcome::Aborted { reason, .. } => {
                error!(steps = state.planning_step(), "Workflow aborted: {}", reason);
            }
        }
        outcome
    }

    fn transition(&mut self, next: ControllerState) {
        if self.current != next {
            debug!(from = ?self.current, to = ?next, "Controller transition");
            self.current = next;
        }
    }
}

/// Builder for [`Controller`].
#[derive(Debug, Default)]
pub struct ControllerBuilder {
    gateway: Option<Arc<dyn ReasoningGateway>>,
    planning_rationale: bool,
    rule_engine: Option<Arc<dyn MetricBackend>>,
    flexible: Option<Arc<dyn MetricBackend>>,
    config: WorkflowConfig,
}

impl ControllerBuilder {
    /// Create an empty builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            planning_rationale: true,
            ..Self::default()
        }
    }

    /// Set the reasoning gateway.
    #[must_use]
    pub fn gateway(mut self, gateway: Arc<dyn ReasoningGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Whether the planner asks the gateway for rationales (default `true`).
    #[must_use]
    pub fn planning_rationale(mut self, enabled: bool) -> Self {
        self.planning_rationale = enabled;
        self
    }

    /// Set the rule-engine backend.
    #[must_use]
    pub fn rule_engine(mut self, backend: Arc<dyn MetricBackend>) -> Self {
        self.rule_engine = Some(backend);
        self
    }

    /// Set the flexible backend.
    #[must_use]
    pub fn flexible(mut self, backend: Arc<dyn MetricBackend>) -> Self {
        self.flexible = Some(backend);
        self
    }

    /// Set the workflow configuration.
    #[must_use]
    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the controller.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] if the gateway or every backend
    /// is missing, or if the configuration is invalid.
    pub fn build(self) -> Result<Controller> {
        self.config.validate()?;
        let gateway = self
            .gateway
            .ok_or_else(|| AgentError::configuration("a reasoning gateway is required"))?;

        let mut selector = BackendSelector::new(self.config.backend_policy.clone());
        if let Some(backend) = self.rule_engine {
            selector = selector.with_rule_engine(backend);
        }
        if let Some(backend) = self.flexible {
            selector = selector.with_flexible(backend);
        }
        if !selector.has_backends() {
            return Err(AgentError::configuration(
                "at least one metric backend is required",
            ));
        }

        let mut planner = PlanningAgent::new(&self.config);
        if self.planning_rationale {
            planner = planner.with_gateway(Arc::clone(&gateway));
        }

        Ok(Controller::from_parts(
            planner,
            OutlineAgent::new(gateway, &self.config),
            MetricDispatcher::new(selector, &self.config),
            ReportFinalizer::from_config(&self.config),
            self.config,
        ))
    }
}
