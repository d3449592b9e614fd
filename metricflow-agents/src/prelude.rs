//! Prelude module for convenient imports.

pub use metricflow_core::prelude::*;

pub use crate::backends::{FlexibleBackend, RuleEngineBackend, RuleEngineConfig};
pub use crate::controller::{Controller, ControllerBuilder};
pub use crate::dispatch::{BackendSelector, DispatchReport, MetricDispatcher};
pub use crate::error::AgentError;
pub use crate::finalizer::ReportFinalizer;
pub use crate::llm::{LlmGatewayConfig, SiumaiReasoningGateway};
pub use crate::outline::OutlineAgent;
pub use crate::planning::PlanningAgent;
pub use crate::retry::RetryPolicy;
