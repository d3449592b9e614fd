//! # Metricflow Agents
//!
//! The agents that drive a Metricflow workflow, and the concrete
//! collaborators they talk to.
//!
//! - [`planning::PlanningAgent`] picks the next action from the workflow state
//! - [`outline::OutlineAgent`] produces and validates the report outline
//! - [`dispatch::MetricDispatcher`] computes metrics concurrently with retry
//! - [`finalizer::ReportFinalizer`] assembles the report
//! - [`controller::Controller`] runs the loop until a terminal state
//!
//! Remote collaborators live in [`backends`] (rule engine and flexible
//! compute over HTTP) and [`llm`] (a siumai-backed reasoning gateway).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use metricflow_agents::prelude::*;
//!
//! # async fn example(records: Vec<Record>) -> anyhow::Result<()> {
//! let gateway = SiumaiReasoningGateway::from_config(&LlmGatewayConfig::new("ollama", "qwen2.5")).await?;
//! let mut controller = Controller::builder()
//!     .gateway(Arc::new(gateway))
//!     .rule_engine(Arc::new(RuleEngineBackend::new("http://localhost:8081")?))
//!     .flexible(Arc::new(FlexibleBackend::new("http://localhost:9090/compute")?))
//!     .build()?;
//!
//! let mut state = WorkflowState::new("Review last quarter's cash flow", records);
//! match controller.run(&mut state).await {
//!     WorkflowOutcome::Done { report } => println!("{}", report.title),
//!     other => println!("stopped in {:?}", other.state()),
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backends;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod finalizer;
pub mod llm;
pub mod outline;
pub mod planning;
pub mod prelude;
pub mod retry;

pub use controller::{Controller, ControllerBuilder};
pub use dispatch::{BackendSelector, DispatchReport, MetricDispatcher};
pub use error::{AgentError, Result};
pub use finalizer::ReportFinalizer;
pub use outline::{OutlineAgent, OutlineValidationError};
pub use planning::PlanningAgent;
pub use retry::{AttemptState, RetryPolicy};

/// Version information for the Metricflow agents library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the Metricflow agents library.
pub const NAME: &str = env!("CARGO_PKG_NAME");
