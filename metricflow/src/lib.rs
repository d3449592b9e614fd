//! # Metricflow
//!
//! Metricflow turns a batch of tabular records and a free-text objective into
//! a structured analytical report. A planning loop decides what is missing,
//! asks a reasoning service for an outline, computes the outline's metrics
//! through interchangeable backends, and finalizes once enough of them are
//! known. Every step tolerates partial failure: metrics that cannot be
//! computed are reported as unavailable instead of sinking the report.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use metricflow::prelude::*;
//!
//! # async fn example(records: Vec<Record>) -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let mut manager = ConfigManager::new();
//! manager.load_from_directory("./config").await?;
//!
//! let gateway = metricflow::setup::gateway_from_config(&manager).await?;
//! let mut controller = metricflow::setup::controller_from_config(&manager, Arc::new(gateway))?;
//!
//! let mut state = WorkflowState::new("Review last quarter's cash flow", records);
//! if let WorkflowOutcome::Done { report } = controller.run(&mut state).await {
//!     println!("{} ({:.0}% coverage)", report.title, report.summary.coverage * 100.0);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **metricflow-core**: workflow state, outline and report types, collaborator traits,
//!   configuration
//! - **metricflow-agents**: planning, outline, dispatch, finalization, the controller, and the
//!   HTTP/LLM collaborators

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod setup;

// Re-export all public APIs from sub-crates
pub use metricflow_agents as agents;
pub use metricflow_core as core;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and traits
/// from all Metricflow crates.
pub mod prelude {
    pub use metricflow_agents::prelude::*;
}

/// Version information for the Metricflow framework.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the Metricflow framework.
pub const NAME: &str = env!("CARGO_PKG_NAME");
