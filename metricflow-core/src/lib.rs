//! # Metricflow Core
//!
//! Core state, traits, and configuration for the Metricflow report
//! orchestrator.
//!
//! Metricflow turns a batch of records and an analysis objective into a
//! structured report by running a planning loop: outline the report, compute
//! the metrics the outline needs, and finalize once enough of them are known.
//! This crate holds the pieces every other crate shares:
//!
//! - **Workflow state**: [`WorkflowState`] with derived coverage and pending sets
//! - **Outline and report types**: [`Outline`], [`MetricSpec`], [`Report`]
//! - **Collaborator traits**: [`ReasoningGateway`] and [`MetricBackend`]
//! - **Configuration**: [`config::WorkflowConfig`] and the JSON [`config::ConfigManager`]
//! - **Error handling**: [`MetricflowError`] plus the collaborator error taxonomies
//!
//! ## Quick Start
//!
//! ```rust
//! use metricflow_core::prelude::*;
//!
//! let mut state = WorkflowState::new("Summarize account activity", Vec::new());
//! let outline = Outline {
//!     title: "Activity".into(),
//!     sections: vec![OutlineSection::new("sec_1", "Totals").with_metric("total")],
//!     global_metrics: [("total".to_string(), MetricSpec::new("total", "Total amount"))]
//!         .into_iter()
//!         .collect(),
//! };
//! state.install_outline(outline);
//! assert_eq!(state.pending_metric_ids(), vec!["total"]);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod prelude;

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{BackendError, MetricflowError, ReasoningError, Result};
pub use types::{
    AbortReason, ControllerState, Decision, FailureKind, MetricFailure, MetricOutcome, MetricSpec,
    MetricValue, Outline, OutlineSection, PlanningDecision, RawOutline, RawSection, Record, Report,
    StateSnapshot, WorkflowOutcome, WorkflowState,
};

pub use traits::*;

/// Version information for the Metricflow core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the Metricflow core library.
pub const NAME: &str = env!("CARGO_PKG_NAME");
