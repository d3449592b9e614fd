//! Prelude module for convenient imports.
//!
//! # Examples
//!
//! ```rust
//! use metricflow_core::prelude::*;
//!
//! let config = WorkflowConfig::default();
//! let state = WorkflowState::new("objective", Vec::new());
//! assert_eq!(state.coverage(), 0.0);
//! assert!(config.validate().is_ok());
//! ```

pub use crate::error::{BackendError, MetricflowError, ReasoningError, Result};

pub use crate::types::{
    AbortReason, ControllerState, Decision, FailureKind, MetricDetail, MetricFailure,
    MetricOutcome, MetricSlot, MetricSpec, MetricValue, Outline, OutlineSection, PlanRecord,
    PlanningDecision, RankedEntry, RawOutline, RawSection, Record, Report, ReportSection,
    ReportSummary, StateSnapshot, WorkflowOutcome, WorkflowState,
};

pub use crate::traits::{
    BackendKind, ComputeOptions, MetricBackend, ReasoningGateway, ReasoningKind, ReasoningRequest,
};

pub use crate::config::{
    BackendPolicy, ConfigManager, OutlineFailurePolicy, SelectionMode, WorkflowConfig,
};
