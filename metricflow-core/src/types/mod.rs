//! Core data types for Metricflow.
//!
//! The workflow state, the outline it is built around, metric values and
//! outcomes, planning decisions, and the final report.

pub mod decision;
pub mod metric;
pub mod outline;
pub mod report;
pub mod state;

pub use decision::{AbortReason, ControllerState, Decision, PlanningDecision, WorkflowOutcome};
pub use metric::{FailureKind, MetricFailure, MetricOutcome, MetricValue, RankedEntry};
pub use outline::{MetricSpec, Outline, OutlineSection, RawOutline, RawSection};
pub use report::{MetricDetail, MetricSlot, Report, ReportSection, ReportSummary};
pub use state::{PlanRecord, Record, StateSnapshot, WorkflowState};
