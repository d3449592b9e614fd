//! Configuration for Metricflow.
//!
//! [`WorkflowConfig`] carries the control loop tunables; [`ConfigManager`]
//! loads them (and any collaborator settings) from JSON files.

pub mod manager;
pub mod workflow;

pub use manager::*;
pub use workflow::*;
