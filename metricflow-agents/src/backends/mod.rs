//! Remote metric backends.
//!
//! Both backends speak JSON over HTTP and normalize their payloads into
//! [`metricflow_core::MetricValue`], so the report does not depend on which
//! one produced a value.

mod http;

pub mod flexible;
pub mod rule_engine;

pub use flexible::{FlexibleBackend, FlexibleRequest};
pub use rule_engine::{KnowledgeMeta, RuleEngineBackend, RuleEngineConfig};
