//! Finalized report structure handed to report consumers.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::metric::MetricValue;

/// A metric slot in a report section.
///
/// Missing metrics are always listed as [`MetricSlot::Unavailable`] so that
/// consumers can detect partial coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricSlot {
    /// The computed value.
    Available {
        /// Normalized value.
        value: MetricValue,
    },
    /// No value could be computed.
    Unavailable {
        /// Last recorded error, if any.
        reason: Option<String>,
    },
}

impl MetricSlot {
    /// Whether the slot holds a value.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    /// The value, if available.
    #[must_use]
    pub fn value(&self) -> Option<&MetricValue> {
        match self {
            Self::Available { value } => Some(value),
            Self::Unavailable { .. } => None,
        }
    }
}

/// One section of the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    /// Section identifier.
    pub id: String,
    /// Section title.
    pub title: String,
    /// Section description.
    pub description: String,
    /// Values for every metric the section declared, in declaration order.
    pub metric_values: IndexMap<String, MetricSlot>,
}

/// Aggregate figures about the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Number of sections.
    pub total_sections: usize,
    /// Number of metrics the outline requires.
    pub total_metrics_required: usize,
    /// Number of required metrics with a value.
    pub total_metrics_computed: usize,
    /// Planning steps taken before finalization.
    pub planning_steps: u32,
    /// Fraction of required metrics computed.
    pub coverage: f64,
}

/// Per-metric detail listed at the end of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDetail {
    /// Metric name.
    pub name: String,
    /// Calculation logic.
    pub logic: String,
    /// Input fields used.
    pub required_fields: BTreeSet<String>,
    /// Whether a value is present.
    pub computed: bool,
}

/// The finalized report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Report title.
    pub title: String,
    /// Sections in outline order.
    pub sections: Vec<ReportSection>,
    /// Summary figures.
    pub summary: ReportSummary,
    /// Metric details in outline declaration order.
    pub metrics_detail: IndexMap<String, MetricDetail>,
}

impl Report {
    /// Ids that appear as unavailable in any section, without duplicates.
    #[must_use]
    pub fn unavailable_metric_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for section in &self.sections {
            for (id, slot) in &section.metric_values {
                if !slot.is_available() && !ids.contains(&id.as_str()) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}
