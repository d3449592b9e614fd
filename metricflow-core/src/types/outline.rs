//! Report outline types.
//!
//! An [`Outline`] is the validated skeleton of a report: ordered sections plus
//! the global set of metrics the sections need. A [`RawOutline`] is the
//! untrusted payload returned by the reasoning service before validation.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Specification of one computable metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Unique metric identifier.
    #[serde(alias = "metric_id")]
    pub id: String,

    /// Human-readable name.
    #[serde(alias = "metric_name", default)]
    pub name: String,

    /// Free-text description of how the metric is computed.
    #[serde(alias = "calculationLogic", default)]
    pub calculation_logic: String,

    /// Input record fields the computation reads.
    #[serde(alias = "requiredFields", default)]
    pub required_fields: BTreeSet<String>,

    /// Metric ids that must be computed first.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
}

impl MetricSpec {
    /// Create a metric spec with no fields and no dependencies.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            calculation_logic: String::new(),
            required_fields: BTreeSet::new(),
            dependencies: BTreeSet::new(),
        }
    }

    /// Set the calculation logic.
    #[must_use]
    pub fn with_logic(mut self, logic: impl Into<String>) -> Self {
        self.calculation_logic = logic.into();
        self
    }

    /// Add a required input field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.required_fields.insert(field.into());
        self
    }

    /// Add a dependency on another metric.
    #[must_use]
    pub fn with_dependency(mut self, metric_id: impl Into<String>) -> Self {
        self.dependencies.insert(metric_id.into());
        self
    }
}

/// One section of a validated outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    /// Section identifier.
    pub id: String,
    /// Section title.
    pub title: String,
    /// What the section should cover.
    pub description: String,
    /// Metrics the section presents, in declaration order.
    pub needed_metric_ids: IndexSet<String>,
}

impl OutlineSection {
    /// Create a section with no metrics.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            needed_metric_ids: IndexSet::new(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a needed metric id.
    #[must_use]
    pub fn with_metric(mut self, metric_id: impl Into<String>) -> Self {
        self.needed_metric_ids.insert(metric_id.into());
        self
    }
}

/// A validated report outline.
///
/// Every id in any section's `needed_metric_ids` is a key of
/// `global_metrics`, and `global_metrics` preserves declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    /// Report title.
    pub title: String,
    /// Ordered sections.
    pub sections: Vec<OutlineSection>,
    /// All metrics required by the report, keyed by id.
    pub global_metrics: IndexMap<String, MetricSpec>,
}

impl Outline {
    /// Metric ids in declaration order.
    pub fn metric_ids(&self) -> impl Iterator<Item = &String> {
        self.global_metrics.keys()
    }

    /// Look up a metric specification.
    #[must_use]
    pub fn metric(&self, id: &str) -> Option<&MetricSpec> {
        self.global_metrics.get(id)
    }
}

/// Unvalidated outline as returned by the reasoning service.
///
/// All fields are optional or defaulted so that a structurally incomplete
/// payload still deserializes and can be rejected with a precise reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOutline {
    /// Report title.
    #[serde(alias = "report_title", default)]
    pub title: Option<String>,

    /// Sections in the order given.
    #[serde(default)]
    pub sections: Vec<RawSection>,

    /// Metric list; `None` when the payload omitted it entirely.
    #[serde(alias = "globalMetrics", default)]
    pub global_metrics: Option<Vec<MetricSpec>>,
}

/// Unvalidated outline section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSection {
    /// Section identifier, filled in during post-processing when missing.
    #[serde(alias = "section_id", default)]
    pub id: Option<String>,

    /// Section title.
    #[serde(default)]
    pub title: String,

    /// Section description.
    #[serde(default)]
    pub description: String,

    /// Needed metric ids.
    #[serde(
        alias = "metrics_needed",
        alias = "neededMetricIds",
        alias = "needed_metric_ids",
        default
    )]
    pub metric_ids: Vec<String>,
}
