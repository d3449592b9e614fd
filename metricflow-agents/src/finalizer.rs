//! Report assembly.

use indexmap::IndexMap;
use tracing::info;

use metricflow_core::{
    Report, WorkflowState,
    config::WorkflowConfig,
    types::{MetricDetail, MetricSlot, ReportSection, ReportSummary},
};

use crate::error::{AgentError, Result};

/// Assembles the final report from the outline and the computed values.
///
/// Output depends only on the outline and the computed metrics, so the same
/// state always yields the same report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportFinalizer {
    coverage_threshold: f64,
}

impl ReportFinalizer {
    /// Create a finalizer enforcing `coverage_threshold`.
    #[must_use]
    pub fn new(coverage_threshold: f64) -> Self {
        Self { coverage_threshold }
    }

    /// Create a finalizer from the workflow configuration.
    #[must_use]
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(config.coverage_threshold)
    }

    /// Build the report.
    ///
    /// Every metric a section declares appears in it: computed metrics as
    /// [`MetricSlot::Available`], the rest as [`MetricSlot::Unavailable`]
    /// with the last recorded error.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::PolicyViolation`] if there is no outline or the
    /// coverage is below the threshold.
    pub fn finalize(&self, state: &WorkflowState) -> Result<Report> {
        let Some(outline) = state.outline() else {
            return Err(AgentError::policy_violation(
                "cannot finalize a report without an outline",
            ));
        };
        let coverage = state.coverage();
        if coverage < self.coverage_threshold {
            return Err(AgentError::policy_violation(format!(
                "coverage {coverage:.2} is below the threshold {:.2}",
                self.coverage_threshold
            )));
        }

        let slot = |id: &str| match state.computed(id) {
            Some(value) => MetricSlot::Available {
                value: value.clone(),
            },
            None => MetricSlot::Unavailable {
                reason: state
                    .metric_failure(id)
                    .map(|failure| failure.last_error.clone()),
            },
        };

        let sections: Vec<ReportSection> = outline
            .sections
            .iter()
            .map(|section| ReportSection {
                id: section.id.clone(),
                title: section.title.clone(),
                description: section.description.clone(),
                metric_values: section
                    .needed_metric_ids
                    .iter()
                    .map(|id| (id.clone(), slot(id)))
                    .collect(),
            })
            .collect();

        let metrics_detail: IndexMap<String, MetricDetail> = outline
            .global_metrics
            .iter()
            .map(|(id, spec)| {
                let detail = MetricDetail {
                    name: spec.name.clone(),
                    logic: spec.calculation_logic.clone(),
                    required_fields: spec.required_fields.clone(),
                    computed: state.is_computed(id),
                };
                (id.clone(), detail)
            })
            .collect();

        let summary = ReportSummary {
            total_sections: sections.len(),
            total_metrics_required: outline.global_metrics.len(),
            total_metrics_computed: metrics_detail.values().filter(|d| d.computed).count(),
            planning_steps: state.planning_step(),
            coverage,
        };
        info!(
            sections = summary.total_sections,
            computed = summary.total_metrics_computed,
            required = summary.total_metrics_required,
            coverage,
            "Report finalized"
        );

        Ok(Report {
            title: outline.title.clone(),
            sections,
            summary,
            metrics_detail,
        })
    }
}
