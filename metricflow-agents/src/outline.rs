//! Outline agent.
//!
//! [`OutlineAgent`] asks the reasoning gateway for a report outline, treats
//! the reply as untrusted input, and validates it before anything reaches the
//! workflow state. Invalid replies and gateway failures are retried with the
//! same inputs until the outline retry budget is spent.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, instrument, warn};

use metricflow_core::{
    MetricSpec, Outline, OutlineSection, RawOutline, ReasoningError, Record, WorkflowState,
    config::WorkflowConfig,
    traits::{ReasoningGateway, ReasoningKind, ReasoningRequest},
};

use crate::error::{AgentError, Result};
use crate::retry::{AttemptState, RetryPolicy, run_with_retry};

/// Why a returned outline was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutlineValidationError {
    /// The payload does not have the outline structure at all
    #[error("outline payload does not match the schema: {message}")]
    Schema {
        /// Decoder message
        message: String,
    },
    /// `global_metrics` is missing or empty
    #[error("outline declares no global metrics")]
    NoMetrics,
    /// A metric has a blank id
    #[error("metric #{position} has an empty id")]
    EmptyMetricId {
        /// 1-based position in `global_metrics`
        position: usize,
    },
    /// Two metrics share an id
    #[error("metric id '{metric_id}' is declared more than once")]
    DuplicateMetric {
        /// The repeated id
        metric_id: String,
    },
    /// Fewer sections than required
    #[error("outline has {found} sections, at least {required} required")]
    TooFewSections {
        /// Sections returned
        found: usize,
        /// Minimum required
        required: usize,
    },
    /// A section needs a metric that is not declared
    #[error("section '{section_id}' needs undeclared metric '{metric_id}'")]
    UnresolvedMetric {
        /// Section identifier
        section_id: String,
        /// Missing metric id
        metric_id: String,
    },
}

/// Failure of one outline attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
enum AttemptError {
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),
    #[error(transparent)]
    Invalid(#[from] OutlineValidationError),
}

/// Produces validated report outlines.
#[derive(Debug, Clone)]
pub struct OutlineAgent {
    gateway: Arc<dyn ReasoningGateway>,
    retry: RetryPolicy,
    min_sections: usize,
    sample_size: usize,
}

impl OutlineAgent {
    /// Create an agent from the workflow configuration.
    #[must_use]
    pub fn new(gateway: Arc<dyn ReasoningGateway>, config: &WorkflowConfig) -> Self {
        Self {
            gateway,
            retry: RetryPolicy::for_outline(config),
            min_sections: config.min_outline_sections,
            sample_size: config.outline_sample_size,
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Generate a validated outline.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::OutlineGenerationExhausted`] when no attempt
    /// within the budget produced a valid outline.
    #[instrument(skip(self, objective, data_sample), fields(records = data_sample.len()))]
    pub async fn generate(&self, objective: &str, data_sample: &[Record]) -> Result<Outline> {
        let field_names: BTreeSet<String> = data_sample
            .iter()
            .flat_map(|record| record.keys().cloned())
            .collect();
        let request = ReasoningRequest::new(
            ReasoningKind::OutlineGeneration,
            self.request_context(objective, data_sample, &field_names),
        );

        let request = &request;
        let field_names = &field_names;
        let outcome = run_with_retry(
            &self.retry,
            |_: &AttemptError| true,
            move |attempt| async move {
                info!(attempt, "Requesting report outline");
                let payload = self.gateway.request(request).await?;
                let outline = validate_outline(payload, objective, field_names, self.min_sections)
                    .inspect_err(|e| warn!(attempt, "Outline rejected: {}", e))?;
                Ok::<_, AttemptError>(outline)
            },
        )
        .await;

        match outcome {
            AttemptState::Succeeded { value, attempts } => {
                info!(
                    attempts,
                    sections = value.sections.len(),
                    metrics = value.global_metrics.len(),
                    "Outline accepted"
                );
                Ok(value)
            }
            AttemptState::ExhaustedFailed {
                attempts,
                last_error,
                ..
            } => {
                warn!(attempts, "Outline generation exhausted: {}", last_error);
                Err(AgentError::outline_exhausted(attempts, last_error.to_string()))
            }
            AttemptState::Attempting(attempt) => Err(AgentError::outline_exhausted(
                attempt,
                "retry loop stopped before a result",
            )),
        }
    }

    /// Generate an outline for `state` and install it.
    ///
    /// On failure the current outline, if any, is left untouched and the
    /// error is recorded in the state.
    ///
    /// # Errors
    ///
    /// Same as [`Self::generate`].
    pub async fn generate_into(&self, state: &mut WorkflowState) -> Result<u32> {
        match self.generate(state.objective(), state.data_sample()).await {
            Ok(outline) => {
                let version = state.install_outline(outline);
                info!(version, "Installed outline");
                Ok(version)
            }
            Err(e) => {
                state.record_error(e.to_string());
                Err(e)
            }
        }
    }

    fn request_context(
        &self,
        objective: &str,
        data_sample: &[Record],
        field_names: &BTreeSet<String>,
    ) -> Value {
        let sample = &data_sample[..self.sample_size.min(data_sample.len())];
        json!({
            "objective": objective,
            "data_sample": sample,
            "available_fields": field_names,
            "record_count": data_sample.len(),
            "min_sections": self.min_sections,
        })
    }
}

/// Post-process and validate an outline payload.
///
/// Sections without an id get `sec_<n>`, a missing title falls back to the
/// objective, and metrics without required fields get the field names that
/// occur in their calculation logic.
///
/// # Errors
///
/// Returns the first schema violation found.
pub fn validate_outline(
    payload: Value,
    objective: &str,
    field_names: &BTreeSet<String>,
    min_sections: usize,
) -> std::result::Result<Outline, OutlineValidationError> {
    let raw: RawOutline =
        serde_json::from_value(payload).map_err(|e| OutlineValidationError::Schema {
            message: e.to_string(),
        })?;

    let metrics = raw.global_metrics.unwrap_or_default();
    if metrics.is_empty() {
        return Err(OutlineValidationError::NoMetrics);
    }

    let mut global_metrics: IndexMap<String, MetricSpec> = IndexMap::with_capacity(metrics.len());
    for (index, mut spec) in metrics.into_iter().enumerate() {
        spec.id = spec.id.trim().to_string();
        if spec.id.is_empty() {
            return Err(OutlineValidationError::EmptyMetricId {
                position: index + 1,
            });
        }
        if global_metrics.contains_key(&spec.id) {
            return Err(OutlineValidationError::DuplicateMetric { metric_id: spec.id });
        }
        if spec.name.trim().is_empty() {
            spec.name.clone_from(&spec.id);
        }
        if spec.required_fields.is_empty() {
            spec.required_fields = fields_in_logic(&spec.calculation_logic, field_names);
        }
        global_metrics.insert(spec.id.clone(), spec);
    }

    if raw.sections.len() < min_sections {
        return Err(OutlineValidationError::TooFewSections {
            found: raw.sections.len(),
            required: min_sections,
        });
    }

    let mut section_ids = HashSet::new();
    let mut sections = Vec::with_capacity(raw.sections.len());
    for (index, raw_section) in raw.sections.into_iter().enumerate() {
        let id = raw_section
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && !section_ids.contains(id))
            .unwrap_or_else(|| format!("sec_{}", index + 1));
        section_ids.insert(id.clone());

        let needed_metric_ids: IndexSet<String> = raw_section
            .metric_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .collect();
        if let Some(missing) = needed_metric_ids
            .iter()
            .find(|metric_id| !global_metrics.contains_key(*metric_id))
        {
            return Err(OutlineValidationError::UnresolvedMetric {
                section_id: id,
                metric_id: missing.clone(),
            });
        }

        sections.push(OutlineSection {
            id,
            title: raw_section.title,
            description: raw_section.description,
            needed_metric_ids,
        });
    }

    let title = raw
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| objective.to_string());

    Ok(Outline {
        title,
        sections,
        global_metrics,
    })
}

fn fields_in_logic(logic: &str, field_names: &BTreeSet<String>) -> BTreeSet<String> {
    field_names
        .iter()
        .filter(|field| logic.contains(field.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use test_case::test_case;

    /// Replays scripted replies, repeating the last one.
    #[derive(Debug)]
    struct ScriptedGateway {
        replies: Mutex<Vec<std::result::Result<Value, ReasoningError>>>,
        calls: AtomicU32,
        last_context: Mutex<Option<Value>>,
    }

    impl ScriptedGateway {
        fn new(replies: Vec<std::result::Result<Value, ReasoningError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicU32::new(0),
                last_context: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ReasoningGateway for ScriptedGateway {
        async fn request(
            &self,
            request: &ReasoningRequest,
        ) -> std::result::Result<Value, ReasoningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_context.lock().unwrap() = Some(request.context.clone());
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies[0].clone()
            }
        }
    }

    fn config() -> WorkflowConfig {
        WorkflowConfig::default().with_outline_retry_delay(Duration::ZERO)
    }

    fn fields() -> BTreeSet<String> {
        ["txAmount", "txDirection", "txDate"]
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn valid_payload() -> Value {
        json!({
            "report_title": "Account activity",
            "sections": [
                {"section_id": "income", "title": "Income", "description": "", "metrics_needed": ["total_in"]},
                {"title": "Spending", "description": "", "metrics_needed": ["total_out"]},
                {"title": "Balance", "description": "", "metrics_needed": ["total_in", "total_out"]}
            ],
            "global_metrics": [
                {"metric_id": "total_in", "metric_name": "Total income",
                 "calculation_logic": "sum of txAmount where txDirection is in"},
                {"metric_id": "total_out", "metric_name": "Total spending",
                 "calculation_logic": "sum of txAmount where txDirection is out",
                 "required_fields": ["txAmount"]}
            ]
        })
    }

    #[test]
    fn test_valid_outline_is_post_processed() {
        let outline = validate_outline(valid_payload(), "objective", &fields(), 3).unwrap();

        assert_eq!(outline.title, "Account activity");
        let ids: Vec<&str> = outline.sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["income", "sec_2", "sec_3"]);

        let inferred: Vec<&str> = outline.global_metrics["total_in"]
            .required_fields
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(inferred, vec!["txAmount", "txDirection"]);
        assert_eq!(outline.global_metrics["total_out"].required_fields.len(), 1);
    }

    #[test_case(json!({"sections": []}), OutlineValidationError::NoMetrics ; "missing metrics")]
    #[test_case(
        json!({"sections": [], "global_metrics": [{"metric_id": "a"}, {"metric_id": "a"}]}),
        OutlineValidationError::DuplicateMetric { metric_id: "a".into() } ;
        "duplicate metric"
    )]
    #[test_case(
        json!({"sections": [{"title": "only"}], "global_metrics": [{"metric_id": "a"}]}),
        OutlineValidationError::TooFewSections { found: 1, required: 3 } ;
        "too few sections"
    )]
    #[test_case(
        json!({
            "sections": [{"title": "x"}, {"title": "y"}, {"title": "z", "metrics_needed": ["b"]}],
            "global_metrics": [{"metric_id": "a"}]
        }),
        OutlineValidationError::UnresolvedMetric {
            section_id: "sec_3".into(),
            metric_id: "b".into(),
        } ;
        "unresolved metric"
    )]
    #[test_case(
        json!({"sections": [], "global_metrics": [{"metric_id": " "}]}),
        OutlineValidationError::EmptyMetricId { position: 1 } ;
        "blank metric id"
    )]
    fn test_invalid_outlines(payload: Value, expected: OutlineValidationError) {
        assert_eq!(
            validate_outline(payload, "objective", &fields(), 3).unwrap_err(),
            expected
        );
    }

    #[tokio::test]
    async fn test_retries_until_valid() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Ok(json!({"sections": []})),
            Err(ReasoningError::Timeout { timeout_ms: 10 }),
            Ok(valid_payload()),
        ]));
        let agent = OutlineAgent::new(gateway.clone(), &config());

        let outline = agent.generate("objective", &[]).await.unwrap();
        assert_eq!(outline.global_metrics.len(), 2);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_leaves_previous_outline() {
        let good = Arc::new(ScriptedGateway::new(vec![Ok(valid_payload())]));
        let mut state = WorkflowState::new("objective", Vec::new());
        OutlineAgent::new(good, &config())
            .generate_into(&mut state)
            .await
            .unwrap();
        let installed = state.outline().cloned();

        let bad = Arc::new(ScriptedGateway::new(vec![Ok(json!({"title": "no metrics"}))]));
        let err = OutlineAgent::new(bad.clone(), &config())
            .generate_into(&mut state)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AgentError::OutlineGenerationExhausted { attempts: 3, .. }
        ));
        assert_eq!(bad.calls.load(Ordering::SeqCst), 3);
        assert_eq!(state.outline().cloned(), installed);
        assert_eq!(state.outline_version(), 1);
        assert_eq!(state.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_request_context() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(valid_payload())]));
        let agent = OutlineAgent::new(gateway.clone(), &config().with_outline_sample_size(2));
        let records: Vec<Record> = (0..5)
            .map(|i| {
                serde_json::from_value(json!({"txAmount": i, "txDate": "2024-01-01"})).unwrap()
            })
            .collect();

        agent.generate("Summarize spending", &records).await.unwrap();

        let context = gateway.last_context.lock().unwrap().clone().unwrap();
        assert_eq!(context["objective"], "Summarize spending");
        assert_eq!(context["data_sample"].as_array().unwrap().len(), 2);
        assert_eq!(context["available_fields"], json!(["txAmount", "txDate"]));
        assert_eq!(context["record_count"], 5);
        assert_eq!(context["min_sections"], 3);
    }
}
