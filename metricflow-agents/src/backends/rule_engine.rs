//! Rule-engine metric backend.
//!
//! The rule engine hosts pre-registered "knowledge" rules, each computing one
//! metric from a list of records. Two endpoints are used:
//!
//! - `POST {base}/api/rules/getKnowledgeMeta` lists the registered rules as
//!   `[{"id", "description", "inputField"}]`.
//! - `POST {base}/api/rules/executeKnowledge` runs one rule with
//!   `{"id": <rule>, "input": {<inputField>: [records]}}`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use metricflow_core::{
    BackendError, MetricSpec, MetricValue, Record,
    traits::{BackendKind, ComputeOptions, MetricBackend},
};

use super::http::{build_client, classify_request_error, read_json};

/// Metric ids with this prefix are assumed to be rule ids.
pub const RULE_ID_PREFIX: &str = "metric-";

/// Metadata of one registered rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeMeta {
    /// Rule identifier.
    pub id: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Name of the input key the rule reads its records from.
    #[serde(rename = "inputField", default)]
    pub input_field: Option<String>,
}

/// Settings for [`RuleEngineBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleEngineConfig {
    /// Base URL of the rule engine.
    pub base_url: String,
    /// Metric id to rule id.
    pub rule_mapping: HashMap<String, String>,
    /// Input key used when a rule does not declare one.
    pub default_input_field: String,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            rule_mapping: HashMap::new(),
            default_input_field: "transactions".to_string(),
        }
    }
}

impl RuleEngineConfig {
    /// Configuration for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Map a metric id onto a rule id.
    #[must_use]
    pub fn with_rule(mut self, metric_id: impl Into<String>, rule_id: impl Into<String>) -> Self {
        self.rule_mapping.insert(metric_id.into(), rule_id.into());
        self
    }
}

/// Low-latency backend backed by pre-registered rules.
#[derive(Debug)]
pub struct RuleEngineBackend {
    client: reqwest::Client,
    config: RuleEngineConfig,
    knowledge: OnceCell<Vec<KnowledgeMeta>>,
}

impl RuleEngineBackend {
    /// Create a backend talking to `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        Self::from_config(RuleEngineConfig::new(base_url))
    }

    /// Create a backend from a full configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unavailable`] if the HTTP client cannot be built.
    pub fn from_config(config: RuleEngineConfig) -> Result<Self, BackendError> {
        Ok(Self {
            client: build_client("metricflow-rule-engine")?,
            config,
            knowledge: OnceCell::new(),
        })
    }

    /// The backend configuration.
    #[must_use]
    pub fn config(&self) -> &RuleEngineConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/rules/{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Registered rules, fetched once and cached.
    ///
    /// A failed fetch is not cached.
    ///
    /// # Errors
    ///
    /// Returns the classified HTTP failure.
    pub async fn knowledge(&self) -> Result<&[KnowledgeMeta], BackendError> {
        let knowledge = self
            .knowledge
            .get_or_try_init(|| async {
                let timeout = ComputeOptions::default().timeout;
                let response = self
                    .client
                    .post(self.url("getKnowledgeMeta"))
                    .timeout(timeout)
                    .json(&json!({}))
                    .send()
                    .await
                    .map_err(|e| classify_request_error(&e, timeout))?;
                let body = read_json(response, timeout).await?;
                let knowledge: Vec<KnowledgeMeta> = serde_json::from_value(body).map_err(|e| {
                    BackendError::validation(format!("Unexpected knowledge metadata: {e}"))
                })?;
                info!("Loaded {} rule definitions", knowledge.len());
                Ok::<_, BackendError>(knowledge)
            })
            .await?;
        Ok(knowledge.as_slice())
    }

    async fn known_rules(&self) -> &[KnowledgeMeta] {
        match self.knowledge().await {
            Ok(knowledge) => knowledge,
            Err(e) => {
                warn!("Rule metadata unavailable: {}", e);
                &[]
            }
        }
    }

    /// Resolve the rule for `spec` and the input key it expects.
    async fn resolve(&self, spec: &MetricSpec) -> Option<(String, String)> {
        let known = self.known_rules().await;
        let rule_id = resolve_rule_id(&self.config.rule_mapping, known, &spec.id)?;
        let input_field = known
            .iter()
            .find(|meta| meta.id == rule_id)
            .and_then(|meta| meta.input_field.clone())
            .unwrap_or_else(|| self.config.default_input_field.clone());
        Some((rule_id, input_field))
    }
}

/// Pick the rule id for a metric: explicit mapping first, then a registered
/// rule with the same id, then the `metric-` naming convention.
fn resolve_rule_id(
    mapping: &HashMap<String, String>,
    known: &[KnowledgeMeta],
    metric_id: &str,
) -> Option<String> {
    if let Some(rule_id) = mapping.get(metric_id) {
        return Some(rule_id.clone());
    }
    if known.iter().any(|meta| meta.id == metric_id) || metric_id.starts_with(RULE_ID_PREFIX) {
        return Some(metric_id.to_string());
    }
    None
}

fn execute_body(rule_id: &str, input_field: &str, records: &[Record]) -> Value {
    let mut input = serde_json::Map::new();
    input.insert(input_field.to_string(), json!(records));
    json!({ "id": rule_id, "input": input })
}

/// Strip the engine's response envelope.
fn unwrap_envelope(body: Value) -> Result<Value, BackendError> {
    match body {
        Value::Object(mut map) => {
            if map.get("success").and_then(Value::as_bool) == Some(false) {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("rule execution failed");
                return Err(BackendError::validation(message.to_string()));
            }
            match map.remove("data") {
                Some(data) => Ok(data),
                None => Ok(Value::Object(map)),
            }
        }
        other => Ok(other),
    }
}

#[async_trait]
impl MetricBackend for RuleEngineBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::RuleEngine
    }

    fn name(&self) -> &'static str {
        "rule_engine"
    }

    async fn supports(&self, spec: &MetricSpec) -> bool {
        self.resolve(spec).await.is_some()
    }

    async fn compute(
        &self,
        spec: &MetricSpec,
        records: &[Record],
        options: &ComputeOptions,
    ) -> Result<MetricValue, BackendError> {
        let Some((rule_id, input_field)) = self.resolve(spec).await else {
            return Err(BackendError::no_applicable_rule(&spec.id));
        };
        debug!(
            metric_id = %spec.id,
            rule_id = %rule_id,
            records = records.len(),
            "Executing rule"
        );

        let response = self
            .client
            .post(self.url("executeKnowledge"))
            .timeout(options.timeout)
            .json(&execute_body(&rule_id, &input_field, records))
            .send()
            .await
            .map_err(|e| classify_request_error(&e, options.timeout))?;
        let body = read_json(response, options.timeout).await?;

        Ok(MetricValue::from_json(unwrap_envelope(body)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meta(id: &str) -> KnowledgeMeta {
        KnowledgeMeta {
            id: id.to_string(),
            description: String::new(),
            input_field: Some("rows".to_string()),
        }
    }

    #[test]
    fn test_rule_resolution_order() {
        let mapping = HashMap::from([("total_income".to_string(), "metric-A1".to_string())]);
        let known = vec![meta("balance_trend")];

        assert_eq!(
            resolve_rule_id(&mapping, &known, "total_income").as_deref(),
            Some("metric-A1")
        );
        assert_eq!(
            resolve_rule_id(&mapping, &known, "balance_trend").as_deref(),
            Some("balance_trend")
        );
        assert_eq!(
            resolve_rule_id(&mapping, &known, "metric-B7").as_deref(),
            Some("metric-B7")
        );
        assert_eq!(resolve_rule_id(&mapping, &known, "ad_hoc_ratio"), None);
    }

    #[test]
    fn test_execute_body_shape() {
        let record: Record =
            serde_json::from_value(json!({"txAmount": 12.5, "txDirection": "in"})).unwrap();
        let body = execute_body("metric-A1", "transactions", &[record]);
        assert_eq!(
            body,
            json!({
                "id": "metric-A1",
                "input": {"transactions": [{"txAmount": 12.5, "txDirection": "in"}]}
            })
        );
    }

    #[test]
    fn test_envelope_handling() {
        assert_eq!(
            unwrap_envelope(json!({"success": true, "data": 42})).unwrap(),
            json!(42)
        );
        assert_eq!(unwrap_envelope(json!([1, 2])).unwrap(), json!([1, 2]));
        let err = unwrap_envelope(json!({"success": false, "message": "unknown rule"}))
            .unwrap_err();
        assert_eq!(err, BackendError::validation("unknown rule"));
    }

    #[test]
    fn test_knowledge_meta_field_names() {
        let meta: KnowledgeMeta = serde_json::from_value(json!({
            "id": "metric-A1",
            "description": "Total income",
            "inputField": "transactions"
        }))
        .unwrap();
        assert_eq!(meta.input_field.as_deref(), Some("transactions"));
    }
}
