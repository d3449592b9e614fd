//! Instruction-driven metric backend.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

use metricflow_core::{
    BackendError, MetricSpec, MetricValue, Record,
    traits::{BackendKind, ComputeOptions, MetricBackend},
};

use super::http::{build_client, classify_request_error, read_json};

/// Request body sent to the flexible compute service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlexibleRequest<'a> {
    /// Metric identifier.
    pub metric_id: &'a str,
    /// Metric name.
    pub name: &'a str,
    /// Free-form calculation instruction.
    pub instruction: &'a str,
    /// Fields the instruction relies on.
    pub required_fields: &'a BTreeSet<String>,
    /// Input records.
    pub records: &'a [Record],
}

impl<'a> FlexibleRequest<'a> {
    /// Build the request for one metric.
    #[must_use]
    pub fn new(spec: &'a MetricSpec, records: &'a [Record]) -> Self {
        Self {
            metric_id: &spec.id,
            name: &spec.name,
            instruction: &spec.calculation_logic,
            required_fields: &spec.required_fields,
            records,
        }
    }
}

/// Higher-latency backend that computes a metric from a natural-language
/// instruction and the raw records.
///
/// The service answers with `{"value": ...}` or a bare JSON value.
#[derive(Debug)]
pub struct FlexibleBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl FlexibleBackend {
    /// Create a backend posting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, BackendError> {
        Ok(Self {
            client: build_client("metricflow-flexible")?,
            endpoint: endpoint.into(),
        })
    }

    /// The compute endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MetricBackend for FlexibleBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Flexible
    }

    fn name(&self) -> &'static str {
        "flexible"
    }

    async fn compute(
        &self,
        spec: &MetricSpec,
        records: &[Record],
        options: &ComputeOptions,
    ) -> Result<MetricValue, BackendError> {
        if spec.calculation_logic.trim().is_empty() {
            return Err(BackendError::validation(format!(
                "metric '{}' has no calculation instruction",
                spec.id
            )));
        }
        debug!(metric_id = %spec.id, records = records.len(), "Requesting flexible computation");

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(options.timeout)
            .json(&FlexibleRequest::new(spec, records))
            .send()
            .await
            .map_err(|e| classify_request_error(&e, options.timeout))?;
        let body = read_json(response, options.timeout).await?;

        Ok(MetricValue::from_json(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let spec = MetricSpec::new("income_share", "Income share")
            .with_logic("sum of txAmount where txDirection is in, divided by total")
            .with_field("txAmount")
            .with_field("txDirection");
        let records: Vec<Record> = vec![
            serde_json::from_value(json!({"txAmount": 10, "txDirection": "in"})).unwrap(),
        ];

        let body = serde_json::to_value(FlexibleRequest::new(&spec, &records)).unwrap();
        assert_eq!(
            body,
            json!({
                "metric_id": "income_share",
                "name": "Income share",
                "instruction": "sum of txAmount where txDirection is in, divided by total",
                "required_fields": ["txAmount", "txDirection"],
                "records": [{"txAmount": 10, "txDirection": "in"}]
            })
        );
    }

    #[tokio::test]
    async fn test_empty_instruction_is_rejected_without_calling_out() {
        let backend = FlexibleBackend::new("http://127.0.0.1:9/unused").unwrap();
        let err = backend
            .compute(
                &MetricSpec::new("m", "m"),
                &[],
                &ComputeOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Validation { .. }));
    }
}
