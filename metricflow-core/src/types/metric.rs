//! Metric values and per-metric outcomes.

use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// One entry of a ranked metric, e.g. top counterparties by amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    /// Entry label.
    pub label: String,
    /// Entry amount.
    pub amount: f64,
}

/// Backend-independent metric value.
///
/// Every backend normalizes its payload into one of these shapes so that the
/// report does not depend on which backend produced a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    /// A single number.
    Scalar(f64),
    /// An ordered list of labelled amounts.
    Ranked(Vec<RankedEntry>),
    /// A textual result.
    Text(String),
    /// Any other structured payload, kept verbatim.
    Structured(serde_json::Value),
}

impl MetricValue {
    /// Normalize an arbitrary JSON payload.
    ///
    /// Envelopes of the form `{"value": ..}`, `{"data": ..}` or
    /// `{"result": ..}` are unwrapped first. Numbers, and numeric strings,
    /// become [`MetricValue::Scalar`]; arrays whose items all carry a label
    /// and an amount become [`MetricValue::Ranked`].
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Object(mut map) if map.len() == 1 => {
                for key in ["value", "data", "result"] {
                    if let Some(inner) = map.remove(key) {
                        return Self::from_json(inner);
                    }
                }
                Self::Structured(Value::Object(map))
            }
            Value::Number(n) => n
                .as_f64()
                .map_or_else(|| Self::Structured(Value::Number(n)), Self::Scalar),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Self::Scalar(n),
                _ => Self::Text(s),
            },
            Value::Array(items) => match ranked_entries(&items) {
                Some(entries) => Self::Ranked(entries),
                None => Self::Structured(Value::Array(items)),
            },
            other => Self::Structured(other),
        }
    }

    /// The scalar value, if this is one.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }
}

fn ranked_entries(items: &[serde_json::Value]) -> Option<Vec<RankedEntry>> {
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| {
            let label = item
                .get("label")
                .or_else(|| item.get("name"))
                .and_then(serde_json::Value::as_str)?;
            let amount = item
                .get("amount")
                .or_else(|| item.get("value"))
                .and_then(serde_json::Value::as_f64)?;
            Some(RankedEntry {
                label: label.to_string(),
                amount,
            })
        })
        .collect()
}

/// Classification of a per-metric failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network-level failure.
    Transient,
    /// The call exceeded its deadline.
    Timeout,
    /// The backend rejected the request or the payload.
    Validation,
    /// No backend could compute the metric.
    Unsupported,
}

impl FailureKind {
    /// Whether another attempt may succeed.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Transient | Self::Timeout)
    }
}

impl From<&BackendError> for FailureKind {
    fn from(error: &BackendError) -> Self {
        match error {
            BackendError::Transient { .. } => Self::Transient,
            BackendError::Timeout { .. } => Self::Timeout,
            BackendError::Validation { .. } => Self::Validation,
            BackendError::NoApplicableRule { .. } | BackendError::Unavailable { .. } => {
                Self::Unsupported
            }
        }
    }
}

/// Bookkeeping for the latest failed computation of a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFailure {
    /// Failure classification.
    pub kind: FailureKind,
    /// Message of the last error seen.
    pub last_error: String,
    /// Backend that produced the failure, when one was selected.
    pub backend: Option<String>,
    /// Attempts made during the dispatch that produced this failure.
    pub attempts: u32,
}

/// Result of dispatching one metric id.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutcome {
    /// Freshly computed.
    Success(MetricValue),
    /// Already present and not forced; the stored value is untouched.
    AlreadyComputed,
    /// Dependencies are not computed yet; still pending.
    Deferred {
        /// Dependency ids that are missing.
        unmet: Vec<String>,
    },
    /// Retry budget already spent in earlier rounds; not attempted.
    Exhausted,
    /// The id is not declared by the current outline.
    UnknownMetric,
    /// Attempted and failed in this dispatch.
    Failure(MetricFailure),
}

impl MetricOutcome {
    /// Whether this outcome stored a new value.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_scalar_envelopes() {
        assert_eq!(MetricValue::from_json(json!(42)), MetricValue::Scalar(42.0));
        assert_eq!(
            MetricValue::from_json(json!({"value": 3.5})),
            MetricValue::Scalar(3.5)
        );
        assert_eq!(
            MetricValue::from_json(json!({"data": {"result": "12"}})),
            MetricValue::Scalar(12.0)
        );
    }

    #[test]
    fn test_normalize_ranked_list() {
        let value = MetricValue::from_json(json!([
            {"label": "Acme", "amount": 1200.0},
            {"name": "Globex", "value": 800}
        ]));
        assert_eq!(
            value,
            MetricValue::Ranked(vec![
                RankedEntry { label: "Acme".into(), amount: 1200.0 },
                RankedEntry { label: "Globex".into(), amount: 800.0 },
            ])
        );
    }

    #[test]
    fn test_normalize_falls_back_to_structured() {
        let value = MetricValue::from_json(json!({"a": 1, "b": 2}));
        assert!(matches!(value, MetricValue::Structured(_)));

        let value = MetricValue::from_json(json!("mostly agricultural"));
        assert_eq!(value, MetricValue::Text("mostly agricultural".into()));
    }
}
