//! Backend selection policy.

use std::sync::Arc;

use metricflow_core::{
    BackendError, MetricSpec,
    config::{BackendPolicy, SelectionMode},
    traits::{BackendKind, MetricBackend},
};
use tracing::debug;

/// A backend chosen for one metric, plus the fallback to use if the chosen
/// backend turns out to have no applicable rule.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Backend to call first.
    pub primary: Arc<dyn MetricBackend>,
    /// Backend to call when `primary` reports no applicable rule.
    pub fallback: Option<Arc<dyn MetricBackend>>,
}

/// Routes metrics to backends according to a [`BackendPolicy`].
#[derive(Debug, Clone, Default)]
pub struct BackendSelector {
    rule_engine: Option<Arc<dyn MetricBackend>>,
    flexible: Option<Arc<dyn MetricBackend>>,
    policy: BackendPolicy,
}

impl BackendSelector {
    /// Create a selector with the given policy and no backends.
    #[must_use]
    pub fn new(policy: BackendPolicy) -> Self {
        Self {
            rule_engine: None,
            flexible: None,
            policy,
        }
    }

    /// Register the rule-engine backend.
    #[must_use]
    pub fn with_rule_engine(mut self, backend: Arc<dyn MetricBackend>) -> Self {
        self.rule_engine = Some(backend);
        self
    }

    /// Register the flexible backend.
    #[must_use]
    pub fn with_flexible(mut self, backend: Arc<dyn MetricBackend>) -> Self {
        self.flexible = Some(backend);
        self
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> &BackendPolicy {
        &self.policy
    }

    /// Whether at least one backend is registered.
    #[must_use]
    pub fn has_backends(&self) -> bool {
        self.rule_engine.is_some() || self.flexible.is_some()
    }

    fn backend(&self, kind: BackendKind) -> Option<&Arc<dyn MetricBackend>> {
        match kind {
            BackendKind::RuleEngine => self.rule_engine.as_ref(),
            BackendKind::Flexible => self.flexible.as_ref(),
        }
    }

    fn required(&self, kind: BackendKind, spec: &MetricSpec) -> Result<Selection, BackendError> {
        self.backend(kind)
            .map(|backend| Selection {
                primary: Arc::clone(backend),
                fallback: None,
            })
            .ok_or_else(|| {
                BackendError::unavailable(format!(
                    "no {kind} backend configured for metric '{}'",
                    spec.id
                ))
            })
    }

    /// Choose a backend for `spec`.
    ///
    /// Per-metric overrides and the exclusive modes name a backend outright.
    /// In automatic mode the rule engine is preferred when its capability
    /// check accepts the metric; the flexible backend is used otherwise, and
    /// also serves as the fallback when the rule engine later reports that no
    /// rule applies.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unavailable`] when the required backend is not
    /// registered.
    pub async fn select(&self, spec: &MetricSpec) -> Result<Selection, BackendError> {
        if let Some(kind) = self.policy.overrides.get(&spec.id) {
            debug!(metric_id = %spec.id, backend = %kind, "Backend override applies");
            return self.required(*kind, spec);
        }

        match self.policy.mode {
            SelectionMode::RuleEngineOnly => self.required(BackendKind::RuleEngine, spec),
            SelectionMode::FlexibleOnly => self.required(BackendKind::Flexible, spec),
            SelectionMode::Auto => match (&self.rule_engine, &self.flexible) {
                (Some(rule), Some(flexible)) => {
                    if rule.supports(spec).await {
                        Ok(Selection {
                            primary: Arc::clone(rule),
                            fallback: Some(Arc::clone(flexible)),
                        })
                    } else {
                        debug!(metric_id = %spec.id, "No rule registered, using flexible backend");
                        Ok(Selection {
                            primary: Arc::clone(flexible),
                            fallback: None,
                        })
                    }
                }
                (Some(only), None) | (None, Some(only)) => Ok(Selection {
                    primary: Arc::clone(only),
                    fallback: None,
                }),
                (None, None) => Err(BackendError::unavailable("no metric backend configured")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use metricflow_core::{
        MetricValue, Record,
        traits::ComputeOptions,
    };

    #[derive(Debug)]
    struct StubBackend {
        kind: BackendKind,
        supports: bool,
    }

    #[async_trait]
    impl MetricBackend for StubBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        async fn supports(&self, _spec: &MetricSpec) -> bool {
            self.supports
        }

        async fn compute(
            &self,
            _spec: &MetricSpec,
            _records: &[Record],
            _options: &ComputeOptions,
        ) -> Result<MetricValue, BackendError> {
            Ok(MetricValue::Scalar(0.0))
        }
    }

    fn selector(policy: BackendPolicy, rule_supports: bool) -> BackendSelector {
        BackendSelector::new(policy)
            .with_rule_engine(Arc::new(StubBackend {
                kind: BackendKind::RuleEngine,
                supports: rule_supports,
            }))
            .with_flexible(Arc::new(StubBackend {
                kind: BackendKind::Flexible,
                supports: true,
            }))
    }

    #[tokio::test]
    async fn test_auto_prefers_rule_engine_with_fallback() {
        let selection = selector(BackendPolicy::default(), true)
            .select(&MetricSpec::new("metric-001", "Total income"))
            .await
            .unwrap();
        assert_eq!(selection.primary.kind(), BackendKind::RuleEngine);
        assert_eq!(
            selection.fallback.map(|b| b.kind()),
            Some(BackendKind::Flexible)
        );
    }

    #[tokio::test]
    async fn test_auto_uses_flexible_when_rule_engine_declines() {
        let selection = selector(BackendPolicy::default(), false)
            .select(&MetricSpec::new("ad_hoc", "Ad hoc"))
            .await
            .unwrap();
        assert_eq!(selection.primary.kind(), BackendKind::Flexible);
        assert!(selection.fallback.is_none());
    }

    #[tokio::test]
    async fn test_override_beats_mode() {
        let policy = BackendPolicy::new(SelectionMode::RuleEngineOnly)
            .with_override("ad_hoc", BackendKind::Flexible);
        let selection = selector(policy, true)
            .select(&MetricSpec::new("ad_hoc", "Ad hoc"))
            .await
            .unwrap();
        assert_eq!(selection.primary.kind(), BackendKind::Flexible);
    }

    #[tokio::test]
    async fn test_missing_backend_is_unavailable() {
        let selector = BackendSelector::new(BackendPolicy::new(SelectionMode::FlexibleOnly));
        let err = selector
            .select(&MetricSpec::new("m", "m"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unavailable { .. }));
    }
}
