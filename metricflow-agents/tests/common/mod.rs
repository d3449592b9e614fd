//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use metricflow_core::{
    BackendError, MetricSpec, MetricValue, ReasoningError, Record,
    config::WorkflowConfig,
    traits::{
        BackendKind, ComputeOptions, MetricBackend, ReasoningGateway, ReasoningKind,
        ReasoningRequest,
    },
};

/// Route library logs to the test output; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Workflow configuration without retry delays.
pub fn instant_config() -> WorkflowConfig {
    WorkflowConfig::default()
        .with_outline_retry_delay(Duration::ZERO)
        .with_metric_retry_delay(Duration::ZERO)
}

/// A few transaction records.
pub fn sample_records() -> Vec<Record> {
    (1..=5)
        .map(|i| {
            let record = json!({
                "txAmount": f64::from(i) * 100.0,
                "txDirection": if i % 2 == 0 { "out" } else { "in" },
                "txDate": format!("2024-03-0{i}"),
            });
            serde_json::from_value(record).unwrap()
        })
        .collect()
}

/// Metric ids `m1..=mn`.
pub fn metric_ids(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("m{i}")).collect()
}

/// Outline payload with three sections; metrics are spread across them in
/// declaration order. Each entry is `(metric id, dependencies)`.
pub fn outline_payload(metrics: &[(&str, &[&str])]) -> Value {
    let mut sections: Vec<Vec<&str>> = vec![Vec::new(); 3];
    for (index, (id, _)) in metrics.iter().enumerate() {
        sections[index % 3].push(*id);
    }
    let sections: Vec<Value> = sections
        .into_iter()
        .enumerate()
        .map(|(index, ids)| {
            json!({
                "title": format!("Section {}", index + 1),
                "description": "",
                "metrics_needed": ids,
            })
        })
        .collect();
    let global_metrics: Vec<Value> = metrics
        .iter()
        .map(|(id, dependencies)| {
            json!({
                "metric_id": id,
                "metric_name": format!("Metric {id}"),
                "calculation_logic": format!("sum of txAmount for {id}"),
                "dependencies": dependencies,
            })
        })
        .collect();
    json!({
        "report_title": "Account activity",
        "sections": sections,
        "global_metrics": global_metrics,
    })
}

/// Outline payload for independent metrics `m1..=mn`.
pub fn flat_outline_payload(n: usize) -> Value {
    let ids = metric_ids(n);
    let metrics: Vec<(&str, &[&str])> = ids.iter().map(|id| (id.as_str(), &[][..])).collect();
    outline_payload(&metrics)
}

/// Reasoning gateway replaying scripted replies.
///
/// Outline replies are consumed in order and the last one repeats. Planning
/// requests always get the same reply.
#[derive(Debug)]
pub struct ScriptedGateway {
    outlines: Mutex<VecDeque<Result<Value, ReasoningError>>>,
    planning: Result<Value, ReasoningError>,
    outline_calls: AtomicU32,
    planning_calls: AtomicU32,
}

impl ScriptedGateway {
    pub fn with_outline(payload: Value) -> Self {
        Self::with_outline_replies(vec![Ok(payload)])
    }

    pub fn with_outline_replies(replies: Vec<Result<Value, ReasoningError>>) -> Self {
        Self {
            outlines: Mutex::new(replies.into()),
            planning: Ok(json!({"rationale": "scripted rationale"})),
            outline_calls: AtomicU32::new(0),
            planning_calls: AtomicU32::new(0),
        }
    }

    pub fn with_planning_reply(mut self, reply: Result<Value, ReasoningError>) -> Self {
        self.planning = reply;
        self
    }

    pub fn outline_calls(&self) -> u32 {
        self.outline_calls.load(Ordering::SeqCst)
    }

    pub fn planning_calls(&self) -> u32 {
        self.planning_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningGateway for ScriptedGateway {
    async fn request(&self, request: &ReasoningRequest) -> Result<Value, ReasoningError> {
        match request.kind {
            ReasoningKind::PlanningDecision => {
                self.planning_calls.fetch_add(1, Ordering::SeqCst);
                self.planning.clone()
            }
            ReasoningKind::OutlineGeneration => {
                self.outline_calls.fetch_add(1, Ordering::SeqCst);
                let mut outlines = self.outlines.lock().unwrap();
                if outlines.len() > 1 {
                    outlines.pop_front().unwrap()
                } else {
                    outlines
                        .front()
                        .cloned()
                        .unwrap_or_else(|| Err(ReasoningError::unavailable("no script")))
                }
            }
        }
    }
}

/// Metric backend with scripted failures.
///
/// Successful calls return 1.0 from the rule-engine flavour and 2.0 from the
/// flexible one, so tests can tell which backend produced a value.
#[derive(Debug)]
pub struct FakeBackend {
    kind: BackendKind,
    supported: Option<HashSet<String>>,
    no_rule: HashSet<String>,
    rejected: HashSet<String>,
    transient: Mutex<HashMap<String, u32>>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeBackend {
    fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            supported: None,
            no_rule: HashSet::new(),
            rejected: HashSet::new(),
            transient: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn rule_engine() -> Self {
        Self::new(BackendKind::RuleEngine)
    }

    pub fn flexible() -> Self {
        Self::new(BackendKind::Flexible)
    }

    /// Only these ids pass the capability check.
    pub fn supporting(mut self, ids: &[&str]) -> Self {
        self.supported = Some(ids.iter().map(|id| (*id).to_string()).collect());
        self
    }

    /// These ids pass the capability check but have no rule at execution time.
    pub fn without_rule_for(mut self, ids: &[&str]) -> Self {
        self.no_rule = ids.iter().map(|id| (*id).to_string()).collect();
        self
    }

    /// Fail `id` transiently `times` times before succeeding.
    pub fn failing_transiently(self, id: &str, times: u32) -> Self {
        self.transient.lock().unwrap().insert(id.to_string(), times);
        self
    }

    /// Reject `id` with a validation error.
    pub fn rejecting(mut self, id: &str) -> Self {
        self.rejected.insert(id.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == id).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn value(&self) -> MetricValue {
        match self.kind {
            BackendKind::RuleEngine => MetricValue::Scalar(1.0),
            BackendKind::Flexible => MetricValue::Scalar(2.0),
        }
    }
}

#[async_trait]
impl MetricBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        match self.kind {
            BackendKind::RuleEngine => "fake_rule_engine",
            BackendKind::Flexible => "fake_flexible",
        }
    }

    async fn supports(&self, spec: &MetricSpec) -> bool {
        self.supported
            .as_ref()
            .is_none_or(|ids| ids.contains(&spec.id))
    }

    async fn compute(
        &self,
        spec: &MetricSpec,
        _records: &[Record],
        _options: &ComputeOptions,
    ) -> Result<MetricValue, BackendError> {
        self.calls.lock().unwrap().push(spec.id.clone());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.no_rule.contains(&spec.id) {
            return Err(BackendError::no_applicable_rule(&spec.id));
        }
        if self.rejected.contains(&spec.id) {
            return Err(BackendError::validation(format!(
                "schema mismatch for {}",
                spec.id
            )));
        }
        let mut transient = self.transient.lock().unwrap();
        if let Some(remaining) = transient.get_mut(&spec.id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BackendError::transient("connection reset by peer"));
            }
        }
        Ok(self.value())
    }
}
