//! Integration tests for the configuration system.

use metricflow_core::MetricflowError;
use metricflow_core::config::{
    BackendPolicy, ConfigManager, OutlineFailurePolicy, SelectionMode, WorkflowConfig,
};
use metricflow_core::traits::BackendKind;
use tempfile::TempDir;
use tokio::fs;

#[tokio::test]
async fn test_load_directory_and_read_workflow_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path();

    let workflow = serde_json::json!({
        "coverage_threshold": 0.75,
        "dispatch_concurrency_limit": 2,
        "outline_failure_policy": "clarify",
        "backend_policy": {
            "mode": "rule_engine_only",
            "overrides": {"metric-007": "flexible"}
        }
    });
    let backends = serde_json::json!({
        "rule_engine": {"base_url": "http://rules.internal:8080", "input_field": "records"},
        "flexible": {"base_url": "http://flex.internal:9090"}
    });

    fs::write(
        config_dir.join("workflow.json"),
        serde_json::to_string_pretty(&workflow).unwrap(),
    )
    .await
    .unwrap();
    fs::write(
        config_dir.join("backends.json"),
        serde_json::to_string_pretty(&backends).unwrap(),
    )
    .await
    .unwrap();
    fs::write(config_dir.join("notes.txt"), "ignored").await.unwrap();

    let mut manager = ConfigManager::new();
    manager.load_from_directory(config_dir).await.unwrap();

    assert_eq!(manager.stats().total_files, 2);
    assert_eq!(manager.config_dir(), Some(config_dir));

    let config = manager.workflow_config().unwrap();
    let expected = WorkflowConfig::default()
        .with_coverage_threshold(0.75)
        .with_dispatch_concurrency_limit(2)
        .with_outline_failure_policy(OutlineFailurePolicy::Clarify)
        .with_backend_policy(
            BackendPolicy::new(SelectionMode::RuleEngineOnly)
                .with_override("metric-007", BackendKind::Flexible),
        );
    assert_eq!(config, expected);

    assert_eq!(
        manager.get_string("backends.rule_engine.base_url").unwrap(),
        "http://rules.internal:8080"
    );
}

#[tokio::test]
async fn test_environment_substitution() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("backends.json");

    // SAFETY: the variable name is unique to this test.
    unsafe {
        std::env::set_var("METRICFLOW_IT_FLEX_URL", "http://flex.from.env");
    }

    fs::write(
        &path,
        r#"{
            "flexible": {"base_url": "${METRICFLOW_IT_FLEX_URL}"},
            "rule_engine": {"base_url": "${METRICFLOW_IT_RULES_URL_UNSET:http://rules.default}"}
        }"#,
    )
    .await
    .unwrap();

    let manager = ConfigManager::new();
    manager.load_json_file(&path).await.unwrap();

    assert_eq!(
        manager.get_string("backends.flexible.base_url").unwrap(),
        "http://flex.from.env"
    );
    assert_eq!(
        manager.get_string("backends.rule_engine.base_url").unwrap(),
        "http://rules.default"
    );
}

#[tokio::test]
async fn test_invalid_workflow_config_is_rejected() {
    let manager = ConfigManager::new();
    manager
        .load_json_str("workflow", r#"{"metric_retry_budget": 0}"#)
        .unwrap();

    assert!(matches!(
        manager.workflow_config(),
        Err(MetricflowError::Configuration { .. })
    ));
}

#[tokio::test]
async fn test_missing_directory_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let mut manager = ConfigManager::new();

    let result = manager
        .load_from_directory(temp_dir.path().join("does-not-exist"))
        .await;
    let Err(MetricflowError::Io { path, source }) = result else {
        panic!("expected an IO error");
    };
    assert!(path.ends_with("does-not-exist"));
    assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
    assert!(manager.config_dir().is_none());
}

#[tokio::test]
async fn test_malformed_file_is_a_serialization_error() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("flexible.json"), "{\"endpoint\": ")
        .await
        .unwrap();

    let mut manager = ConfigManager::new();
    let err = manager
        .load_from_directory(temp_dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, MetricflowError::Serialization { .. }));
    assert!(err.to_string().contains("flexible"));
}
