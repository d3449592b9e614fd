//! JSON configuration loading with environment substitution.
//!
//! Files are loaded into namespaces named after their file stem, so
//! `config/workflow.json` becomes the `workflow` namespace and its keys are
//! addressed as `workflow.coverage_threshold`. Values of the form `${VAR}` or
//! `${VAR:default}` are substituted from the environment before parsing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::WorkflowConfig;
use crate::{MetricflowError, Result};

/// Namespace holding the [`WorkflowConfig`].
pub const WORKFLOW_NAMESPACE: &str = "workflow";

/// Configuration manager backed by JSON documents.
///
/// # Examples
///
/// ```rust,no_run
/// use metricflow_core::config::ConfigManager;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut manager = ConfigManager::new();
///     manager.load_from_directory("./config").await?;
///
///     let workflow = manager.workflow_config()?;
///     let endpoint = manager.get_string("backends.rule_engine.base_url")?;
///     println!("{} -> {endpoint}", workflow.coverage_threshold);
///     Ok(())
/// }
/// ```
#[derive(Debug, Default)]
pub struct ConfigManager {
    state: RwLock<ConfigState>,
    config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
struct ConfigState {
    data: HashMap<String, serde_json::Value>,
    files: Vec<PathBuf>,
    overrides: HashMap<String, String>,
}

impl ConfigManager {
    /// Create an empty configuration manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory passed to the last [`Self::load_from_directory`] call.
    #[must_use]
    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    /// Load every `.json` file in a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or any file is invalid.
    pub async fn load_from_directory<P: AsRef<Path>>(&mut self, config_dir: P) -> Result<()> {
        let config_dir = config_dir.as_ref();
        info!(
            "Loading configuration from directory: {}",
            config_dir.display()
        );

        let mut entries = tokio::fs::read_dir(config_dir)
            .await
            .map_err(|e| MetricflowError::io(config_dir, e))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MetricflowError::io(config_dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            self.load_json_file(path).await?;
        }

        self.config_dir = Some(config_dir.to_path_buf());
        info!(
            "Loaded {} configuration files from {}",
            paths.len(),
            config_dir.display()
        );
        Ok(())
    }

    /// Load a single JSON file into the namespace named after its stem.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid JSON.
    pub async fn load_json_file<P: AsRef<Path>>(&self, file_path: P) -> Result<()> {
        let file_path = file_path.as_ref();
        debug!("Loading configuration file: {}", file_path.display());

        let content = tokio::fs::read_to_string(file_path)
            .await
            .map_err(|e| MetricflowError::io(file_path, e))?;

        let namespace = file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("default");

        self.load_json_str(namespace, &content)?;
        self.write().files.push(file_path.to_path_buf());
        Ok(())
    }

    /// Load a JSON document into `namespace`, replacing what was there.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid JSON after substitution.
    pub fn load_json_str(&self, namespace: &str, content: &str) -> Result<()> {
        let content = substitute_env_variables(content)?;
        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            MetricflowError::serialization(format!("configuration namespace '{namespace}'"), e)
        })?;

        self.write().data.insert(namespace.to_string(), value);
        debug!("Loaded configuration namespace '{}'", namespace);
        Ok(())
    }

    /// Get a value as a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is missing or not scalar.
    pub fn get_string(&self, key: &str) -> Result<String> {
        match self.get_value(key)? {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            serde_json::Value::Bool(b) => Ok(b.to_string()),
            _ => Err(MetricflowError::configuration(format!(
                "Configuration key '{key}' cannot be converted to string"
            ))),
        }
    }

    /// Get a value as a `u32`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is missing or not a non-negative integer.
    pub fn get_u32(&self, key: &str) -> Result<u32> {
        let value = self.get_value(key)?;
        let parsed = match &value {
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| {
            MetricflowError::configuration(format!(
                "Configuration key '{key}' cannot be converted to u32"
            ))
        })
    }

    /// Get a value as an `f64`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is missing or not numeric.
    pub fn get_f64(&self, key: &str) -> Result<f64> {
        let value = self.get_value(key)?;
        let parsed = match &value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| {
            MetricflowError::configuration(format!(
                "Configuration key '{key}' cannot be converted to f64"
            ))
        })
    }

    /// Get a value as a boolean.
    ///
    /// Strings such as `"yes"` or `"off"` are accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is missing or not boolean-like.
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        match self.get_value(key)? {
            serde_json::Value::Bool(b) => Ok(b),
            serde_json::Value::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Ok(true),
                "false" | "no" | "0" | "off" => Ok(false),
                _ => Err(MetricflowError::configuration(format!(
                    "Configuration key '{key}' cannot be converted to boolean"
                ))),
            },
            _ => Err(MetricflowError::configuration(format!(
                "Configuration key '{key}' is not a boolean"
            ))),
        }
    }

    /// Whether a key resolves to a value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get_value(key).is_ok()
    }

    /// Override a dotted key; overrides win over file values.
    pub fn set_override(&self, key: &str, value: &str) {
        self.write()
            .overrides
            .insert(key.to_string(), value.to_string());
        debug!("Set configuration override: {} = {}", key, value);
    }

    /// Remove an override.
    pub fn remove_override(&self, key: &str) {
        self.write().overrides.remove(key);
    }

    /// Deserialize a whole namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace is missing or has the wrong shape.
    pub fn section<T>(&self, namespace: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let data = self
            .read()
            .data
            .get(namespace)
            .cloned()
            .ok_or_else(|| {
                MetricflowError::not_found(format!("configuration namespace '{namespace}'"))
            })?;

        serde_json::from_value(data).map_err(|e| {
            MetricflowError::serialization(format!("configuration namespace '{namespace}'"), e)
        })
    }

    /// The workflow configuration.
    ///
    /// Falls back to [`WorkflowConfig::default`] when the `workflow`
    /// namespace is absent. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace is malformed or fails validation.
    pub fn workflow_config(&self) -> Result<WorkflowConfig> {
        let has_namespace = self.read().data.contains_key(WORKFLOW_NAMESPACE);
        let config = if has_namespace {
            self.section::<WorkflowConfig>(WORKFLOW_NAMESPACE)?
        } else {
            WorkflowConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Summary counts of what is loaded.
    #[must_use]
    pub fn stats(&self) -> ConfigStats {
        let state = self.read();
        ConfigStats {
            total_namespaces: state.data.len(),
            total_files: state.files.len(),
            overrides: state.overrides.len(),
        }
    }

    fn get_value(&self, key: &str) -> Result<serde_json::Value> {
        let state = self.read();

        if let Some(value) = state.overrides.get(key) {
            return Ok(serde_json::Value::String(value.clone()));
        }

        let mut parts = key.split('.');
        let namespace = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| MetricflowError::configuration("Empty configuration key"))?;

        let mut current = state.data.get(namespace).ok_or_else(|| {
            MetricflowError::not_found(format!("configuration namespace '{namespace}'"))
        })?;
        for part in parts {
            current = current.get(part).ok_or_else(|| {
                MetricflowError::not_found(format!("configuration key '{key}'"))
            })?;
        }

        Ok(current.clone())
    }

    fn read(&self) -> RwLockReadGuard<'_, ConfigState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ConfigState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Substitute `${VAR}` and `${VAR:default}` from the environment.
///
/// Unset variables without a default become empty strings.
fn substitute_env_variables(content: &str) -> Result<String> {
    let env_var_regex = Regex::new(r"\$\{([^}:]+)(?::([^}]*))?\}")
        .map_err(|e| MetricflowError::internal(format!("invalid substitution pattern: {e}")))?;

    let result = env_var_regex.replace_all(content, |captures: &regex::Captures<'_>| {
        let default_value = captures.get(2).map_or("", |m| m.as_str());
        std::env::var(&captures[1]).unwrap_or_else(|_| default_value.to_string())
    });
    Ok(result.into_owned())
}

/// Configuration statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigStats {
    /// Number of namespaces.
    pub total_namespaces: usize,
    /// Number of files loaded.
    pub total_files: usize,
    /// Number of overrides set.
    pub overrides: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_path_getters() {
        let manager = ConfigManager::new();
        manager
            .load_json_str(
                "backends",
                r#"{"rule_engine": {"base_url": "http://rules", "timeout_secs": 30},
                    "flexible": {"enabled": "yes", "weight": 0.5}}"#,
            )
            .unwrap();

        assert_eq!(
            manager.get_string("backends.rule_engine.base_url").unwrap(),
            "http://rules"
        );
        assert_eq!(manager.get_u32("backends.rule_engine.timeout_secs").unwrap(), 30);
        assert!(manager.get_bool("backends.flexible.enabled").unwrap());
        assert_eq!(manager.get_f64("backends.flexible.weight").unwrap(), 0.5);
        assert!(matches!(
            manager.get_string("backends.missing"),
            Err(MetricflowError::NotFound { .. })
        ));
        assert!(matches!(
            manager.get_string("nowhere.key"),
            Err(MetricflowError::NotFound { .. })
        ));
        assert!(matches!(
            manager.get_u32("backends.rule_engine.base_url"),
            Err(MetricflowError::Configuration { .. })
        ));
    }

    #[test]
    fn test_invalid_json_is_a_serialization_error() {
        let manager = ConfigManager::new();
        let err = manager.load_json_str("workflow", "{not json").unwrap_err();
        assert!(matches!(err, MetricflowError::Serialization { .. }));
        assert!(err.to_string().contains("workflow"));
    }

    #[test]
    fn test_section_errors() {
        let manager = ConfigManager::new();
        manager
            .load_json_str("workflow", r#"{"coverage_threshold": "high"}"#)
            .unwrap();

        assert!(matches!(
            manager.section::<WorkflowConfig>("workflow"),
            Err(MetricflowError::Serialization { .. })
        ));
        assert!(matches!(
            manager.section::<WorkflowConfig>("absent"),
            Err(MetricflowError::NotFound { .. })
        ));
    }

    #[test]
    fn test_override_wins() {
        let manager = ConfigManager::new();
        manager
            .load_json_str("workflow", r#"{"controller_step_budget": 10}"#)
            .unwrap();
        manager.set_override("workflow.controller_step_budget", "4");
        assert_eq!(manager.get_u32("workflow.controller_step_budget").unwrap(), 4);

        manager.remove_override("workflow.controller_step_budget");
        assert_eq!(manager.get_u32("workflow.controller_step_budget").unwrap(), 10);
    }

    #[test]
    fn test_substitution_default_applies() {
        let content = r#"{"url": "${METRICFLOW_TEST_SURELY_UNSET_VAR:http://localhost:8080}"}"#;
        let substituted = substitute_env_variables(content).unwrap();
        assert_eq!(substituted, r#"{"url": "http://localhost:8080"}"#);
    }

    #[test]
    fn test_workflow_config_defaults_without_namespace() {
        let manager = ConfigManager::new();
        assert_eq!(manager.workflow_config().unwrap(), WorkflowConfig::default());
        assert_eq!(manager.stats().total_namespaces, 0);
    }
}
