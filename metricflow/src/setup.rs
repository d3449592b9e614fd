//! Building a controller from loaded configuration.
//!
//! Besides the `workflow` namespace read by
//! [`ConfigManager::workflow_config`], three optional namespaces are used:
//!
//! - `llm`: [`LlmGatewayConfig`] for the reasoning gateway
//! - `rule_engine`: [`RuleEngineConfig`] for the rule-engine backend
//! - `flexible`: [`FlexibleSettings`] for the flexible backend
//!
//! At least one backend namespace must be present.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use metricflow_agents::{
    AgentError, Controller, Result,
    backends::{FlexibleBackend, RuleEngineBackend, RuleEngineConfig},
    llm::{LlmGatewayConfig, SiumaiReasoningGateway},
};
use metricflow_core::{config::ConfigManager, traits::ReasoningGateway};

/// Namespace of the reasoning gateway settings.
pub const LLM_NAMESPACE: &str = "llm";
/// Namespace of the rule-engine backend settings.
pub const RULE_ENGINE_NAMESPACE: &str = "rule_engine";
/// Namespace of the flexible backend settings.
pub const FLEXIBLE_NAMESPACE: &str = "flexible";

/// Settings for the flexible backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlexibleSettings {
    /// Compute endpoint.
    pub endpoint: String,
}

/// Build the siumai reasoning gateway from the `llm` namespace, or from
/// [`LlmGatewayConfig::default`] when it is absent.
///
/// # Errors
///
/// Returns an error if the namespace is malformed or the client cannot be
/// built.
pub async fn gateway_from_config(manager: &ConfigManager) -> Result<SiumaiReasoningGateway> {
    let config = if manager.contains(LLM_NAMESPACE) {
        manager.section::<LlmGatewayConfig>(LLM_NAMESPACE)?
    } else {
        LlmGatewayConfig::default()
    };
    SiumaiReasoningGateway::from_config(&config).await
}

/// Build a controller from the loaded configuration and a gateway.
///
/// # Errors
///
/// Returns an error if a namespace is malformed, the workflow configuration
/// is invalid, or no backend is configured.
pub fn controller_from_config(
    manager: &ConfigManager,
    gateway: Arc<dyn ReasoningGateway>,
) -> Result<Controller> {
    let workflow = manager.workflow_config()?;
    let mut builder = Controller::builder().gateway(gateway).config(workflow);

    if manager.contains(RULE_ENGINE_NAMESPACE) {
        let config = manager.section::<RuleEngineConfig>(RULE_ENGINE_NAMESPACE)?;
        info!("Using rule engine at {}", config.base_url);
        builder = builder.rule_engine(Arc::new(RuleEngineBackend::from_config(config)?));
    }
    if manager.contains(FLEXIBLE_NAMESPACE) {
        let settings = manager.section::<FlexibleSettings>(FLEXIBLE_NAMESPACE)?;
        info!("Using flexible backend at {}", settings.endpoint);
        builder = builder.flexible(Arc::new(FlexibleBackend::new(settings.endpoint)?));
    }

    builder.build().map_err(|e| match e {
        AgentError::Configuration { message } => AgentError::configuration(format!(
            "{message} (add a '{RULE_ENGINE_NAMESPACE}' or '{FLEXIBLE_NAMESPACE}' configuration file)"
        )),
        other => other,
    })
}
