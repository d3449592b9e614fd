//! Chat-model integration.
//!
//! [`SiumaiReasoningGateway`] implements
//! [`metricflow_core::traits::ReasoningGateway`] on top of any siumai chat
//! client (`OpenAI`, Anthropic, Ollama).

mod prompts;

pub mod gateway;

pub use gateway::{LlmGatewayConfig, SiumaiReasoningGateway, parse_json_payload};
