//! # Troupe Providers
//!
//! LLM provider implementations. All OpenAI-compatible APIs are handled by
//! a single [`OpenAiCompatibleProvider`], distinguished only by endpoint and
//! API key; the [`ScriptedProvider`] answers offline with canned lines and
//! doubles as the test provider.

pub mod openai_compatible;
pub mod scripted;

use std::collections::HashMap;
use std::sync::Arc;

use troupe_core::config::LlmConfig;
use troupe_core::error::{Result, TroupeError};
use troupe_core::traits::LlmProvider;

pub use openai_compatible::OpenAiCompatibleProvider;
pub use scripted::ScriptedProvider;

/// Create a provider from configuration.
///
/// Accepted names: `"openai"`, `"scripted"`, or `"custom:<base-url>"` for
/// any other OpenAI-compatible endpoint.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    match config.provider.as_str() {
        "scripted" => Ok(Arc::new(ScriptedProvider::default())),
        "openai" => Ok(Arc::new(OpenAiCompatibleProvider::openai(config))),
        other if other.starts_with("custom:") => {
            Ok(Arc::new(OpenAiCompatibleProvider::custom(other, config)))
        }
        other => Err(TroupeError::ProviderNotFound(other.to_string())),
    }
}

/// Build the named-provider registry handed to the engine: every provider
/// name an agent definition may reference.
pub fn provider_registry(config: &LlmConfig) -> HashMap<String, Arc<dyn LlmProvider>> {
    let mut registry: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
    registry.insert(
        "openai".into(),
        Arc::new(OpenAiCompatibleProvider::openai(config)),
    );
    registry.insert("scripted".into(), Arc::new(ScriptedProvider::default()));
    registry
}
