pub mod anthropic;
pub mod demo;

use std::sync::Arc;

use crate::config::AnthropicConfig;
use crate::error::Result;
use crate::interfaces::providers::LlmProvider;

pub fn provider_from_config(config: &AnthropicConfig) -> Result<Arc<dyn LlmProvider>> {
    match config.api_key.as_deref().filter(|key| !key.trim().is_empty()) {
        Some(key) => {
            let provider = anthropic::AnthropicProvider::new(
                key.to_string(),
                config.model.clone(),
                config.base_url.clone(),
            )?;
            tracing::info!(model = provider.model(), "Using Anthropic provider");
            Ok(Arc::new(provider))
        }
        None => {
            tracing::warn!("ANTHROPIC_API_KEY is not configured; chat runs in demo mode");
            Ok(Arc::new(demo::DemoProvider))
        }
    }
}
