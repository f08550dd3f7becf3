use async_trait::async_trait;
use serde_json::json;

use crate::domains::lead::DEMO_MESSAGE;
use crate::error::Result;
use crate::interfaces::providers::{LlmProvider, PromptMessage};

/// Stand-in used when no API key is configured. Always answers with the
/// opening discovery question in the reply contract's JSON shape.
#[derive(Clone, Default)]
pub struct DemoProvider;

#[async_trait]
impl LlmProvider for DemoProvider {
    fn name(&self) -> &str {
        "demo"
    }

    async fn complete(&self, _system: &str, _messages: &[PromptMessage]) -> Result<String> {
        tracing::warn!("ANTHROPIC_API_KEY not set; answering in demo mode");
        Ok(json!({
            "message": DEMO_MESSAGE,
            "collected_data": {},
            "lead_status": "gathering_info",
            "qualification_score": 10,
            "qualification_notes": "Demo mode",
            "suggested_quote_range": null,
            "ready_to_book": false,
            "preferred_times": null
        })
        .to_string())
    }
}
