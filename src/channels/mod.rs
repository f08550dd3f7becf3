pub mod instagram;
pub mod whatsapp;

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ConciergeError, Result};

const GRAPH_TIMEOUT: Duration = Duration::from_secs(10);

/// Query string Meta sends when subscribing a webhook.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

impl VerifyQuery {
    /// The challenge to echo back, or `None` when the subscription must be
    /// refused.
    pub fn verify(&self, expected_token: &str) -> Option<i64> {
        if self.mode.as_deref() != Some("subscribe") {
            return None;
        }
        if self.verify_token.as_deref() != Some(expected_token) {
            return None;
        }
        self.challenge.as_deref()?.trim().parse::<i64>().ok()
    }
}

/// What a webhook delivery asked of us, reduced to the cases we act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Nothing,
    Echo,
    NonText { from: String },
    Text { from: String, body: String },
}

/// Thin client for the Meta Graph send APIs shared by both channels.
#[derive(Clone)]
pub struct GraphClient {
    client: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(GRAPH_TIMEOUT)
            .build()
            .map_err(|e| ConciergeError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn post_message(&self, access_token: &str, path: &str, payload: &Value) -> Result<()> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| ConciergeError::Http(format!("Graph API request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ConciergeError::Http(format!(
            "Graph API returned {status}: {body}"
        )))
    }
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}
