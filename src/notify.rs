use std::time::Duration;

use serde_json::json;

use crate::config::{NotifyConfig, DEFAULT_TELEGRAM_BASE_URL};
use crate::domains::agent::AgentConfig;
use crate::domains::lead::Lead;
use crate::error::{ConciergeError, Result};
use crate::prompt::format_amount;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a given agent's lead alerts go once per-agent integrations have
/// been layered over the process defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyTargets {
    pub slack_webhook_url: Option<String>,
    pub telegram: Option<TelegramTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramTarget {
    pub bot_token: String,
    pub chat_id: String,
}

impl NotifyTargets {
    pub fn is_empty(&self) -> bool {
        self.slack_webhook_url.is_none() && self.telegram.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<&'static str>,
    pub failed: Vec<(&'static str, String)>,
}

#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    defaults: NotifyConfig,
    telegram_base_url: String,
}

impl Notifier {
    pub fn new(defaults: NotifyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .map_err(|e| ConciergeError::Http(e.to_string()))?;
        let telegram_base_url = defaults
            .telegram_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_TELEGRAM_BASE_URL.to_string());
        Ok(Self {
            client,
            defaults,
            telegram_base_url,
        })
    }

    pub fn targets_for(&self, agent: &AgentConfig) -> NotifyTargets {
        let integrations = &agent.integrations;
        let slack_webhook_url = non_blank(integrations.slack.webhook_url.as_deref())
            .or_else(|| non_blank(self.defaults.slack_webhook_url.as_deref()))
            .map(str::to_string);

        let bot_token = non_blank(integrations.telegram.bot_token.as_deref())
            .or_else(|| non_blank(self.defaults.telegram_bot_token.as_deref()));
        let chat_id = non_blank(integrations.telegram.chat_id.as_deref())
            .or_else(|| non_blank(self.defaults.telegram_chat_id.as_deref()));
        let telegram = match (bot_token, chat_id) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramTarget {
                bot_token: bot_token.to_string(),
                chat_id: chat_id.to_string(),
            }),
            _ => None,
        };

        NotifyTargets {
            slack_webhook_url,
            telegram,
        }
    }

    /// Sends the lead summary to every configured channel. Failures are
    /// logged and reported, never returned.
    pub async fn notify_lead(&self, agent: &AgentConfig, lead: &Lead, event: &str) -> DeliveryReport {
        let targets = self.targets_for(agent);
        let mut report = DeliveryReport::default();
        if targets.is_empty() {
            tracing::debug!(lead_id = %lead.id, "No notification targets configured");
            return report;
        }

        let text = format_lead_message(agent.business_name(), lead, event);

        if let Some(url) = targets.slack_webhook_url.as_deref() {
            match self.post_slack(url, &text).await {
                Ok(()) => report.delivered.push("slack"),
                Err(err) => {
                    tracing::warn!(lead_id = %lead.id, "Slack notification failed: {err}");
                    report.failed.push(("slack", err.to_string()));
                }
            }
        }

        if let Some(target) = targets.telegram.as_ref() {
            match self.post_telegram(target, &text).await {
                Ok(()) => report.delivered.push("telegram"),
                Err(err) => {
                    tracing::warn!(lead_id = %lead.id, "Telegram notification failed: {err}");
                    report.failed.push(("telegram", err.to_string()));
                }
            }
        }

        report
    }

    async fn post_slack(&self, webhook_url: &str, text: &str) -> Result<()> {
        let resp = self
            .client
            .post(webhook_url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| ConciergeError::Http(format!("Slack request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(ConciergeError::Http(format!(
                "Slack webhook returned {status}: {body}"
            )))
        }
    }

    async fn post_telegram(&self, target: &TelegramTarget, text: &str) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.telegram_base_url.trim_end_matches('/'),
            target.bot_token
        );
        let resp = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": target.chat_id,
                "text": text,
                "parse_mode": "Markdown",
            }))
            .send()
            .await
            .map_err(|e| ConciergeError::Http(format!("Telegram request failed: {e}")))?;

        let body: serde_json::Value = resp.json().await.map_err(|e| {
            ConciergeError::Serialization(format!("Failed to parse Telegram response: {e}"))
        })?;

        if body.get("ok").and_then(|v| v.as_bool()) == Some(true) {
            Ok(())
        } else {
            let desc = body
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            Err(ConciergeError::Http(format!("Telegram API error: {desc}")))
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Markdown summary shared by the Slack and Telegram posts.
pub fn format_lead_message(business_name: &str, lead: &Lead, event: &str) -> String {
    let status = lead.lead_status;
    let mut lines = vec![
        format!("{} *{} — {}*", status.emoji(), business_name, event),
        format!("Name: {}", lead.contact_name().unwrap_or("Unknown")),
        format!("Event: {}", lead.event_type().unwrap_or("N/A")),
        format!(
            "Score: {}/100 | Status: {}",
            lead.qualification_score,
            status.label()
        ),
    ];
    if let Some(range) = lead.suggested_quote_range {
        lines.push(format!(
            "Quote: ${}–${}",
            format_amount(range.0),
            format_amount(range.1)
        ));
    }
    if let Some(times) = lead.preferred_times.as_ref().filter(|t| !t.is_empty()) {
        lines.push(format!("Preferred: {}", times.join(", ")));
    }
    lines.join("\n")
}
