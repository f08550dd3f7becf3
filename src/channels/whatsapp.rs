use serde::Deserialize;
use serde_json::json;

use super::{preview, GraphClient, Inbound};
use crate::error::Result;

pub const NON_TEXT_REPLY: &str =
    "Thanks for reaching out! I work best with text messages. Could you type out what you're looking for? 😊";

#[derive(Debug, Default, Deserialize)]
struct Webhook {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Default, Deserialize)]
struct Change {
    #[serde(default)]
    value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Default, Deserialize)]
struct Message {
    #[serde(default)]
    from: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<TextBody>,
}

#[derive(Debug, Default, Deserialize)]
struct TextBody {
    #[serde(default)]
    body: String,
}

/// Reduces a Cloud API webhook delivery to its first message. Status
/// callbacks and other deliveries without messages yield `Nothing`.
pub fn parse_webhook(payload: &serde_json::Value) -> Result<Inbound> {
    let webhook: Webhook = serde_json::from_value(payload.clone())?;
    let Some(message) = webhook
        .entry
        .into_iter()
        .next()
        .and_then(|entry| entry.changes.into_iter().next())
        .and_then(|change| change.value.messages.into_iter().next())
    else {
        return Ok(Inbound::Nothing);
    };

    if message.kind != "text" {
        return Ok(Inbound::NonText { from: message.from });
    }
    let body = message.text.map(|t| t.body).unwrap_or_default();
    Ok(Inbound::Text {
        from: message.from,
        body,
    })
}

/// Sends through `/{phone_number_id}/messages`. Without credentials the
/// message is only logged.
#[derive(Clone)]
pub struct WhatsAppClient {
    graph: GraphClient,
    access_token: Option<String>,
    phone_number_id: Option<String>,
}

impl WhatsAppClient {
    pub fn new(graph: GraphClient, access_token: Option<String>, phone_number_id: Option<String>) -> Self {
        Self {
            graph,
            access_token,
            phone_number_id,
        }
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.access_token.as_deref()?, self.phone_number_id.as_deref()?))
    }

    pub async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        let Some((token, phone_id)) = self.credentials() else {
            tracing::info!(to, "[whatsapp] Would send: {}...", preview(text));
            return Ok(());
        };
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": {"body": text}
        });
        self.graph
            .post_message(token, &format!("{phone_id}/messages"), &payload)
            .await
    }

    pub async fn send_video(&self, to: &str, video_url: &str, caption: &str) -> Result<()> {
        let Some((token, phone_id)) = self.credentials() else {
            tracing::info!(to, "[whatsapp] Would send video: {video_url}");
            return Ok(());
        };
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "video",
            "video": {"link": video_url, "caption": caption}
        });
        self.graph
            .post_message(token, &format!("{phone_id}/messages"), &payload)
            .await
    }
}

pub fn welcome_caption(business_name: &str) -> String {
    format!("👋 Welcome to {business_name}! Watch this quick personal intro from our team.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(message: serde_json::Value) -> serde_json::Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{"id": "1", "changes": [{"field": "messages", "value": {
                "messaging_product": "whatsapp",
                "messages": [message]
            }}]}]
        })
    }

    #[test]
    fn parses_text_message() {
        let payload = delivery(json!({
            "from": "14165551234",
            "id": "wamid.1",
            "type": "text",
            "text": {"body": "Planning a wedding"}
        }));
        assert_eq!(
            parse_webhook(&payload).unwrap(),
            Inbound::Text {
                from: "14165551234".to_string(),
                body: "Planning a wedding".to_string()
            }
        );
    }

    #[test]
    fn non_text_and_status_callbacks() {
        let image = delivery(json!({"from": "1416", "type": "image", "image": {"id": "x"}}));
        assert_eq!(
            parse_webhook(&image).unwrap(),
            Inbound::NonText {
                from: "1416".to_string()
            }
        );

        let statuses = json!({"entry": [{"changes": [{"value": {"statuses": [{"id": "x"}]}}]}]});
        assert_eq!(parse_webhook(&statuses).unwrap(), Inbound::Nothing);
        assert_eq!(parse_webhook(&json!({})).unwrap(), Inbound::Nothing);
    }
}
