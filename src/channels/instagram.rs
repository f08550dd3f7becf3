use serde::Deserialize;
use serde_json::json;

use super::{preview, GraphClient, Inbound};
use crate::error::Result;

pub const NON_TEXT_REPLY: &str =
    "Thanks for reaching out! Could you tell me a bit about what you're looking for? 😊";

#[derive(Debug, Default, Deserialize)]
struct Webhook {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize)]
struct Entry {
    #[serde(default)]
    messaging: Vec<MessagingEvent>,
}

#[derive(Debug, Default, Deserialize)]
struct MessagingEvent {
    #[serde(default)]
    sender: Participant,
    #[serde(default)]
    message: Option<DirectMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct Participant {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct DirectMessage {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    is_echo: bool,
}

/// Reduces a Messaging API delivery to its first event. Our own outgoing
/// messages come back as echoes and are skipped.
pub fn parse_webhook(payload: &serde_json::Value) -> Result<Inbound> {
    let webhook: Webhook = serde_json::from_value(payload.clone())?;
    let Some(event) = webhook
        .entry
        .into_iter()
        .next()
        .and_then(|entry| entry.messaging.into_iter().next())
    else {
        return Ok(Inbound::Nothing);
    };

    let message = event.message.unwrap_or_default();
    if message.is_echo {
        return Ok(Inbound::Echo);
    }
    match message.text.filter(|t| !t.is_empty()) {
        Some(body) => Ok(Inbound::Text {
            from: event.sender.id,
            body,
        }),
        None => Ok(Inbound::NonText {
            from: event.sender.id,
        }),
    }
}

/// Sends through `/me/messages`. Without a token the message is only logged.
#[derive(Clone)]
pub struct InstagramClient {
    graph: GraphClient,
    access_token: Option<String>,
}

impl InstagramClient {
    pub fn new(graph: GraphClient, access_token: Option<String>) -> Self {
        Self {
            graph,
            access_token,
        }
    }

    pub async fn send_text(&self, recipient_id: &str, text: &str) -> Result<()> {
        let Some(token) = self.access_token.as_deref() else {
            tracing::info!(recipient_id, "[instagram] Would send: {}...", preview(text));
            return Ok(());
        };
        let payload = json!({
            "recipient": {"id": recipient_id},
            "message": {"text": text}
        });
        self.graph.post_message(token, "me/messages", &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_direct_message() {
        let payload = json!({
            "object": "instagram",
            "entry": [{"id": "page", "messaging": [{
                "sender": {"id": "1789"},
                "recipient": {"id": "page"},
                "message": {"mid": "m1", "text": "Do you do corporate galas?"}
            }]}]
        });
        assert_eq!(
            parse_webhook(&payload).unwrap(),
            Inbound::Text {
                from: "1789".to_string(),
                body: "Do you do corporate galas?".to_string()
            }
        );
    }

    #[test]
    fn echoes_stickers_and_empty_deliveries() {
        let echo = json!({"entry": [{"messaging": [{
            "sender": {"id": "page"},
            "message": {"text": "hi", "is_echo": true}
        }]}]});
        assert_eq!(parse_webhook(&echo).unwrap(), Inbound::Echo);

        let sticker = json!({"entry": [{"messaging": [{
            "sender": {"id": "1789"},
            "message": {"attachments": [{"type": "image"}]}
        }]}]});
        assert_eq!(
            parse_webhook(&sticker).unwrap(),
            Inbound::NonText {
                from: "1789".to_string()
            }
        );

        assert_eq!(parse_webhook(&json!({"entry": []})).unwrap(), Inbound::Nothing);
    }
}
