use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domains::json_amount;
use crate::interfaces::providers::{PromptMessage, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    GatheringInfo,
    Qualified,
    Disqualified,
    MeetingRequested,
    PendingConfirmation,
    MeetingConfirmed,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::GatheringInfo => "gathering_info",
            Self::Qualified => "qualified",
            Self::Disqualified => "disqualified",
            Self::MeetingRequested => "meeting_requested",
            Self::PendingConfirmation => "pending_confirmation",
            Self::MeetingConfirmed => "meeting_confirmed",
        }
    }

    /// Lenient parse for model output; unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "new" => Some(Self::New),
            "gathering_info" => Some(Self::GatheringInfo),
            "qualified" => Some(Self::Qualified),
            "disqualified" => Some(Self::Disqualified),
            "meeting_requested" => Some(Self::MeetingRequested),
            "pending_confirmation" => Some(Self::PendingConfirmation),
            "meeting_confirmed" => Some(Self::MeetingConfirmed),
            _ => None,
        }
    }

    /// Human form used in notifications, e.g. "Meeting Requested".
    pub fn label(self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Self::GatheringInfo => "📝",
            Self::Qualified => "✅",
            Self::Disqualified => "❌",
            Self::MeetingRequested => "📅",
            Self::PendingConfirmation => "⏳",
            Self::MeetingConfirmed => "🎉",
            Self::New => "📋",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quoted price range, serialized as `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct QuoteRange(pub u64, pub u64);

impl QuoteRange {
    fn from_value(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        if items.len() != 2 {
            return None;
        }
        let (low, high) = (json_amount(&items[0])?, json_amount(&items[1])?);
        Some(Self(low.min(high), low.max(high)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LeadMessage {
    pub role: Role,
    pub content: String,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConfirmationEmail {
    pub to: String,
    pub subject: String,
    pub confirmed_time: String,
    pub sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Lead {
    pub id: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<LeadMessage>,
    #[serde(default)]
    pub collected_data: Map<String, Value>,
    #[serde(default)]
    pub lead_status: LeadStatus,
    #[serde(default)]
    pub qualification_score: u8,
    #[serde(default)]
    pub qualification_notes: String,
    #[serde(default)]
    pub suggested_quote_range: Option<QuoteRange>,
    #[serde(default)]
    pub ready_to_book: bool,
    #[serde(default)]
    pub preferred_times: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_email: Option<ConfirmationEmail>,
}

impl Lead {
    pub fn new(id: impl Into<String>, source: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            phone: None,
            instagram_id: None,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            collected_data: Map::new(),
            lead_status: LeadStatus::New,
            qualification_score: 0,
            qualification_notes: String::new(),
            suggested_quote_range: None,
            ready_to_book: false,
            preferred_times: None,
            confirmed_time: None,
            confirmation_note: None,
            confirmation_email: None,
        }
    }

    fn collected_str(&self, key: &str) -> Option<&str> {
        self.collected_data
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn contact_name(&self) -> Option<&str> {
        self.collected_str("contact_name")
            .or_else(|| self.collected_str("name"))
    }

    pub fn event_type(&self) -> Option<&str> {
        self.collected_str("event_type")
    }

    pub fn email(&self) -> Option<&str> {
        self.collected_str("email")
    }

    /// Conversation so far in the shape the provider expects.
    pub fn history(&self) -> Vec<PromptMessage> {
        self.messages
            .iter()
            .map(|msg| PromptMessage {
                role: msg.role,
                content: msg.content.clone(),
            })
            .collect()
    }

    /// Folds one conversation turn into the lead. Returns `true` when the
    /// lead status changed.
    pub fn apply_turn(&mut self, user_message: &str, reply: &AgentReply, now: DateTime<Utc>) -> bool {
        self.messages.push(LeadMessage {
            role: Role::User,
            content: user_message.to_string(),
            ts: now,
        });
        self.messages.push(LeadMessage {
            role: Role::Assistant,
            content: reply.message.clone(),
            ts: now,
        });

        for (key, value) in &reply.collected_data {
            self.collected_data.insert(key.clone(), value.clone());
        }

        let previous = self.lead_status;
        // Only the owner confirms a meeting; model output cannot undo it.
        if let Some(status) = reply.lead_status.filter(|_| previous != LeadStatus::MeetingConfirmed) {
            self.lead_status = status;
        }
        if let Some(score) = reply.qualification_score {
            self.qualification_score = score;
        }
        self.qualification_notes = reply.qualification_notes.clone();
        if let Some(range) = reply.suggested_quote_range {
            self.suggested_quote_range = Some(range);
        }
        self.ready_to_book = reply.ready_to_book;
        if let Some(times) = reply.preferred_times.as_ref().filter(|t| !t.is_empty()) {
            self.preferred_times = Some(times.clone());
        }
        self.updated_at = now;

        self.lead_status != previous
    }

    /// Dashboard listing form: everything except the transcript, plus its length.
    pub fn summary(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()));
        if let Some(map) = value.as_object_mut() {
            map.remove("messages");
            map.insert("message_count".to_string(), Value::from(self.messages.len()));
        }
        value
    }
}

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:[A-Za-z0-9_-]*[ \t]*\n)?(.*?)\s*(?:```)?\s*$").expect("valid fence regex")
});

fn strip_code_fence(raw: &str) -> &str {
    if !raw.starts_with("```") {
        return raw;
    }
    CODE_FENCE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(raw)
}

/// What the model said this turn, already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub message: String,
    pub collected_data: Map<String, Value>,
    pub lead_status: Option<LeadStatus>,
    pub qualification_score: Option<u8>,
    pub qualification_notes: String,
    pub suggested_quote_range: Option<QuoteRange>,
    pub ready_to_book: bool,
    pub preferred_times: Option<Vec<String>>,
}

pub const RETRY_MESSAGE: &str = "I appreciate your patience! Could you try that again?";
pub const DEMO_MESSAGE: &str =
    "Thanks for reaching out! I'd love to learn about your event. What are you planning?";

impl AgentReply {
    /// Never fails: text that is not the JSON contract becomes the message
    /// and the lead keeps its current standing.
    pub fn parse(raw: &str) -> Self {
        let cleaned = strip_code_fence(raw.trim());
        match serde_json::from_str::<Value>(cleaned) {
            Ok(Value::Object(map)) if map.get("message").is_some_and(Value::is_string) => {
                Self::from_object(map)
            }
            _ => Self::holding(cleaned.to_string(), "JSON parse failed".to_string()),
        }
    }

    pub fn provider_failure(error: &str) -> Self {
        Self::holding(RETRY_MESSAGE.to_string(), format!("Error: {error}"))
    }

    /// Status and score are left unset so the stored lead keeps its own.
    fn holding(message: String, notes: String) -> Self {
        Self {
            message,
            collected_data: Map::new(),
            lead_status: None,
            qualification_score: None,
            qualification_notes: notes,
            suggested_quote_range: None,
            ready_to_book: false,
            preferred_times: None,
        }
    }

    fn from_object(map: Map<String, Value>) -> Self {
        let score = map.get("qualification_score").and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        });
        let preferred_times = map
            .get("preferred_times")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|times| !times.is_empty());

        Self {
            message: map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            collected_data: map
                .get("collected_data")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            lead_status: map
                .get("lead_status")
                .and_then(Value::as_str)
                .and_then(LeadStatus::parse),
            qualification_score: score
                .filter(|s| s.is_finite())
                .map(|s| s.round().clamp(0.0, 100.0) as u8),
            qualification_notes: map
                .get("qualification_notes")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            suggested_quote_range: map
                .get("suggested_quote_range")
                .and_then(QuoteRange::from_value),
            ready_to_book: map
                .get("ready_to_book")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            preferred_times,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lead() -> Lead {
        Lead::new("session-1", "website", Utc::now())
    }

    #[test]
    fn parses_plain_json_reply() {
        let raw = json!({
            "message": "Congratulations! When is the wedding?",
            "collected_data": {"event_type": "wedding"},
            "lead_status": "gathering_info",
            "qualification_score": 35,
            "qualification_notes": "Wedding, date unknown",
            "suggested_quote_range": null,
            "ready_to_book": false,
            "preferred_times": null
        })
        .to_string();
        let reply = AgentReply::parse(&raw);
        assert_eq!(reply.message, "Congratulations! When is the wedding?");
        assert_eq!(reply.lead_status, Some(LeadStatus::GatheringInfo));
        assert_eq!(reply.qualification_score, Some(35));
        assert_eq!(reply.collected_data["event_type"], json!("wedding"));
        assert!(reply.suggested_quote_range.is_none());
    }

    #[test]
    fn strips_markdown_code_fences() {
        let raw = "```json\n{\"message\": \"Hi there\", \"lead_status\": \"qualified\", \"qualification_score\": 140, \"suggested_quote_range\": [9000, \"7,500\"]}\n```";
        let reply = AgentReply::parse(raw);
        assert_eq!(reply.message, "Hi there");
        assert_eq!(reply.lead_status, Some(LeadStatus::Qualified));
        assert_eq!(reply.qualification_score, Some(100));
        assert_eq!(reply.suggested_quote_range, Some(QuoteRange(7500, 9000)));

        let inline = "```{\"message\": \"inline\"}```";
        assert_eq!(AgentReply::parse(inline).message, "inline");

        let bare = "```\n{\"message\": \"untagged\"}\n```";
        assert_eq!(AgentReply::parse(bare).message, "untagged");
    }

    #[test]
    fn fenced_plain_text_keeps_its_first_word() {
        let reply = AgentReply::parse("```Hello there```");
        assert_eq!(reply.message, "Hello there");
        assert_eq!(reply.qualification_notes, "JSON parse failed");

        let multiline = AgentReply::parse("```text\nHello there\n```");
        assert_eq!(multiline.message, "Hello there");
    }

    #[test]
    fn non_json_reply_keeps_lead_standing() {
        let mut current = lead();
        current.lead_status = LeadStatus::Qualified;
        current.qualification_score = 70;
        let reply = AgentReply::parse("Sorry, what date did you have in mind?");
        assert_eq!(reply.message, "Sorry, what date did you have in mind?");
        assert_eq!(reply.qualification_notes, "JSON parse failed");

        let changed = current.apply_turn("hmm", &reply, Utc::now());
        assert!(!changed);
        assert_eq!(current.lead_status, LeadStatus::Qualified);
        assert_eq!(current.qualification_score, 70);
    }

    #[test]
    fn model_reply_cannot_undo_owner_confirmation() {
        let mut current = lead();
        current.lead_status = LeadStatus::MeetingConfirmed;
        let reply = AgentReply::parse(
            &json!({
                "message": "Which times work for you?",
                "lead_status": "meeting_requested",
                "qualification_score": 90
            })
            .to_string(),
        );
        let changed = current.apply_turn("Can we talk?", &reply, Utc::now());
        assert!(!changed);
        assert_eq!(current.lead_status, LeadStatus::MeetingConfirmed);
        assert_eq!(current.qualification_score, 90);
    }

    #[test]
    fn apply_turn_merges_and_reports_status_change() {
        let mut current = lead();
        current.suggested_quote_range = Some(QuoteRange(5000, 8000));
        let reply = AgentReply::parse(
            &json!({
                "message": "Lovely! How many guests?",
                "collected_data": {"contact_name": "Ana", "event_type": "wedding"},
                "lead_status": "gathering_info",
                "qualification_score": 20,
                "preferred_times": []
            })
            .to_string(),
        );
        let changed = current.apply_turn("We're planning a wedding", &reply, Utc::now());
        assert!(changed);
        assert_eq!(current.messages.len(), 2);
        assert_eq!(current.messages[0].role, Role::User);
        assert_eq!(current.messages[1].content, "Lovely! How many guests?");
        assert_eq!(current.contact_name(), Some("Ana"));
        assert_eq!(current.suggested_quote_range, Some(QuoteRange(5000, 8000)));
        assert!(current.preferred_times.is_none());

        let again = current.apply_turn("About 120", &reply, Utc::now());
        assert!(!again);
    }

    #[test]
    fn summary_omits_transcript() {
        let mut current = lead();
        let reply = AgentReply::parse("{\"message\": \"hello\"}");
        current.apply_turn("hi", &reply, Utc::now());
        let summary = current.summary();
        assert!(summary.get("messages").is_none());
        assert_eq!(summary["message_count"], json!(2));
        assert_eq!(summary["lead_status"], json!("new"));
    }

    #[test]
    fn status_labels_are_title_case() {
        assert_eq!(LeadStatus::MeetingRequested.label(), "Meeting Requested");
        assert_eq!(LeadStatus::parse("Pending Confirmation"), Some(LeadStatus::PendingConfirmation));
        assert_eq!(LeadStatus::parse("gathering_info|qualified"), None);
    }
}
