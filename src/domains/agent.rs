use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConciergeError, Result};

pub const DEFAULT_PRIMARY_COLOR: &str = "#C8A96E";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tone {
    Luxury,
    #[default]
    Professional,
    Friendly,
    Casual,
    Warm,
    Bold,
}

impl Tone {
    /// Unknown tones fall back to `Professional`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "luxury" => Self::Luxury,
            "friendly" => Self::Friendly,
            "casual" => Self::Casual,
            "warm" => Self::Warm,
            "bold" => Self::Bold,
            _ => Self::Professional,
        }
    }

    pub fn instructions(self) -> &'static str {
        match self {
            Self::Luxury => "You are warm, polished, and refined, like a luxury hospitality concierge. Confident but never pushy. Premium but approachable.",
            Self::Professional => "You are professional, knowledgeable, and efficient. Friendly but business-focused. Clear and direct.",
            Self::Friendly => "You are upbeat, warm, and genuinely enthusiastic. Like a helpful friend who happens to be an expert.",
            Self::Casual => "You are relaxed, conversational, and approachable. Keep things light and easy. No corporate-speak.",
            Self::Warm => "You are caring, empathetic, and attentive. You listen deeply and respond thoughtfully. Personal and genuine.",
            Self::Bold => "You are confident, energetic, and memorable. You make a strong impression. Dynamic and direct.",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Business {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Service {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price_display: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Pricing {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub baseline_rates: Option<Value>,
    #[serde(default)]
    pub event_type_ranges: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Qualification {
    #[serde(default, deserialize_with = "lenient::amounts")]
    pub minimum_budgets: BTreeMap<String, u64>,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub minimum_budget: Option<u64>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub service_areas: Vec<String>,
    #[serde(default, deserialize_with = "lenient::days")]
    pub advance_booking_days: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AvailableHours {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Booking {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub available_days: Vec<String>,
    #[serde(default)]
    pub available_hours: AvailableHours,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl Booking {
    pub fn auto_book(&self) -> bool {
        self.mode.as_deref() == Some("auto_book")
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SlackIntegration {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TelegramIntegration {
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Telegram chat ids are integers; owners write them either way.
    #[serde(default, deserialize_with = "lenient::text")]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Integrations {
    #[serde(default)]
    pub slack: SlackIntegration,
    #[serde(default)]
    pub telegram: TelegramIntegration,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Appearance {
    #[serde(default)]
    pub primary_color: Option<String>,
}

/// Typed view over an agent's `config.json`. Keys this crate does not
/// interpret are kept in `extra` so a round-trip never drops owner data.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub business: Business,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub pricing: Pricing,
    #[serde(default)]
    pub qualification: Qualification,
    #[serde(default)]
    pub booking: Booking,
    #[serde(default)]
    pub integrations: Integrations,
    #[serde(default)]
    pub appearance: Appearance,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentConfig {
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| ConciergeError::Config(format!("invalid agent config: {e}")))
    }

    pub fn business_name(&self) -> &str {
        non_empty(self.business.name.as_deref()).unwrap_or("this business")
    }

    /// Who the prospect will hear back from: owner, else business, else "our team".
    pub fn owner_name(&self) -> &str {
        non_empty(self.business.owner_name.as_deref())
            .or_else(|| non_empty(self.business.name.as_deref()))
            .unwrap_or("our team")
    }

    pub fn tone(&self) -> Tone {
        self.business
            .tone
            .as_deref()
            .map(Tone::parse)
            .unwrap_or_default()
    }

    pub fn currency(&self) -> &str {
        non_empty(self.pricing.currency.as_deref()).unwrap_or("CAD")
    }

    pub fn primary_color(&self) -> &str {
        non_empty(self.appearance.primary_color.as_deref()).unwrap_or(DEFAULT_PRIMARY_COLOR)
    }
}

/// Owner-edited `config.json` is loose about numbers and lists. These
/// readers accept the common spellings instead of rejecting the whole file.
mod lenient {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use crate::domains::json_amount;

    pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn amount<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Value>::deserialize(deserializer)?
            .as_ref()
            .and_then(json_amount))
    }

    pub fn days<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(amount(deserializer)?.and_then(|days| u32::try_from(days).ok()))
    }

    /// Entries whose value is not an amount are dropped.
    pub fn amounts<'de, D>(deserializer: D) -> Result<BTreeMap<String, u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(Value::Object(map)) = Option::<Value>::deserialize(deserializer)? else {
            return Ok(BTreeMap::new());
        };
        Ok(map
            .into_iter()
            .filter_map(|(key, value)| json_amount(&value).map(|amount| (key, amount)))
            .collect())
    }

    /// A single string counts as a one-item list.
    pub fn list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::String(s)) => vec![s],
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Recursively merges `patch` into `base`. Objects merge key by key; any
/// other value in `patch` replaces what `base` held.
pub fn merge_config(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                let nested = value.is_object() && base_map.get(&key).is_some_and(Value::is_object);
                if nested {
                    if let Some(existing) = base_map.get_mut(&key) {
                        merge_config(existing, value);
                    }
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base, patch) => *base = patch,
    }
}
