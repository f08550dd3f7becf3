use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_TELEGRAM_BASE_URL: &str = "https://api.telegram.org";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.facebook.com/v21.0";
pub const DEFAULT_VERIFY_TOKEN: &str = "concierge-verify-token";
pub const DEFAULT_CHANNEL_AGENT: &str = "vamos-events";
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AnthropicConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl AnthropicConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotifyConfig {
    pub slack_webhook_url: Option<String>,
    #[serde(skip_serializing)]
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_base_url: Option<String>,
}

/// Outgoing mail for meeting confirmations. Delivery is enabled only when
/// both `user` and `pass` are set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub pass: Option<String>,
    pub from_name: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SMTP_HOST.to_string(),
            port: DEFAULT_SMTP_PORT,
            user: None,
            pass: None,
            from_name: None,
        }
    }
}

impl SmtpConfig {
    pub fn is_configured(&self) -> bool {
        self.user.is_some() && self.pass.is_some()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    #[serde(skip_serializing)]
    pub verify_token: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub agent_id: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            verify_token: DEFAULT_VERIFY_TOKEN.to_string(),
            access_token: None,
            phone_number_id: None,
            agent_id: DEFAULT_CHANNEL_AGENT.to_string(),
        }
    }
}

/// Process-wide settings, resolved once at startup from the environment
/// and overridden by CLI flags in `main`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub seed_dir: Option<PathBuf>,
    pub anthropic: AnthropicConfig,
    pub notify: NotifyConfig,
    pub whatsapp: ChannelConfig,
    pub instagram: ChannelConfig,
    pub graph_base_url: String,
    pub smtp: SmtpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            data_dir: PathBuf::from("./data"),
            seed_dir: None,
            anthropic: AnthropicConfig::default(),
            notify: NotifyConfig::default(),
            whatsapp: ChannelConfig::default(),
            instagram: ChannelConfig::default(),
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            smtp: SmtpConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let port_var = |key: &str, default: u16| match get(key) {
            Some(raw) => raw.parse::<u16>().unwrap_or_else(|_| {
                tracing::warn!("Ignoring invalid {key} value {:?}", raw);
                default
            }),
            None => default,
        };
        let port = port_var("PORT", defaults.port);

        Self {
            host: get("HOST").unwrap_or(defaults.host),
            port,
            data_dir: get("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            seed_dir: get("SEED_DIR").map(PathBuf::from),
            anthropic: AnthropicConfig {
                api_key: get("ANTHROPIC_API_KEY"),
                model: get("ANTHROPIC_MODEL"),
                base_url: get("ANTHROPIC_BASE_URL"),
            },
            notify: NotifyConfig {
                slack_webhook_url: get("SLACK_WEBHOOK_URL"),
                telegram_bot_token: get("TELEGRAM_BOT_TOKEN"),
                telegram_chat_id: get("TELEGRAM_CHAT_ID"),
                telegram_base_url: get("TELEGRAM_BASE_URL"),
            },
            whatsapp: ChannelConfig {
                verify_token: get("WHATSAPP_VERIFY_TOKEN")
                    .unwrap_or_else(|| DEFAULT_VERIFY_TOKEN.to_string()),
                access_token: get("WHATSAPP_ACCESS_TOKEN"),
                phone_number_id: get("WHATSAPP_PHONE_NUMBER_ID"),
                agent_id: get("WHATSAPP_AGENT_ID")
                    .unwrap_or_else(|| DEFAULT_CHANNEL_AGENT.to_string()),
            },
            instagram: ChannelConfig {
                verify_token: get("INSTAGRAM_VERIFY_TOKEN")
                    .unwrap_or_else(|| DEFAULT_VERIFY_TOKEN.to_string()),
                access_token: get("INSTAGRAM_ACCESS_TOKEN"),
                phone_number_id: None,
                agent_id: get("INSTAGRAM_AGENT_ID")
                    .unwrap_or_else(|| DEFAULT_CHANNEL_AGENT.to_string()),
            },
            graph_base_url: get("GRAPH_API_BASE_URL").unwrap_or(defaults.graph_base_url),
            smtp: SmtpConfig {
                host: get("SMTP_HOST").unwrap_or(defaults.smtp.host),
                port: port_var("SMTP_PORT", defaults.smtp.port),
                user: get("SMTP_USER"),
                pass: get("SMTP_PASS"),
                from_name: get("SMTP_FROM_NAME"),
            },
        }
    }

    pub fn api_configured(&self) -> bool {
        self.anthropic.is_configured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_environment() {
        let config = ServerConfig::from_lookup(|_| None);
        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert!(!config.api_configured());
        assert_eq!(config.whatsapp.verify_token, DEFAULT_VERIFY_TOKEN);
        assert_eq!(config.instagram.agent_id, DEFAULT_CHANNEL_AGENT);
    }

    #[test]
    fn reads_documented_variables() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("DATA_DIR", "/srv/concierge"),
            ("PORT", "9090"),
            ("SLACK_WEBHOOK_URL", "https://hooks.slack.test/abc"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-1001"),
        ]));
        assert!(config.api_configured());
        assert_eq!(config.data_dir, PathBuf::from("/srv/concierge"));
        assert_eq!(config.port, 9090);
        assert_eq!(
            config.notify.slack_webhook_url.as_deref(),
            Some("https://hooks.slack.test/abc")
        );
        assert_eq!(config.notify.telegram_bot_token.as_deref(), Some("123:abc"));
        assert_eq!(config.notify.telegram_chat_id.as_deref(), Some("-1001"));
    }

    #[test]
    fn smtp_needs_user_and_password() {
        let config = ServerConfig::from_lookup(|_| None);
        assert!(!config.smtp.is_configured());
        assert_eq!(config.smtp.host, DEFAULT_SMTP_HOST);
        assert_eq!(config.smtp.port, 587);

        let config = ServerConfig::from_lookup(lookup_from(&[
            ("SMTP_HOST", "mail.vamos.example"),
            ("SMTP_PORT", "2525"),
            ("SMTP_USER", "bookings@vamos.example"),
            ("SMTP_FROM_NAME", "Vamos Events"),
        ]));
        assert!(!config.smtp.is_configured());
        assert_eq!(config.smtp.host, "mail.vamos.example");
        assert_eq!(config.smtp.port, 2525);

        let config = ServerConfig::from_lookup(lookup_from(&[
            ("SMTP_USER", "bookings@vamos.example"),
            ("SMTP_PASS", "app-password"),
            ("SMTP_PORT", "nope"),
        ]));
        assert!(config.smtp.is_configured());
        assert_eq!(config.smtp.port, 587);
    }

    #[test]
    fn blank_values_count_as_missing() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("ANTHROPIC_API_KEY", "   "),
            ("PORT", "not-a-port"),
        ]));
        assert!(!config.api_configured());
        assert_eq!(config.port, 8000);
    }
}
