use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::instagram::{self, InstagramClient};
use crate::channels::whatsapp::{self, WhatsAppClient};
use crate::channels::{GraphClient, Inbound};
use crate::config::ServerConfig;
use crate::domains::agent::AgentConfig;
use crate::domains::lead::{AgentReply, ConfirmationEmail, Lead, LeadStatus, QuoteRange};
use crate::domains::training::{TrainingData, TrainingKind, TrainingRecord};
use crate::email::{self, Mailer, PreparedConfirmation, SmtpMailer, PREVIEW_CONFIRMED_TIME};
use crate::error::{ConciergeError, Result};
use crate::interfaces::providers::{LlmProvider, PromptMessage};
use crate::notify::{DeliveryReport, Notifier};
use crate::prompt::{build_system_prompt, PromptPreview};
use crate::providers::provider_from_config;
use crate::store::{agent_not_found, DataStore};

const DEFAULT_SOURCE: &str = "website";

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub agent_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub message: String,
    pub lead_status: LeadStatus,
    pub qualification_score: u8,
    pub suggested_quote_range: Option<QuoteRange>,
    pub ready_to_book: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddTrainingRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddTrainingResponse {
    pub status: &'static str,
    #[serde(rename = "type")]
    pub kind: String,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmRequest {
    pub confirmed_time: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmResponse {
    pub status: &'static str,
    pub confirmed_time: String,
    pub email_sent: bool,
}

/// Result of a confirmation. `delivery` is set when an email went out to
/// the mail transport and resolves to whether it was accepted.
pub struct ConfirmOutcome {
    pub response: ConfirmResponse,
    pub delivery: Option<JoinHandle<bool>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub alternative_times: Option<Vec<String>>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectResponse {
    pub status: &'static str,
    pub times: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadList {
    pub leads: Vec<Value>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub api_configured: bool,
    pub data_dir: String,
    pub agents: Vec<String>,
    pub version: &'static str,
}

/// Result of one conversation turn. `notification` is set when the lead
/// status changed and an owner alert was dispatched.
pub struct TurnOutcome {
    pub lead: Lead,
    pub reply: AgentReply,
    pub notification: Option<JoinHandle<DeliveryReport>>,
}

pub struct ConciergeService {
    store: Arc<DataStore>,
    provider: Arc<dyn LlmProvider>,
    notifier: Arc<Notifier>,
    mailer: Option<Arc<dyn Mailer>>,
    whatsapp: WhatsAppClient,
    instagram: InstagramClient,
    config: ServerConfig,
}

impl ConciergeService {
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        let provider = provider_from_config(&config.anthropic)?;
        Self::with_provider(config, provider)
    }

    pub fn with_provider(config: ServerConfig, provider: Arc<dyn LlmProvider>) -> Result<Self> {
        let store = Arc::new(DataStore::new(config.data_dir.clone())?);
        let notifier = Arc::new(Notifier::new(config.notify.clone())?);
        let graph = GraphClient::new(config.graph_base_url.clone())?;
        let whatsapp = WhatsAppClient::new(
            graph.clone(),
            config.whatsapp.access_token.clone(),
            config.whatsapp.phone_number_id.clone(),
        );
        let instagram = InstagramClient::new(graph, config.instagram.access_token.clone());
        let mailer: Option<Arc<dyn Mailer>> = if config.smtp.is_configured() {
            info!(host = %config.smtp.host, port = config.smtp.port, "SMTP delivery enabled");
            Some(Arc::new(SmtpMailer::new(&config.smtp)?))
        } else {
            None
        };
        Ok(Self {
            store,
            provider,
            notifier,
            mailer,
            whatsapp,
            instagram,
            config,
        })
    }

    /// Replaces the mail transport used for meeting confirmations.
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Copies seed agents into the data directory when a seed dir is set.
    pub async fn seed(&self) -> Result<Vec<String>> {
        let Some(seed_dir) = self.config.seed_dir.as_deref() else {
            return Ok(Vec::new());
        };
        let seeded = self.store.seed_from(seed_dir).await?;
        if !seeded.is_empty() {
            info!("Seeded {} agent(s): {:?}", seeded.len(), seeded);
        }
        Ok(seeded)
    }

    pub async fn health(&self) -> Result<HealthReport> {
        Ok(HealthReport {
            status: "ok",
            api_configured: self.config.api_configured(),
            data_dir: self.store.base_dir().display().to_string(),
            agents: self.store.list_agents().await?,
            version: env!("CONCIERGE_GIT_SHA"),
        })
    }

    // --- chat ---

    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        if request.message.trim().is_empty() {
            return Err(ConciergeError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }
        let agent = self.store.require_agent_config(&request.agent_id).await?;
        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let lead = match self.store.get_lead(&request.agent_id, &session_id).await? {
            Some(lead) => lead,
            None => Lead::new(session_id.clone(), request.source, Utc::now()),
        };

        let outcome = self
            .run_turn(&request.agent_id, &agent, lead, &request.message, "Lead")
            .await?;

        Ok(ChatResponse {
            session_id,
            message: outcome.reply.message,
            lead_status: outcome.lead.lead_status,
            qualification_score: outcome.lead.qualification_score,
            suggested_quote_range: outcome.lead.suggested_quote_range,
            ready_to_book: outcome.lead.ready_to_book,
        })
    }

    /// One conversation turn: build the prompt from current files, ask the
    /// provider, fold the reply into the lead, persist, and alert the owner
    /// on a status change.
    pub async fn run_turn(
        &self,
        agent_id: &str,
        agent: &AgentConfig,
        lead: Lead,
        user_message: &str,
        event_prefix: &str,
    ) -> Result<TurnOutcome> {
        let training = self.store.get_training(agent_id).await?;
        let system_prompt = build_system_prompt(agent, &training);
        let messages = turn_messages(&lead, user_message);

        let reply = match self.provider.complete(&system_prompt, &messages).await {
            Ok(raw) => AgentReply::parse(&raw),
            Err(err) => {
                error!(agent_id, session_id = %lead.id, "Model call failed: {err}");
                AgentReply::provider_failure(&err.to_string())
            }
        };

        // The model call can take a while; owner actions that landed in the
        // meantime live in the stored copy, so the turn is folded into that.
        let now = Utc::now();
        let (lead, status_changed) = self
            .store
            .upsert_lead_with(agent_id, lead, |stored| {
                stored.apply_turn(user_message, &reply, now)
            })
            .await?;
        debug!(
            agent_id,
            session_id = %lead.id,
            status = %lead.lead_status,
            score = lead.qualification_score,
            "Lead updated"
        );

        let notification = status_changed.then(|| {
            let event = format!(
                "{event_prefix} {}",
                lead.lead_status.as_str().replace('_', " ")
            );
            info!(agent_id, session_id = %lead.id, status = %lead.lead_status, "Lead status changed");
            self.dispatch_notification(agent.clone(), lead.clone(), event)
        });

        Ok(TurnOutcome {
            lead,
            reply,
            notification,
        })
    }

    fn dispatch_notification(
        &self,
        agent: AgentConfig,
        lead: Lead,
        event: String,
    ) -> JoinHandle<DeliveryReport> {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move { notifier.notify_lead(&agent, &lead, &event).await })
    }

    // --- prompt & training ---

    pub async fn prompt_preview(&self, agent_id: &str) -> Result<PromptPreview> {
        let agent = self.store.require_agent_config(agent_id).await?;
        let training = self.store.get_training(agent_id).await?;
        Ok(PromptPreview::new(build_system_prompt(&agent, &training)))
    }

    pub async fn training(&self, agent_id: &str) -> Result<TrainingData> {
        self.store.get_training(agent_id).await
    }

    pub async fn add_training(
        &self,
        agent_id: &str,
        request: AddTrainingRequest,
    ) -> Result<AddTrainingResponse> {
        let kind: TrainingKind = request.kind.parse()?;
        self.store.require_agent_config(agent_id).await?;
        let record = TrainingRecord::from_payload(kind, request.data, Utc::now())?;
        let total = self.store.add_training(agent_id, record).await?;
        info!(agent_id, kind = kind.as_str(), total, "Training record added");
        Ok(AddTrainingResponse {
            status: "added",
            kind: request.kind,
            total,
        })
    }

    pub async fn remove_training(&self, agent_id: &str, kind: &str, index: usize) -> Result<()> {
        let kind: TrainingKind = kind.parse()?;
        self.store.require_agent_config(agent_id).await?;
        self.store.remove_training(agent_id, kind, index).await?;
        info!(agent_id, kind = kind.as_str(), index, "Training record removed");
        Ok(())
    }

    // --- agent config ---

    pub async fn agent_config(&self, agent_id: &str) -> Result<Value> {
        self.store
            .get_config(agent_id)
            .await?
            .ok_or_else(|| agent_not_found(agent_id))
    }

    pub async fn create_agent(&self, agent_id: &str, config: Value) -> Result<()> {
        self.store.create_config(agent_id, config, Utc::now()).await
    }

    pub async fn update_agent(&self, agent_id: &str, patch: Value) -> Result<Value> {
        self.store.update_config(agent_id, patch, Utc::now()).await
    }

    // --- leads ---

    /// Lead summaries, most recently updated first.
    pub async fn list_leads(&self, agent_id: &str) -> Result<LeadList> {
        let mut leads = self.store.get_leads(agent_id).await?;
        leads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let leads: Vec<Value> = leads.iter().map(Lead::summary).collect();
        Ok(LeadList {
            total: leads.len(),
            leads,
        })
    }

    pub async fn lead(&self, agent_id: &str, lead_id: &str) -> Result<Lead> {
        self.store
            .get_lead(agent_id, lead_id)
            .await?
            .ok_or_else(lead_not_found)
    }

    pub async fn confirm_meeting(
        &self,
        agent_id: &str,
        lead_id: &str,
        request: ConfirmRequest,
    ) -> Result<ConfirmResponse> {
        Ok(self.confirm_lead(agent_id, lead_id, request).await?.response)
    }

    /// Marks the meeting confirmed, stores the confirmation email and, when
    /// a mail transport is configured, delivers it in the background.
    pub async fn confirm_lead(
        &self,
        agent_id: &str,
        lead_id: &str,
        request: ConfirmRequest,
    ) -> Result<ConfirmOutcome> {
        let now = Utc::now();
        let note = request
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let confirmed_time = request.confirmed_time.clone();
        let lead = self
            .store
            .update_lead(agent_id, lead_id, |lead| {
                lead.confirmed_time = Some(confirmed_time);
                lead.confirmation_note = note.clone();
                lead.lead_status = LeadStatus::MeetingConfirmed;
                lead.updated_at = now;
            })
            .await?;
        info!(agent_id, lead_id, confirmed_time = %request.confirmed_time, "Meeting confirmed");

        let prepared = match self.store.get_agent_config(agent_id).await? {
            Some(agent) => email::build_confirmation(
                &agent,
                &lead,
                &request.confirmed_time,
                note.as_deref(),
                now,
            )?,
            None => None,
        };
        let email_sent = prepared.is_some();
        let delivery = match prepared {
            Some(prepared) => {
                let record = prepared.record.clone();
                self.store
                    .update_lead(agent_id, lead_id, |lead| {
                        lead.confirmation_email = Some(record);
                    })
                    .await?;
                match self.mailer.as_ref() {
                    Some(mailer) => Some(self.dispatch_email(
                        Arc::clone(mailer),
                        agent_id.to_string(),
                        lead_id.to_string(),
                        prepared,
                    )),
                    None => {
                        info!(
                            agent_id,
                            lead_id,
                            to = %prepared.record.to,
                            "SMTP not configured, confirmation email stored unsent"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        Ok(ConfirmOutcome {
            response: ConfirmResponse {
                status: "confirmed",
                confirmed_time: request.confirmed_time,
                email_sent,
            },
            delivery,
        })
    }

    fn dispatch_email(
        &self,
        mailer: Arc<dyn Mailer>,
        agent_id: String,
        lead_id: String,
        prepared: PreparedConfirmation,
    ) -> JoinHandle<bool> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let PreparedConfirmation { record, message } = prepared;
            if let Err(err) = mailer.send(&message).await {
                warn!(agent_id = %agent_id, lead_id = %lead_id, "Confirmation email failed: {err}");
                return false;
            }
            info!(agent_id = %agent_id, lead_id = %lead_id, to = %record.to, "Confirmation email sent");
            let sent = ConfirmationEmail {
                sent: true,
                html: None,
                ..record
            };
            if let Err(err) = store
                .update_lead(&agent_id, &lead_id, |lead| {
                    lead.confirmation_email = Some(sent);
                })
                .await
            {
                warn!(agent_id = %agent_id, lead_id = %lead_id, "Could not mark confirmation email sent: {err}");
            }
            true
        })
    }

    pub async fn reject_meeting(
        &self,
        agent_id: &str,
        lead_id: &str,
        request: RejectRequest,
    ) -> Result<RejectResponse> {
        let now = Utc::now();
        self.store
            .update_lead(agent_id, lead_id, |lead| {
                lead.lead_status = LeadStatus::MeetingRequested;
                lead.updated_at = now;
            })
            .await?;
        info!(
            agent_id,
            lead_id,
            reason = request.reason.as_deref().unwrap_or(""),
            "Meeting rejected, alternatives offered"
        );
        Ok(RejectResponse {
            status: "alternatives_sent",
            times: request.alternative_times,
        })
    }

    pub async fn email_preview(&self, agent_id: &str, lead_id: &str) -> Result<String> {
        let lead = self.lead(agent_id, lead_id).await?;
        let agent = self.store.require_agent_config(agent_id).await?;
        let confirmed_time = lead
            .confirmed_time
            .as_deref()
            .unwrap_or(PREVIEW_CONFIRMED_TIME);
        email::render_confirmation(
            &agent,
            &lead,
            confirmed_time,
            lead.confirmation_note.as_deref(),
            Utc::now(),
        )
    }

    // --- messaging channels ---

    pub fn whatsapp_verify_token(&self) -> &str {
        &self.config.whatsapp.verify_token
    }

    pub fn instagram_verify_token(&self) -> &str {
        &self.config.instagram.verify_token
    }

    /// Handles one WhatsApp Cloud API delivery and returns the status
    /// reported back to Meta.
    pub async fn handle_whatsapp(&self, payload: &Value) -> Result<&'static str> {
        let (from, body) = match whatsapp::parse_webhook(payload)? {
            Inbound::Nothing | Inbound::Echo => return Ok("no_messages"),
            Inbound::NonText { from } => {
                self.whatsapp_reply(&from, whatsapp::NON_TEXT_REPLY).await;
                return Ok("non_text_skipped");
            }
            Inbound::Text { from, body } => (from, body),
        };

        let agent_id = self.config.whatsapp.agent_id.clone();
        let session_id = format!("wa-{from}");
        info!(agent_id = %agent_id, session_id = %session_id, "WhatsApp message received");
        let agent = self.store.require_agent_config(&agent_id).await?;

        let lead = match self.store.get_lead(&agent_id, &session_id).await? {
            Some(lead) => lead,
            None => {
                let mut lead = Lead::new(session_id, "whatsapp", Utc::now());
                lead.phone = Some(from.clone());
                lead.collected_data
                    .insert("phone".to_string(), Value::String(from.clone()));
                if let Some(video_url) = agent.business.video_url.as_deref().filter(|u| !u.is_empty()) {
                    let caption = whatsapp::welcome_caption(agent.business_name());
                    if let Err(err) = self.whatsapp.send_video(&from, video_url, &caption).await {
                        warn!("WhatsApp intro video failed: {err}");
                    }
                }
                lead
            }
        };

        let outcome = self
            .run_turn(&agent_id, &agent, lead, &body, "WhatsApp lead")
            .await?;
        self.whatsapp_reply(&from, &outcome.reply.message).await;
        Ok("replied")
    }

    /// Handles one Instagram Messaging delivery and returns the status
    /// reported back to Meta.
    pub async fn handle_instagram(&self, payload: &Value) -> Result<&'static str> {
        let (from, body) = match instagram::parse_webhook(payload)? {
            Inbound::Nothing => return Ok("no_messages"),
            Inbound::Echo => return Ok("echo_skipped"),
            Inbound::NonText { from } => {
                self.instagram_reply(&from, instagram::NON_TEXT_REPLY).await;
                return Ok("non_text_handled");
            }
            Inbound::Text { from, body } => (from, body),
        };

        let agent_id = self.config.instagram.agent_id.clone();
        let session_id = format!("ig-{from}");
        info!(agent_id = %agent_id, session_id = %session_id, "Instagram DM received");
        let agent = self.store.require_agent_config(&agent_id).await?;

        let lead = match self.store.get_lead(&agent_id, &session_id).await? {
            Some(lead) => lead,
            None => {
                let mut lead = Lead::new(session_id, "instagram", Utc::now());
                lead.instagram_id = Some(from.clone());
                lead
            }
        };

        let outcome = self
            .run_turn(&agent_id, &agent, lead, &body, "Instagram lead")
            .await?;
        self.instagram_reply(&from, &outcome.reply.message).await;
        Ok("replied")
    }

    async fn whatsapp_reply(&self, to: &str, text: &str) {
        if let Err(err) = self.whatsapp.send_text(to, text).await {
            warn!("WhatsApp send failed: {err}");
        }
    }

    async fn instagram_reply(&self, to: &str, text: &str) {
        if let Err(err) = self.instagram.send_text(to, text).await {
            warn!("Instagram send failed: {err}");
        }
    }
}

fn lead_not_found() -> ConciergeError {
    ConciergeError::NotFound("Lead not found".to_string())
}

/// Prior transcript plus the new user message. When data has already been
/// collected it is restated ahead of the message so the model does not ask
/// for it again.
fn turn_messages(lead: &Lead, user_message: &str) -> Vec<PromptMessage> {
    let mut messages = lead.history();
    let content = if lead.collected_data.is_empty() {
        user_message.to_string()
    } else {
        format!(
            "[SYSTEM: Data collected so far: {}]\n\n{user_message}",
            Value::Object(lead.collected_data.clone())
        )
    };
    messages.push(PromptMessage::user(content));
    messages
}
