use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use minijinja::{context, Environment};

use crate::config::SmtpConfig;
use crate::domains::agent::AgentConfig;
use crate::domains::lead::{ConfirmationEmail, Lead};
use crate::error::{ConciergeError, Result};
use crate::prompt::format_amount;

const SMTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Slot shown by the dashboard preview for leads that were never confirmed.
pub const PREVIEW_CONFIRMED_TIME: &str = "Tuesday, March 4th at 2:00 PM ET";

const TEMPLATE_NAME: &str = "confirmation.html";

const CONFIRMATION_TEMPLATE: &str = r##"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><meta name="viewport" content="width=device-width, initial-scale=1.0"></head>
<body style="margin:0;padding:0;background:#0A0A0A;font-family:Arial,Helvetica,sans-serif;">
<table width="100%" cellpadding="0" cellspacing="0" style="background:#0A0A0A;padding:40px 20px;">
  <tr><td align="center">
    <table width="600" cellpadding="0" cellspacing="0" style="background:#141414;border-radius:16px;overflow:hidden;border:1px solid #2A2A2A;">
      <tr><td style="background:linear-gradient(135deg,{{ primary_color }},#A68B4B);padding:40px 40px 32px;text-align:center;">
        <h1 style="margin:0;font-size:28px;color:#0A0A0A;font-weight:700;letter-spacing:1px;">{{ business_name }}</h1>
        <p style="margin:8px 0 0;font-size:14px;color:rgba(10,10,10,0.7);">Consultation Confirmed</p>
      </td></tr>
      <tr><td style="padding:40px;">
        <p style="font-size:16px;color:#F5F0E8;line-height:1.7;margin:0 0 24px;">Hi {{ prospect_name }},</p>
        <p style="font-size:15px;color:#B0A898;line-height:1.7;margin:0 0 32px;">
          Great news! {{ owner_name }} has confirmed your consultation. We're looking forward to discussing {{ event_type }} with you and creating something truly unforgettable.
        </p>
        <table width="100%" cellpadding="0" cellspacing="0" style="background:#1E1E1E;border-radius:12px;border:1px solid #2A2A2A;margin:0 0 32px;">
          <tr><td style="padding:28px;">
            <p style="font-size:11px;font-weight:700;color:#706A60;text-transform:uppercase;letter-spacing:2px;margin:0 0 16px;">📅 Your Consultation</p>
            <p style="font-size:20px;font-weight:700;color:{{ primary_color }};margin:0 0 8px;">{{ confirmed_time }}</p>
            <p style="font-size:14px;color:#B0A898;margin:0 0 4px;">Type: Personal consultation for {{ event_type }}</p>
            <p style="font-size:14px;color:#B0A898;margin:0;">Duration: ~30 minutes</p>
            {%- if note %}
            <p style="font-size:14px;color:#B0A898;margin:8px 0 0;">Note: {{ note }}</p>
            {%- endif %}
          </td></tr>
        </table>
        {%- if quote_low %}
        <table width="100%" cellpadding="0" cellspacing="0" style="background:#1E1E1E;border-radius:12px;border:1px solid #2A2A2A;margin:0 0 32px;">
          <tr><td style="padding:28px;">
            <p style="font-size:11px;font-weight:700;color:#706A60;text-transform:uppercase;letter-spacing:2px;margin:0 0 16px;">💰 Estimated Range</p>
            <p style="font-size:20px;font-weight:700;color:{{ primary_color }};margin:0;">${{ quote_low }} – ${{ quote_high }} {{ currency }}</p>
            <p style="font-size:13px;color:#706A60;margin:8px 0 0;">Final pricing confirmed after consultation</p>
          </td></tr>
        </table>
        {%- endif %}
        <p style="font-size:15px;color:#B0A898;line-height:1.7;margin:0 0 32px;">
          If you need to reschedule, please don't hesitate to reach out. We're flexible and want to make this as easy as possible for you.
        </p>
        <table width="100%" cellpadding="0" cellspacing="0" style="border-top:1px solid #2A2A2A;padding-top:24px;">
          <tr><td style="padding-top:24px;">
            <p style="font-size:11px;font-weight:700;color:#706A60;text-transform:uppercase;letter-spacing:2px;margin:0 0 12px;">Get in Touch</p>
            {%- if business_email %}
            <p style="font-size:14px;color:#B0A898;margin:0 0 4px;">📧 {{ business_email }}</p>
            {%- endif %}
            {%- if business_phone %}
            <p style="font-size:14px;color:#B0A898;margin:0 0 4px;">📱 {{ business_phone }}</p>
            {%- endif %}
            {%- if business_website %}
            <p style="font-size:14px;color:#B0A898;margin:0;">🌐 {{ business_website }}</p>
            {%- endif %}
          </td></tr>
        </table>
      </td></tr>
      <tr><td style="background:#0A0A0A;padding:24px 40px;text-align:center;border-top:1px solid #2A2A2A;">
        <p style="font-size:12px;color:#706A60;margin:0;">© {{ year }} {{ business_name }} · Powered by AI Concierge</p>
      </td></tr>
    </table>
  </td></tr>
</table>
</body></html>
"##;

pub fn confirmation_subject(agent: &AgentConfig) -> String {
    format!("Your Consultation with {} is Confirmed! ✨", display_business(agent))
}

/// Renders the branded confirmation page. Values are HTML-escaped by the
/// template engine because the template name ends in `.html`.
pub fn render_confirmation(
    agent: &AgentConfig,
    lead: &Lead,
    confirmed_time: &str,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String> {
    let mut env = Environment::new();
    env.add_template(TEMPLATE_NAME, CONFIRMATION_TEMPLATE)
        .map_err(template_error)?;
    let template = env.get_template(TEMPLATE_NAME).map_err(template_error)?;

    let business = &agent.business;
    let quote = lead.suggested_quote_range;
    template
        .render(context! {
            business_name => display_business(agent),
            owner_name => agent.owner_name(),
            primary_color => agent.primary_color(),
            currency => agent.currency(),
            prospect_name => lead.contact_name().unwrap_or("there"),
            event_type => lead.event_type().unwrap_or("your event"),
            confirmed_time => confirmed_time,
            note => note.map(str::trim).filter(|n| !n.is_empty()),
            quote_low => quote.map(|q| format_amount(q.0)),
            quote_high => quote.map(|q| format_amount(q.1)),
            business_email => business.email.as_deref(),
            business_phone => business.phone.as_deref(),
            business_website => business.website.as_deref(),
            year => now.year(),
        })
        .map_err(template_error)
}

/// Plain-text alternative sent alongside the HTML body.
pub fn render_confirmation_text(
    agent: &AgentConfig,
    lead: &Lead,
    confirmed_time: &str,
    note: Option<&str>,
) -> String {
    let business = &agent.business;
    let event_type = lead.event_type().unwrap_or("your event");
    let mut lines = vec![
        format!("Hi {},", lead.contact_name().unwrap_or("there")),
        String::new(),
        format!(
            "Your consultation with {} has been confirmed!",
            display_business(agent)
        ),
        String::new(),
        format!("Date & Time: {confirmed_time}"),
        format!("Type: Personal consultation for {event_type}"),
        "Duration: ~30 minutes".to_string(),
    ];
    if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
        lines.push(format!("Note: {note}"));
    }
    if let Some(quote) = lead.suggested_quote_range {
        lines.push(format!(
            "Estimated range: ${} - ${} {}",
            format_amount(quote.0),
            format_amount(quote.1),
            agent.currency()
        ));
    }
    lines.push(String::new());
    lines.push("If you need to reschedule, please reach out:".to_string());
    if let Some(email) = non_blank(business.email.as_deref()) {
        lines.push(format!("Email: {email}"));
    }
    if let Some(phone) = non_blank(business.phone.as_deref()) {
        lines.push(format!("Phone: {phone}"));
    }
    lines.push(String::new());
    lines.push("Looking forward to creating something unforgettable!".to_string());
    lines.push(format!("- {}", agent.owner_name()));
    lines.join("\n")
}

/// A rendered message ready for a [`Mailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    /// Display name used when the transport has none configured.
    pub sender_name: String,
    pub reply_to: Option<String>,
    pub text: String,
    pub html: String,
}

/// Everything a confirmation produces: the record kept on the lead and the
/// message to deliver.
#[derive(Debug, Clone)]
pub struct PreparedConfirmation {
    pub record: ConfirmationEmail,
    pub message: OutgoingEmail,
}

/// Builds the confirmation for a lead. `None` when the prospect never
/// shared an email address. The record starts unsent.
pub fn build_confirmation(
    agent: &AgentConfig,
    lead: &Lead,
    confirmed_time: &str,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<PreparedConfirmation>> {
    let Some(to) = lead.email() else {
        tracing::info!(lead_id = %lead.id, "No prospect email found, skipping confirmation email");
        return Ok(None);
    };
    let html = render_confirmation(agent, lead, confirmed_time, note, now)?;
    let subject = confirmation_subject(agent);
    let message = OutgoingEmail {
        to: to.to_string(),
        subject: subject.clone(),
        sender_name: display_business(agent).to_string(),
        reply_to: non_blank(agent.business.email.as_deref()).map(str::to_string),
        text: render_confirmation_text(agent, lead, confirmed_time, note),
        html: html.clone(),
    };
    Ok(Some(PreparedConfirmation {
        record: ConfirmationEmail {
            to: to.to_string(),
            subject,
            confirmed_time: confirmed_time.to_string(),
            sent: false,
            html: Some(html),
        },
        message,
    }))
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

/// SMTP delivery with STARTTLS and login, as configured by `SMTP_*`.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    from_name: Option<String>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let (Some(user), Some(pass)) = (config.user.clone(), config.pass.clone()) else {
            return Err(ConciergeError::Config(
                "SMTP delivery requires SMTP_USER and SMTP_PASS".to_string(),
            ));
        };
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| ConciergeError::Config(format!("invalid SMTP host {}: {e}", config.host)))?
            .port(config.port)
            .credentials(Credentials::new(user.clone(), pass))
            .timeout(Some(SMTP_TIMEOUT))
            .build();
        Ok(Self {
            transport,
            from: user,
            from_name: config.from_name.clone(),
        })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message> {
        let name = self
            .from_name
            .clone()
            .unwrap_or_else(|| email.sender_name.clone());
        let from = Mailbox::new(Some(name), self.from.parse().map_err(address_error)?);
        let reply_to = email.reply_to.as_deref().unwrap_or(&self.from);

        Message::builder()
            .from(from)
            .reply_to(reply_to.parse().map_err(address_error)?)
            .to(email.to.parse().map_err(address_error)?)
            .subject(email.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| ConciergeError::Runtime(format!("failed to build email: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let message = self.build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| ConciergeError::Http(format!("SMTP delivery failed: {e}")))?;
        Ok(())
    }
}

fn address_error(err: lettre::address::AddressError) -> ConciergeError {
    ConciergeError::InvalidInput(format!("invalid email address: {err}"))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn display_business(agent: &AgentConfig) -> &str {
    agent
        .business
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("Our Team")
}

fn template_error(err: minijinja::Error) -> ConciergeError {
    ConciergeError::Runtime(format!("email template error: {err}"))
}
