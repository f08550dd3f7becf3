//! System prompt assembly.
//!
//! The prompt is rebuilt from the agent's current `config.json` and
//! `training.json` on every request. Owner training is appended after the
//! business configuration in a fixed order (rules, FAQ, examples,
//! corrections) so that later, more specific guidance sits closest to the
//! response contract; corrections close the owner section.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use crate::domains::agent::AgentConfig;
use crate::domains::training::TrainingData;

pub const MAX_PROMPT_EXAMPLES: usize = 5;
pub const MAX_PROMPT_CORRECTIONS: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct PromptPreview {
    pub prompt: String,
    pub token_estimate: f64,
}

impl PromptPreview {
    pub fn new(prompt: String) -> Self {
        let token_estimate = token_estimate(&prompt);
        Self {
            prompt,
            token_estimate,
        }
    }
}

/// Rough token count: whitespace-separated words times 1.3.
pub fn token_estimate(prompt: &str) -> f64 {
    prompt.split_whitespace().count() as f64 * 1.3
}

pub fn build_system_prompt(config: &AgentConfig, training: &TrainingData) -> String {
    let sections = [
        identity_section(config),
        services_section(config),
        pricing_section(config),
        qualification_section(config),
        DISQUALIFICATION.to_string(),
        booking_section(config),
        rules_section(training),
        faq_section(training),
        examples_section(training),
        corrections_section(training),
        RESPONSE_FORMAT.to_string(),
    ];

    let mut prompt = sections
        .iter()
        .map(|section| section.trim_end())
        .filter(|section| !section.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    prompt.push('\n');
    prompt
}

fn identity_section(config: &AgentConfig) -> String {
    let owner = config.owner_name();
    let about = config.business.about.as_deref().unwrap_or("").trim();
    let mut out = format!("You are the AI concierge for {}.", config.business_name());
    if !about.is_empty() {
        out.push(' ');
        out.push_str(about);
    }
    let _ = write!(
        out,
        "\n\n## YOUR PERSONALITY\n{}\n\
         Keep messages concise: 2-4 sentences per response unless explaining services in detail.\n\
         Ask ONE question at a time. Build naturally on the prospect's responses.\n\n\
         ## CONVERSATION FLOW\n\
         The prospect has just watched a personal video introduction from {owner}.\n\
         Your first message should warmly reference the video and transition into discovery.\n\n\
         Flow:\n\
         1. Warm handoff from video: reference {owner} and what they said\n\
         2. Ask what kind of event/project they're planning\n\
         3. Date and location\n\
         4. Guest count / scope\n\
         5. Which services interest them\n\
         6. Budget range (frame naturally)\n\
         7. If qualified: quote range + offer consultation\n\
         8. Collect contact info + preferred times\n\
         9. If not qualified: graceful redirect\n",
        config.tone().instructions(),
    );
    out
}

fn services_section(config: &AgentConfig) -> String {
    if config.services.is_empty() {
        return String::new();
    }
    let mut out = String::from("## SERVICES OFFERED\n");
    for service in &config.services {
        let _ = write!(out, "- **{}**", service.name);
        if let Some(desc) = service.description.as_deref().filter(|d| !d.trim().is_empty()) {
            let _ = write!(out, ": {desc}");
        }
        if let Some(price) = service.price_display.as_deref().filter(|p| !p.trim().is_empty()) {
            let _ = write!(out, " (approximately {price})");
        }
        out.push('\n');
    }
    out
}

fn pricing_section(config: &AgentConfig) -> String {
    let mut out = format!("## PRICING\nCurrency: {}\n", config.currency());
    for table in [
        &config.pricing.baseline_rates,
        &config.pricing.event_type_ranges,
    ] {
        if let Some(value) = table.as_ref().filter(|v| !is_empty_json(v)) {
            if let Ok(pretty) = serde_json::to_string_pretty(value) {
                out.push_str(&pretty);
                out.push('\n');
            }
        }
    }
    out.push_str("\nAlways quote RANGES. Always say approximate. Final pricing after consultation.\n");
    out
}

fn is_empty_json(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn qualification_section(config: &AgentConfig) -> String {
    let qual = &config.qualification;
    let mut out = String::from("## QUALIFICATION CRITERIA\n");
    if !qual.minimum_budgets.is_empty() {
        out.push_str("Minimum budgets by event type:\n");
        for (event_type, amount) in &qual.minimum_budgets {
            let _ = writeln!(out, "- {}: ${}", title_case(event_type), format_amount(*amount));
        }
    } else if let Some(amount) = qual.minimum_budget.filter(|a| *a > 0) {
        let _ = writeln!(out, "Minimum budget: ${}", format_amount(amount));
    }
    if !qual.service_areas.is_empty() {
        let _ = writeln!(out, "Service areas: {}", qual.service_areas.join(", "));
    }
    if let Some(days) = qual.advance_booking_days.filter(|d| *d > 0) {
        let _ = writeln!(out, "Minimum advance booking: {days} days");
    }
    out
}

const DISQUALIFICATION: &str = "## HANDLING DISQUALIFICATION\n\
Never dismissive. Always:\n\
1. Thank them genuinely\n\
2. Acknowledge their event sounds wonderful\n\
3. Be honest that premium services may not fit their current budget\n\
4. Frame as wanting to deliver the full experience\n\
5. Wish them well\n";

fn booking_section(config: &AgentConfig) -> String {
    let booking = &config.booking;
    let mut out = String::from("## BOOKING FLOW\n");
    if booking.auto_book() {
        out.push_str(
            "When a lead is qualified and interested, check calendar availability and book directly.\n",
        );
        return out;
    }

    let days = if booking.available_days.is_empty() {
        "weekdays".to_string()
    } else {
        booking.available_days.join(", ")
    };
    let start = booking.available_hours.start.as_deref().unwrap_or("10:00");
    let end = booking.available_hours.end.as_deref().unwrap_or("18:00");
    let timezone = booking.timezone.as_deref().unwrap_or("ET");
    let _ = write!(
        out,
        "When a lead is qualified and interested:\n\
         1. Express genuine excitement about working together\n\
         2. Collect name, email, and optionally phone if not already provided\n\
         3. Ask for 2-3 preferred consultation time slots\n\
         4. Available: {days} {start}-{end} {timezone}\n\
         5. Explain that {} will personally confirm within 24 hours\n\
         6. Do NOT confirm a specific time yourself\n",
        config.owner_name(),
    );
    out
}

fn rules_section(training: &TrainingData) -> String {
    if training.rules.is_empty() {
        return String::new();
    }
    let mut out = String::from(
        "## CUSTOM BUSINESS RULES\nThe business owner has specified these rules. Follow them precisely:\n",
    );
    for rule in &training.rules {
        let _ = writeln!(out, "- {}", rule.rule);
    }
    out
}

fn faq_section(training: &TrainingData) -> String {
    if training.faq.is_empty() {
        return String::new();
    }
    let mut out = String::from(
        "## FREQUENTLY ASKED QUESTIONS\nWhen prospects ask these questions, use these owner-approved answers:\n\n",
    );
    for item in &training.faq {
        let _ = write!(out, "Q: {}\nA: {}\n\n", item.question, item.answer);
    }
    out
}

fn examples_section(training: &TrainingData) -> String {
    if training.examples.is_empty() {
        return String::new();
    }
    let mut out = String::from("## EXAMPLE INTERACTIONS (follow these patterns)\n");
    for example in training.examples.iter().take(MAX_PROMPT_EXAMPLES) {
        let _ = writeln!(out, "Scenario: {}", example.scenario);
        let _ = writeln!(out, "Good response: {}", example.good_response);
        if let Some(bad) = example.bad_response.as_deref() {
            let _ = writeln!(out, "Avoid: {bad}");
        }
        out.push('\n');
    }
    out
}

fn corrections_section(training: &TrainingData) -> String {
    if training.corrections.is_empty() {
        return String::new();
    }
    let skip = training
        .corrections
        .len()
        .saturating_sub(MAX_PROMPT_CORRECTIONS);
    let mut out = String::from(
        "## CORRECTIONS FROM OWNER\n\
         The business owner has corrected these specific behaviors. \
         These corrections override any rule, FAQ answer, or example above. Adjust accordingly:\n",
    );
    for correction in training.corrections.iter().skip(skip) {
        let _ = writeln!(out, "- When: {}", correction.situation);
        let _ = writeln!(
            out,
            "  Instead of: {}",
            correction.wrong.as_deref().unwrap_or("N/A")
        );
        let _ = write!(out, "  Do this: {}\n\n", correction.correction);
    }
    out
}

const RESPONSE_FORMAT: &str = r#"## RESPONSE FORMAT
Respond with a JSON object:
{
  "message": "Your response to the prospect",
  "collected_data": {"field": "value collected this turn"},
  "lead_status": "gathering_info|qualified|disqualified|meeting_requested|pending_confirmation",
  "qualification_score": 0-100,
  "qualification_notes": "Internal note",
  "suggested_quote_range": null or [min, max],
  "ready_to_book": false,
  "preferred_times": null or ["slot1", "slot2"]
}
"#;

fn title_case(raw: &str) -> String {
    raw.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `1234567` -> `1,234,567`.
pub fn format_amount(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
