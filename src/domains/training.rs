use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConciergeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrainingKind {
    Rule,
    Faq,
    Example,
    Correction,
}

impl TrainingKind {
    pub const ALL: [TrainingKind; 4] = [Self::Rule, Self::Faq, Self::Example, Self::Correction];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Faq => "faq",
            Self::Example => "example",
            Self::Correction => "correction",
        }
    }
}

impl fmt::Display for TrainingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrainingKind {
    type Err = ConciergeError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rule" | "rules" => Ok(Self::Rule),
            "faq" | "faqs" => Ok(Self::Faq),
            "example" | "examples" => Ok(Self::Example),
            "correction" | "corrections" => Ok(Self::Correction),
            other => Err(ConciergeError::InvalidInput(format!(
                "Unknown training type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Rule {
    pub rule: String,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Example {
    pub scenario: String,
    pub good_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bad_response: Option<String>,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Correction {
    pub situation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrong: Option<String>,
    pub correction: String,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingRecord {
    Rule(Rule),
    Faq(FaqEntry),
    Example(Example),
    Correction(Correction),
}

impl TrainingRecord {
    /// Builds a record from the admin console's `{type, data}` payload,
    /// stamping `added_at` with `now`.
    pub fn from_payload(kind: TrainingKind, data: Value, now: DateTime<Utc>) -> Result<Self> {
        let record = match kind {
            TrainingKind::Rule => {
                let mut rule: Rule = decode(kind, data)?;
                require(kind, "rule", &rule.rule)?;
                rule.added_at = Some(now);
                Self::Rule(rule)
            }
            TrainingKind::Faq => {
                let mut faq: FaqEntry = decode(kind, data)?;
                require(kind, "question", &faq.question)?;
                require(kind, "answer", &faq.answer)?;
                faq.added_at = Some(now);
                Self::Faq(faq)
            }
            TrainingKind::Example => {
                let mut example: Example = decode(kind, data)?;
                require(kind, "scenario", &example.scenario)?;
                require(kind, "good_response", &example.good_response)?;
                example.bad_response = example.bad_response.filter(|v| !v.trim().is_empty());
                example.added_at = Some(now);
                Self::Example(example)
            }
            TrainingKind::Correction => {
                let mut correction: Correction = decode(kind, data)?;
                require(kind, "situation", &correction.situation)?;
                require(kind, "correction", &correction.correction)?;
                correction.wrong = correction.wrong.filter(|v| !v.trim().is_empty());
                correction.added_at = Some(now);
                Self::Correction(correction)
            }
        };
        Ok(record)
    }

    pub fn kind(&self) -> TrainingKind {
        match self {
            Self::Rule(_) => TrainingKind::Rule,
            Self::Faq(_) => TrainingKind::Faq,
            Self::Example(_) => TrainingKind::Example,
            Self::Correction(_) => TrainingKind::Correction,
        }
    }
}

fn decode<T: DeserializeOwned>(kind: TrainingKind, data: Value) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|e| ConciergeError::InvalidInput(format!("invalid {kind} data: {e}")))
}

fn require(kind: TrainingKind, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConciergeError::InvalidInput(format!(
            "{kind} requires a non-empty `{field}`"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TrainingData {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub faq: Vec<FaqEntry>,
    #[serde(default)]
    pub examples: Vec<Example>,
    #[serde(default)]
    pub corrections: Vec<Correction>,
}

impl TrainingData {
    /// Appends the record and returns the new length of its list.
    pub fn push(&mut self, record: TrainingRecord) -> usize {
        match record {
            TrainingRecord::Rule(rule) => {
                self.rules.push(rule);
                self.rules.len()
            }
            TrainingRecord::Faq(faq) => {
                self.faq.push(faq);
                self.faq.len()
            }
            TrainingRecord::Example(example) => {
                self.examples.push(example);
                self.examples.len()
            }
            TrainingRecord::Correction(correction) => {
                self.corrections.push(correction);
                self.corrections.len()
            }
        }
    }

    pub fn remove(&mut self, kind: TrainingKind, index: usize) -> Result<()> {
        let len = self.len(kind);
        if index >= len {
            return Err(ConciergeError::NotFound(format!(
                "Training item not found: {kind} #{index}"
            )));
        }
        match kind {
            TrainingKind::Rule => {
                self.rules.remove(index);
            }
            TrainingKind::Faq => {
                self.faq.remove(index);
            }
            TrainingKind::Example => {
                self.examples.remove(index);
            }
            TrainingKind::Correction => {
                self.corrections.remove(index);
            }
        }
        Ok(())
    }

    pub fn len(&self, kind: TrainingKind) -> usize {
        match kind {
            TrainingKind::Rule => self.rules.len(),
            TrainingKind::Faq => self.faq.len(),
            TrainingKind::Example => self.examples.len(),
            TrainingKind::Correction => self.corrections.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        TrainingKind::ALL.iter().all(|kind| self.len(*kind) == 0)
    }
}
