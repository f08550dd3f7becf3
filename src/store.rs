//! File-backed data store. Each agent owns a directory under the data root
//! holding `config.json`, `training.json` and `leads.json`.
//!
//! Read-modify-write cycles for one agent are serialized through a per-agent
//! async mutex, and every write lands in a temporary sibling that is renamed
//! over the target.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::domains::agent::{merge_config, AgentConfig};
use crate::domains::lead::Lead;
use crate::domains::training::{TrainingData, TrainingKind, TrainingRecord};
use crate::error::{ConciergeError, Result};

const CONFIG_FILE: &str = "config.json";
const TRAINING_FILE: &str = "training.json";
const LEADS_FILE: &str = "leads.json";

pub struct DataStore {
    base: PathBuf,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DataStore {
    pub fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        std::fs::create_dir_all(&base)?;
        Ok(Self {
            base,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    fn agent_dir(&self, agent_id: &str) -> Result<PathBuf> {
        validate_agent_id(agent_id)?;
        Ok(self.base.join(agent_id))
    }

    async fn lock(&self, agent_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks
                .entry(agent_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Agents that have a `config.json`, sorted by id.
    pub async fn list_agents(&self) -> Result<Vec<String>> {
        let mut agents = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if tokio::fs::try_exists(entry.path().join(CONFIG_FILE)).await? {
                agents.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        agents.sort();
        Ok(agents)
    }

    // --- agent config ---

    pub async fn get_config(&self, agent_id: &str) -> Result<Option<Value>> {
        read_json(&self.agent_dir(agent_id)?.join(CONFIG_FILE)).await
    }

    pub async fn get_agent_config(&self, agent_id: &str) -> Result<Option<AgentConfig>> {
        self.get_config(agent_id)
            .await?
            .map(AgentConfig::from_value)
            .transpose()
    }

    pub async fn require_agent_config(&self, agent_id: &str) -> Result<AgentConfig> {
        self.get_agent_config(agent_id)
            .await?
            .ok_or_else(|| agent_not_found(agent_id))
    }

    pub async fn save_config(&self, agent_id: &str, config: &Value) -> Result<()> {
        let path = self.agent_dir(agent_id)?.join(CONFIG_FILE);
        let _guard = self.lock(agent_id).await;
        write_json(&path, config).await
    }

    pub async fn create_config(&self, agent_id: &str, config: Value, now: DateTime<Utc>) -> Result<()> {
        let path = self.agent_dir(agent_id)?.join(CONFIG_FILE);
        let _guard = self.lock(agent_id).await;
        if tokio::fs::try_exists(&path).await? {
            return Err(ConciergeError::Conflict(format!(
                "Agent '{agent_id}' already exists"
            )));
        }
        validate_shape(&config)?;
        let mut config = into_object(config)?;
        config.insert("created_at".to_string(), Value::String(now.to_rfc3339()));
        config.insert("updated_at".to_string(), Value::String(now.to_rfc3339()));
        write_json(&path, &Value::Object(config)).await?;
        info!(agent_id, "Created agent config");
        Ok(())
    }

    /// Deep-merges `patch` into the stored config, creating it when absent.
    pub async fn update_config(&self, agent_id: &str, patch: Value, now: DateTime<Utc>) -> Result<Value> {
        let path = self.agent_dir(agent_id)?.join(CONFIG_FILE);
        let _guard = self.lock(agent_id).await;
        let patch = Value::Object(into_object(patch)?);
        let mut config = match read_json::<Value>(&path).await? {
            Some(mut existing) => {
                merge_config(&mut existing, patch);
                existing
            }
            None => patch,
        };
        if let Some(map) = config.as_object_mut() {
            map.insert("updated_at".to_string(), Value::String(now.to_rfc3339()));
        }
        validate_shape(&config)?;
        write_json(&path, &config).await?;
        info!(agent_id, "Updated agent config");
        Ok(config)
    }

    // --- training ---

    pub async fn get_training(&self, agent_id: &str) -> Result<TrainingData> {
        Ok(read_json(&self.agent_dir(agent_id)?.join(TRAINING_FILE))
            .await?
            .unwrap_or_default())
    }

    pub async fn save_training(&self, agent_id: &str, training: &TrainingData) -> Result<()> {
        let path = self.agent_dir(agent_id)?.join(TRAINING_FILE);
        let _guard = self.lock(agent_id).await;
        write_json(&path, training).await
    }

    /// Appends a record and returns the new size of its list.
    pub async fn add_training(&self, agent_id: &str, record: TrainingRecord) -> Result<usize> {
        let path = self.agent_dir(agent_id)?.join(TRAINING_FILE);
        let _guard = self.lock(agent_id).await;
        let mut training: TrainingData = read_json(&path).await?.unwrap_or_default();
        let kind = record.kind();
        let total = training.push(record);
        write_json(&path, &training).await?;
        debug!(agent_id, kind = kind.as_str(), total, "Added training record");
        Ok(total)
    }

    pub async fn remove_training(&self, agent_id: &str, kind: TrainingKind, index: usize) -> Result<()> {
        let path = self.agent_dir(agent_id)?.join(TRAINING_FILE);
        let _guard = self.lock(agent_id).await;
        let mut training: TrainingData = read_json(&path).await?.unwrap_or_default();
        training.remove(kind, index)?;
        write_json(&path, &training).await?;
        debug!(agent_id, kind = kind.as_str(), index, "Removed training record");
        Ok(())
    }

    // --- leads ---

    pub async fn get_leads(&self, agent_id: &str) -> Result<Vec<Lead>> {
        Ok(read_json(&self.agent_dir(agent_id)?.join(LEADS_FILE))
            .await?
            .unwrap_or_default())
    }

    pub async fn get_lead(&self, agent_id: &str, lead_id: &str) -> Result<Option<Lead>> {
        Ok(self
            .get_leads(agent_id)
            .await?
            .into_iter()
            .find(|lead| lead.id == lead_id))
    }

    /// Replaces the lead with the same id, or appends it.
    pub async fn upsert_lead(&self, agent_id: &str, lead: &Lead) -> Result<()> {
        self.upsert_lead_with(agent_id, lead.clone(), |stored| *stored = lead.clone())
            .await
            .map(|_| ())
    }

    /// Re-reads the lead under the agent lock and applies `change` to the
    /// stored copy, or to `fallback` when the lead is not stored yet.
    /// Returns the saved lead with whatever `change` returned.
    pub async fn upsert_lead_with<F, R>(&self, agent_id: &str, fallback: Lead, change: F) -> Result<(Lead, R)>
    where
        F: FnOnce(&mut Lead) -> R,
    {
        let path = self.agent_dir(agent_id)?.join(LEADS_FILE);
        let _guard = self.lock(agent_id).await;
        let mut leads: Vec<Lead> = read_json(&path).await?.unwrap_or_default();
        let index = match leads.iter().position(|existing| existing.id == fallback.id) {
            Some(index) => index,
            None => {
                leads.push(fallback);
                leads.len() - 1
            }
        };
        let output = change(&mut leads[index]);
        let updated = leads[index].clone();
        write_json(&path, &leads).await?;
        Ok((updated, output))
    }

    /// Applies `change` to a stored lead under the agent lock and returns
    /// the updated lead.
    pub async fn update_lead<F>(&self, agent_id: &str, lead_id: &str, change: F) -> Result<Lead>
    where
        F: FnOnce(&mut Lead),
    {
        let path = self.agent_dir(agent_id)?.join(LEADS_FILE);
        let _guard = self.lock(agent_id).await;
        let mut leads: Vec<Lead> = read_json(&path).await?.unwrap_or_default();
        let lead = leads
            .iter_mut()
            .find(|lead| lead.id == lead_id)
            .ok_or_else(|| ConciergeError::NotFound("Lead not found".to_string()))?;
        change(lead);
        let updated = lead.clone();
        write_json(&path, &leads).await?;
        Ok(updated)
    }

    // --- seeding ---

    /// Copies every agent under `seed_dir` whose config is not yet present.
    /// Returns the ids that were seeded.
    pub async fn seed_from(&self, seed_dir: &Path) -> Result<Vec<String>> {
        let mut seeded = Vec::new();
        if !tokio::fs::try_exists(seed_dir).await? {
            warn!("Seed directory {} does not exist", seed_dir.display());
            return Ok(seeded);
        }

        let mut entries = tokio::fs::read_dir(seed_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let agent_id = entry.file_name().to_string_lossy().to_string();
            if validate_agent_id(&agent_id).is_err() {
                warn!("Skipping seed directory with invalid agent id {:?}", agent_id);
                continue;
            }
            if self.get_config(&agent_id).await?.is_some() {
                continue;
            }

            let Some(config) = read_json::<Value>(&entry.path().join(CONFIG_FILE)).await? else {
                continue;
            };
            self.save_config(&agent_id, &config).await?;
            info!(agent_id = %agent_id, "Seeded agent config");

            if let Some(training) =
                read_json::<TrainingData>(&entry.path().join(TRAINING_FILE)).await?
            {
                self.save_training(&agent_id, &training).await?;
                info!(agent_id = %agent_id, "Seeded agent training data");
            }
            seeded.push(agent_id);
        }
        seeded.sort();
        Ok(seeded)
    }
}

pub fn agent_not_found(agent_id: &str) -> ConciergeError {
    ConciergeError::NotFound(format!("Agent '{agent_id}' not found"))
}

/// Agent ids become directory names, so only a conservative character set
/// is accepted.
pub fn validate_agent_id(agent_id: &str) -> Result<()> {
    let valid = !agent_id.is_empty()
        && agent_id.len() <= 128
        && !agent_id.starts_with('.')
        && agent_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ConciergeError::InvalidInput(format!(
            "invalid agent id: {agent_id:?}"
        )))
    }
}

fn into_object(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ConciergeError::InvalidInput(format!(
            "config must be a JSON object, got {other}"
        ))),
    }
}

fn validate_shape(config: &Value) -> Result<()> {
    AgentConfig::from_value(config.clone())
        .map(|_| ())
        .map_err(|e| ConciergeError::InvalidInput(e.to_string()))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_str(&raw).map(Some).map_err(|e| {
        ConciergeError::Serialization(format!("failed to parse {}: {e}", path.display()))
    })
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
