//! Append-only audit log with file-based persistence.
//!
//! Events are stored as newline-delimited JSON (JSONL) for simplicity
//! and easy debugging/inspection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::domain::{Event, EventType, RecordId, Step};

/// File-based audit log using JSONL format
#[derive(Debug, Clone)]
pub struct EventStore {
    /// Path to the events.jsonl file
    events_path: PathBuf,
}

impl EventStore {
    /// Create or open an event log at a path
    pub async fn open(events_path: impl Into<PathBuf>) -> Result<Self> {
        let events_path = events_path.into();

        if let Some(parent) = events_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }

        Ok(Self { events_path })
    }

    /// Open the log at the configured location ($WITNESS_HOME/events.jsonl)
    pub async fn open_default() -> Result<Self> {
        Self::open(crate::config::events_path()?).await
    }

    /// Get the path to the events file
    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Append an event to the log
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open events file: {}",
                    self.events_path.display()
                )
            })?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<Event>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Find events matching a predicate
    pub async fn find_events<F>(&self, predicate: F) -> Result<Vec<Event>>
    where
        F: Fn(&Event) -> bool,
    {
        let events = self.replay().await?;
        Ok(events.into_iter().filter(predicate).collect())
    }

    /// All events concerning a record, in order
    pub async fn events_for(&self, record_id: RecordId) -> Result<Vec<Event>> {
        self.find_events(|e| e.record_id == Some(record_id)).await
    }

    /// Get the last event of a specific type
    pub async fn last_event_of_type(&self, event_type: EventType) -> Result<Option<Event>> {
        let events = self.replay().await?;
        Ok(events.into_iter().rev().find(|e| e.event_type == event_type))
    }
}

/// Generate an idempotency key for a step
pub fn generate_idempotency_key(scope: &str, step: Step, input: &[u8]) -> String {
    let input_hash = hash_input(input);
    format!("{}:{}:{}", scope, step, input_hash)
}

/// Hash input content (first 16 chars of SHA256)
pub fn hash_input(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    let result = hasher.finalize();
    hex::encode(&result[..8]) // First 16 hex chars (8 bytes)
}
