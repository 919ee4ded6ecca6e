//! Local hash-chained ledger.
//!
//! Each anchored fingerprint becomes one line in an append-only JSONL
//! journal. Every entry commits to the previous entry's reference, so
//! rewriting or dropping a line breaks the chain from that point on.
//! The reference handed back to callers is the entry's own hash.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use super::ledger::DEFAULT_MEMO_PREFIX;
use super::{AnchorClient, AnchorError};
use crate::core::fingerprint::Fingerprint;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed journal line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Journal chain broken at sequence {sequence}: {reason}")]
    BrokenChain { sequence: u64, reason: String },

    #[error("Journal task failed: {0}")]
    Task(String),
}

/// One anchored fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Position in the journal, starting at 1
    pub sequence: u64,
    pub fingerprint: Fingerprint,
    pub memo: String,
    pub recorded_at: DateTime<Utc>,
    /// Reference of the preceding entry (absent for the first)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    /// Hash of this entry's contents, used as the anchor reference
    pub reference: String,
}

impl LedgerEntry {
    fn next(
        previous: Option<&LedgerEntry>,
        fingerprint: Fingerprint,
        memo: String,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let sequence = previous.map(|p| p.sequence + 1).unwrap_or(1);
        let previous = previous.map(|p| p.reference.clone());
        let reference = entry_hash(sequence, &fingerprint, &memo, &recorded_at, previous.as_deref());

        Self {
            sequence,
            fingerprint,
            memo,
            recorded_at,
            previous,
            reference,
        }
    }

    /// Recompute the hash from the stored fields
    pub fn computed_reference(&self) -> String {
        entry_hash(
            self.sequence,
            &self.fingerprint,
            &self.memo,
            &self.recorded_at,
            self.previous.as_deref(),
        )
    }
}

fn entry_hash(
    sequence: u64,
    fingerprint: &Fingerprint,
    memo: &str,
    recorded_at: &DateTime<Utc>,
    previous: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sequence.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(fingerprint.to_hex().as_bytes());
    hasher.update(b"|");
    hasher.update(memo.as_bytes());
    hasher.update(b"|");
    hasher.update(recorded_at.to_rfc3339_opts(SecondsFormat::Nanos, true).as_bytes());
    hasher.update(b"|");
    hasher.update(previous.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

/// Anchor backend writing to a local journal file
pub struct JournalLedger {
    path: PathBuf,
    memo_prefix: String,
}

impl JournalLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            memo_prefix: DEFAULT_MEMO_PREFIX.to_string(),
        }
    }

    /// Override the memo written with each fingerprint
    pub fn with_memo_prefix(mut self, memo_prefix: impl Into<String>) -> Self {
        self.memo_prefix = memo_prefix.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in journal order
    pub async fn entries(&self) -> Result<Vec<LedgerEntry>, JournalError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_entries(&path))
            .await
            .map_err(|e| JournalError::Task(e.to_string()))?
    }

    /// Find the entry a reference points at
    pub async fn lookup(&self, reference: &str) -> Result<Option<LedgerEntry>, JournalError> {
        let reference = reference.trim();
        Ok(self
            .entries()
            .await?
            .into_iter()
            .find(|e| e.reference == reference))
    }

    /// Walk the whole journal and check every link.
    ///
    /// Returns the number of entries on success.
    pub async fn verify_chain(&self) -> Result<usize, JournalError> {
        let entries = self.entries().await?;
        let mut previous: Option<&LedgerEntry> = None;

        for entry in &entries {
            let expected_sequence = previous.map(|p| p.sequence + 1).unwrap_or(1);
            if entry.sequence != expected_sequence {
                return Err(JournalError::BrokenChain {
                    sequence: entry.sequence,
                    reason: format!("expected sequence {}", expected_sequence),
                });
            }

            if entry.previous.as_deref() != previous.map(|p| p.reference.as_str()) {
                return Err(JournalError::BrokenChain {
                    sequence: entry.sequence,
                    reason: "previous reference does not match".to_string(),
                });
            }

            if entry.computed_reference() != entry.reference {
                return Err(JournalError::BrokenChain {
                    sequence: entry.sequence,
                    reason: "entry contents do not match its reference".to_string(),
                });
            }

            previous = Some(entry);
        }

        Ok(entries.len())
    }
}

fn read_entries(path: &Path) -> Result<Vec<LedgerEntry>, JournalError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    parse_entries(BufReader::new(file))
}

fn parse_entries(reader: impl BufRead) -> Result<Vec<LedgerEntry>, JournalError> {
    let mut entries = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line).map_err(|source| JournalError::Malformed {
            line: index + 1,
            source,
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Append one entry under an exclusive lock and fsync before returning
fn append_entry(path: &Path, fingerprint: Fingerprint, memo: String) -> Result<LedgerEntry, JournalError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    file.lock_exclusive()?;

    file.seek(SeekFrom::Start(0))?;
    let last = parse_entries(BufReader::new(&file))?.pop();

    let entry = LedgerEntry::next(last.as_ref(), fingerprint, memo, Utc::now());
    let mut line = serde_json::to_string(&entry).map_err(|source| JournalError::Malformed {
        line: entry.sequence as usize,
        source,
    })?;
    line.push('\n');

    file.write_all(line.as_bytes())?;
    file.sync_all()?;

    // Lock is released when `file` is dropped
    Ok(entry)
}

#[async_trait]
impl AnchorClient for JournalLedger {
    fn name(&self) -> &str {
        "journal"
    }

    async fn anchor(&self, fingerprint: &Fingerprint) -> Result<String, AnchorError> {
        let path = self.path.clone();
        let fingerprint = *fingerprint;
        let memo = format!("{}:{}", self.memo_prefix, fingerprint);

        let entry = tokio::task::spawn_blocking(move || append_entry(&path, fingerprint, memo))
            .await
            .map_err(|e| AnchorError::Unavailable(e.to_string()))?
            .map_err(|e| AnchorError::Unavailable(e.to_string()))?;

        debug!(sequence = entry.sequence, reference = %entry.reference, "Journal entry written");
        Ok(entry.reference)
    }
}
