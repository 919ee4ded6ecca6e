//! Deterministic fake capabilities shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use witness::adapters::{AnalysisClient, AnchorClient, AnchorError, NarrationClient, ServiceError};
use witness::core::{MemoryRecordStore, Orchestrator, RecordStore};
use witness::Fingerprint;

pub const VALID_ANALYSIS: &str = r#"{
    "incidentType": "housing",
    "urgency": 4,
    "extractedEntities": ["landlord", "Unit 4B"],
    "formalReport": "On the evening in question the complainant's locks were changed without notice."
}"#;

/// Confirms every fingerprint with a fresh reference and counts writes
#[derive(Default)]
pub struct CountingLedger {
    writes: AtomicUsize,
}

impl CountingLedger {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnchorClient for CountingLedger {
    fn name(&self) -> &str {
        "counting"
    }

    async fn anchor(&self, fingerprint: &Fingerprint) -> Result<String, AnchorError> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("tx-{}-{}", n, fingerprint.short()))
    }
}

/// Always fails with the given error
pub struct FailingLedger(pub AnchorError);

#[async_trait]
impl AnchorClient for FailingLedger {
    fn name(&self) -> &str {
        "failing"
    }

    async fn anchor(&self, _fingerprint: &Fingerprint) -> Result<String, AnchorError> {
        Err(self.0.clone())
    }
}

/// Accepts the write but never confirms it
pub struct HangingLedger;

#[async_trait]
impl AnchorClient for HangingLedger {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn anchor(&self, _fingerprint: &Fingerprint) -> Result<String, AnchorError> {
        tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        Ok("never".to_string())
    }
}

/// Gives up on its own deadline, reporting the accepted write
pub struct SlowTimeoutLedger {
    pub reference: String,
    pub after: Duration,
}

#[async_trait]
impl AnchorClient for SlowTimeoutLedger {
    fn name(&self) -> &str {
        "slow"
    }

    async fn anchor(&self, _fingerprint: &Fingerprint) -> Result<String, AnchorError> {
        tokio::time::sleep(self.after).await;
        Err(AnchorError::ConfirmationTimeout {
            reference: Some(self.reference.clone()),
            waited: self.after,
        })
    }
}

/// Returns a blank reference
pub struct BlankLedger;

#[async_trait]
impl AnchorClient for BlankLedger {
    fn name(&self) -> &str {
        "blank"
    }

    async fn anchor(&self, _fingerprint: &Fingerprint) -> Result<String, AnchorError> {
        Ok("   ".to_string())
    }
}

/// Audio is the statement bytes prefixed with a marker
pub struct EchoNarrator;

#[async_trait]
impl NarrationClient for EchoNarrator {
    fn name(&self) -> &str {
        "echo"
    }

    async fn narrate(&self, text: &str) -> Result<Vec<u8>, ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::EmptyInput);
        }
        let mut audio = b"AUDIO:".to_vec();
        audio.extend_from_slice(text.as_bytes());
        Ok(audio)
    }
}

/// Narration service that is down
pub struct DownNarrator;

#[async_trait]
impl NarrationClient for DownNarrator {
    fn name(&self) -> &str {
        "down"
    }

    async fn narrate(&self, _text: &str) -> Result<Vec<u8>, ServiceError> {
        Err(ServiceError::Unavailable("connection refused".to_string()))
    }
}

/// Returns a fixed raw response
pub struct ScriptedAnalyst(pub String);

impl ScriptedAnalyst {
    pub fn valid() -> Self {
        Self(VALID_ANALYSIS.to_string())
    }
}

#[async_trait]
impl AnalysisClient for ScriptedAnalyst {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn analyze(&self, _text: &str) -> Result<String, ServiceError> {
        Ok(self.0.clone())
    }
}

/// Orchestrator over a memory store with a counting ledger
pub fn memory_orchestrator() -> (Orchestrator, Arc<CountingLedger>, Arc<MemoryRecordStore>) {
    let ledger = Arc::new(CountingLedger::default());
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = Orchestrator::new(
        ledger.clone(),
        Arc::new(EchoNarrator),
        Arc::new(ScriptedAnalyst::valid()),
        store.clone(),
    );
    (orchestrator, ledger, store)
}

/// Orchestrator with a specific ledger over a memory store
pub fn with_ledger(ledger: Arc<dyn AnchorClient>) -> (Orchestrator, Arc<MemoryRecordStore>) {
    let store = Arc::new(MemoryRecordStore::new());
    let orchestrator = Orchestrator::new(
        ledger,
        Arc::new(EchoNarrator),
        Arc::new(ScriptedAnalyst::valid()),
        store.clone() as Arc<dyn RecordStore>,
    );
    (orchestrator, store)
}
