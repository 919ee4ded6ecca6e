//! Core sealing logic.
//!
//! This module contains:
//! - Fingerprint: content addressing of artifact bytes
//! - Limits: input validation and step timeouts
//! - RecordStore: persistence of evidence records
//! - EventStore: append-only audit log
//! - Orchestrator: the sealing state machine
//! - Verify: independent artifact verification

pub mod event_store;
pub mod fingerprint;
pub mod limits;
pub mod orchestrator;
pub mod record_store;
pub mod verify;

// Re-export commonly used types
pub use event_store::{generate_idempotency_key, hash_input, EventStore};
pub use fingerprint::{fingerprint, fingerprint_file, Fingerprint, FingerprintError, FingerprintParseError};
pub use limits::{LimitViolation, Limits};
pub use orchestrator::{ErrorKind, Orchestrator, SealError};
pub use record_store::{FileRecordStore, MemoryRecordStore, RecordStore, StoreError};
pub use verify::{verify, verify_record, Verdict, VerificationReport, VerifyError};
