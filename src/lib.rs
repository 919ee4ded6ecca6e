//! witness - Tamper-evident evidence sealing
//!
//! Seals a digital artifact by fingerprinting it and anchoring the
//! fingerprint to an append-only ledger, then enriches the sealed record
//! with a narrated statement and a structured analysis. Anyone holding
//! the artifact and the published fingerprint can verify it later
//! without trusting this system.
//!
//! # Architecture
//!
//! - A record exists only once its anchor is confirmed
//! - Fingerprint and anchor reference never change after sealing
//! - Narration and analysis are independent, repeatable enrichments
//! - Every step is journaled to an append-only audit log
//!
//! # Modules
//!
//! - `adapters`: Capability interfaces and their providers (ledger, speech, chat)
//! - `core`: Fingerprinting, orchestration, record store, verification
//! - `domain`: Data structures (EvidenceRecord, Analysis, Event)
//! - `server`: HTTP API
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Seal an artifact
//! witness submit photo.jpg
//!
//! # Attach a statement
//! witness narrate <record-id> --text "At 9pm the landlord changed the locks"
//! witness analyze <record-id> --text "At 9pm the landlord changed the locks"
//!
//! # Verify a copy
//! witness verify photo.jpg --record <record-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;

// Re-export main types at crate root for convenience
pub use crate::core::{fingerprint, verify, ErrorKind, Fingerprint, Orchestrator, SealError, Verdict};
pub use domain::{Analysis, EvidenceRecord, IncidentCategory, RecordId, SealStage};
