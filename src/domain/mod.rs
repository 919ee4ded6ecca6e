//! Domain types for the witness sealing pipeline.
//!
//! This module contains the core data structures:
//! - Record: the evidence record, its id, and its patches
//! - Analysis: validated structured analysis of a statement
//! - Events: audit trail entries for pipeline steps

pub mod analysis;
pub mod events;
pub mod record;

// Re-export commonly used types
pub use analysis::{Analysis, AnalysisShapeError, IncidentCategory, URGENCY_RANGE};
pub use events::{Event, EventType, Step, StepStatus};
pub use record::{EvidenceRecord, NewRecord, RecordId, RecordPatch, SealProof, SealStage};
