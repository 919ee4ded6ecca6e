//! Audit events for the sealing pipeline.
//!
//! Every step appends immutable events to the audit log. The log is a
//! trail for humans and tooling; record state lives in the record store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::RecordId;

/// A single event in the append-only audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// Groups the events of one operation: the submission id for
    /// `submit`, the record id for later steps
    pub correlation_id: Uuid,

    /// Record this event belongs to, once it exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,

    /// Pipeline step (if applicable)
    pub step: Option<Step>,

    /// Type of event
    pub event_type: EventType,

    /// Idempotency key format: "{scope}:{step}:{input_hash}"
    pub idempotency_key: String,

    /// Human-readable summary (NO secrets, NO statement text)
    pub payload_summary: String,

    /// Current status of the step
    pub status: StepStatus,

    /// Time taken in milliseconds (for finished steps)
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        correlation_id: Uuid,
        step: Option<Step>,
        event_type: EventType,
        idempotency_key: String,
        payload_summary: String,
        status: StepStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            correlation_id,
            record_id: None,
            step,
            event_type,
            idempotency_key,
            payload_summary,
            status,
            duration_ms: None,
            error: None,
        }
    }

    /// Attach the record this event concerns
    pub fn with_record(mut self, record_id: RecordId) -> Self {
        self.record_id = Some(record_id);
        self
    }

    /// Create an event with duration information
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Create an event with error information
    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Steps of the sealing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Hash the artifact
    Fingerprint,
    /// Write the fingerprint to the ledger and wait for confirmation
    Anchor,
    /// Create the record in the store
    Persist,
    /// Render the statement to audio
    Narrate,
    /// Classify the statement and generate a report
    Analyze,
    /// Read a record
    Fetch,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fingerprint => "fingerprint",
            Self::Anchor => "anchor",
            Self::Persist => "persist",
            Self::Narrate => "narrate",
            Self::Analyze => "analyze",
            Self::Fetch => "fetch",
        };
        f.write_str(name)
    }
}

/// Types of events that can occur during sealing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A step has started execution
    StepStarted,

    /// A step completed successfully
    StepCompleted,

    /// A step failed
    StepFailed,

    /// A record was created with a confirmed anchor
    RecordSealed,
}

/// Status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet started
    Pending,

    /// Currently executing
    Running,

    /// Completed successfully
    Completed,

    /// Failed (with error)
    Failed,
}

impl Default for StepStatus {
    fn default() -> Self {
        Self::Pending
    }
}
