//! Sealing orchestrator.
//!
//! Drives an evidence record through its lifecycle:
//! fingerprint -> anchor -> persist, then independent narration and
//! analysis enrichments against the sealed record.
//!
//! A record is created only after the ledger confirmed the anchor, and
//! enrichment failures never touch the sealed fingerprint or anchor
//! reference. Nothing here retries; callers resubmit the failed step.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{self, AnalysisClient, AnchorClient, AnchorError, NarrationClient, ServiceError};
use crate::config::ResolvedConfig;
use crate::domain::{
    Analysis, Event, EventType, EvidenceRecord, NewRecord, RecordId, RecordPatch, Step, StepStatus,
};

use super::event_store::{generate_idempotency_key, EventStore};
use super::fingerprint::{fingerprint, Fingerprint};
use super::limits::{Limits, LimitViolation};
use super::record_store::{FileRecordStore, RecordStore, StoreError};

/// Slack past the anchor deadline before the orchestrator gives up on a
/// client. Clients enforce the deadline themselves and report the
/// reference of an accepted write; this bound only catches clients that
/// never return.
const ANCHOR_GRACE: Duration = Duration::from_secs(5);

/// Machine-readable failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Transport,
    Rejected,
    ConfirmationTimeout,
    MalformedResponse,
    RecordNotFound,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Transport => "transport",
            Self::Rejected => "rejected",
            Self::ConfirmationTimeout => "confirmation_timeout",
            Self::MalformedResponse => "malformed_response",
            Self::RecordNotFound => "record_not_found",
            Self::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// Failure of a pipeline operation, with enough context to retry the step
#[derive(Debug, Error)]
pub enum SealError {
    #[error("Invalid input for {step}: {reason}")]
    Validation {
        step: Step,
        record_id: Option<RecordId>,
        reason: String,
    },

    #[error("{step} service unavailable: {reason}")]
    Transport {
        step: Step,
        record_id: Option<RecordId>,
        reason: String,
    },

    #[error("Ledger rejected the anchor: {reason}")]
    Rejected { reason: String },

    #[error("Anchor not confirmed within {waited:?}")]
    ConfirmationTimeout {
        /// Reference of the accepted write, when the ledger issued one
        reference: Option<String>,
        waited: Duration,
    },

    #[error("{step} returned a malformed response: {reason}")]
    MalformedResponse {
        step: Step,
        record_id: Option<RecordId>,
        reason: String,
    },

    #[error("Record not found: {id}")]
    RecordNotFound { step: Step, id: RecordId },

    #[error("Record store failed during {step}: {source}")]
    Storage {
        step: Step,
        record_id: Option<RecordId>,
        /// Set when the ledger write already happened but the record could not be saved
        anchor_reference: Option<String>,
        #[source]
        source: StoreError,
    },
}

impl SealError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Rejected { .. } => ErrorKind::Rejected,
            Self::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::RecordNotFound { .. } => ErrorKind::RecordNotFound,
            Self::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// The step that failed
    pub fn step(&self) -> Step {
        match self {
            Self::Validation { step, .. }
            | Self::Transport { step, .. }
            | Self::MalformedResponse { step, .. }
            | Self::RecordNotFound { step, .. }
            | Self::Storage { step, .. } => *step,
            Self::Rejected { .. } | Self::ConfirmationTimeout { .. } => Step::Anchor,
        }
    }

    /// The record the failed operation targeted, if it exists
    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            Self::Validation { record_id, .. }
            | Self::Transport { record_id, .. }
            | Self::MalformedResponse { record_id, .. }
            | Self::Storage { record_id, .. } => *record_id,
            Self::RecordNotFound { id, .. } => Some(*id),
            Self::Rejected { .. } | Self::ConfirmationTimeout { .. } => None,
        }
    }

    fn from_anchor(err: AnchorError) -> Self {
        match err {
            AnchorError::Unavailable(reason) => Self::Transport {
                step: Step::Anchor,
                record_id: None,
                reason,
            },
            AnchorError::Rejected(reason) => Self::Rejected { reason },
            AnchorError::ConfirmationTimeout { reference, waited } => {
                Self::ConfirmationTimeout { reference, waited }
            }
        }
    }

    fn from_service(step: Step, record_id: RecordId, err: ServiceError) -> Self {
        let record_id = Some(record_id);
        match err {
            ServiceError::EmptyInput => Self::Validation {
                step,
                record_id,
                reason: "statement text is empty".to_string(),
            },
            ServiceError::Unavailable(reason) => Self::Transport {
                step,
                record_id,
                reason,
            },
            ServiceError::Malformed(reason) => Self::MalformedResponse {
                step,
                record_id,
                reason,
            },
        }
    }

    fn from_store(step: Step, record_id: RecordId, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::RecordNotFound { step, id },
            source => Self::Storage {
                step,
                record_id: Some(record_id),
                anchor_reference: None,
                source,
            },
        }
    }

    fn validation(step: Step, record_id: Option<RecordId>, violation: LimitViolation) -> Self {
        Self::Validation {
            step,
            record_id,
            reason: violation.to_string(),
        }
    }
}

/// Main sealing orchestrator
pub struct Orchestrator {
    anchor: Arc<dyn AnchorClient>,
    narration: Arc<dyn NarrationClient>,
    analysis: Arc<dyn AnalysisClient>,
    store: Arc<dyn RecordStore>,
    /// Audit log; absent means steps are not journaled
    events: Option<EventStore>,
    limits: Limits,
}

impl Orchestrator {
    /// Create an orchestrator over explicit capabilities
    pub fn new(
        anchor: Arc<dyn AnchorClient>,
        narration: Arc<dyn NarrationClient>,
        analysis: Arc<dyn AnalysisClient>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            anchor,
            narration,
            analysis,
            store,
            events: None,
            limits: Limits::default(),
        }
    }

    /// Journal every step to an audit log
    pub fn with_event_store(mut self, events: EventStore) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Build from resolved configuration: file-backed records and audit log
    pub async fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let store = FileRecordStore::open(&config.records).await?;
        let events = EventStore::open(config.events_path()).await?;

        Ok(Self::new(
            adapters::anchor_from_config(config)?,
            adapters::narration_from_config(config)?,
            adapters::analysis_from_config(config)?,
            Arc::new(store),
        )
        .with_event_store(events)
        .with_limits(config.limits.clone()))
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn anchor_backend(&self) -> &str {
        self.anchor.name()
    }

    /// Fingerprint, anchor, then persist a new sealed record.
    ///
    /// No record exists unless the anchor was confirmed. Each call is a
    /// separate ledger write, even for identical bytes.
    #[instrument(skip(self, artifact), fields(bytes = artifact.len()))]
    pub async fn submit(&self, artifact: &[u8]) -> Result<EvidenceRecord, SealError> {
        let submission = Uuid::new_v4();

        self.limits
            .validate_artifact(artifact)
            .map_err(|v| SealError::validation(Step::Fingerprint, None, v))?;

        let fp = fingerprint(artifact).map_err(|e| SealError::Validation {
            step: Step::Fingerprint,
            record_id: None,
            reason: e.to_string(),
        })?;
        debug!(fingerprint = %fp.short(), "Artifact fingerprinted");

        let reference = self.anchor_fingerprint(submission, &fp).await?;

        let new = NewRecord {
            fingerprint: fp,
            anchor_reference: reference.clone(),
            sealed_at: Utc::now(),
        };

        let id = match self.store.create(new).await {
            Ok(id) => id,
            Err(source) => {
                error!(
                    fingerprint = %fp.short(),
                    anchor_reference = %reference,
                    error = %source,
                    "Anchored fingerprint could not be persisted"
                );
                self.log(
                    Event::new(
                        submission,
                        Some(Step::Persist),
                        EventType::StepFailed,
                        generate_idempotency_key(&submission.to_string(), Step::Persist, fp.as_bytes()),
                        format!("Persist failed for anchor {}", reference),
                        StepStatus::Failed,
                    )
                    .with_error(source.to_string()),
                )
                .await;
                return Err(SealError::Storage {
                    step: Step::Persist,
                    record_id: None,
                    anchor_reference: Some(reference),
                    source,
                });
            }
        };

        let record = self
            .store
            .get(id)
            .await
            .map_err(|e| SealError::from_store(Step::Persist, id, e))?
            .ok_or(SealError::RecordNotFound {
                step: Step::Persist,
                id,
            })?;

        self.log(
            Event::new(
                submission,
                Some(Step::Persist),
                EventType::RecordSealed,
                generate_idempotency_key(&submission.to_string(), Step::Persist, fp.as_bytes()),
                format!("Record sealed with fingerprint {}", fp.short()),
                StepStatus::Completed,
            )
            .with_record(id),
        )
        .await;

        info!(record_id = %id, fingerprint = %fp.short(), anchor_reference = %reference, "Record sealed");
        Ok(record)
    }

    /// The single ledger write of a submission, bounded by the anchor timeout
    async fn anchor_fingerprint(&self, submission: Uuid, fp: &Fingerprint) -> Result<String, SealError> {
        let key = generate_idempotency_key(&submission.to_string(), Step::Anchor, fp.as_bytes());
        let timeout = self.limits.anchor_timeout() + ANCHOR_GRACE;
        let started = Instant::now();

        self.log(Event::new(
            submission,
            Some(Step::Anchor),
            EventType::StepStarted,
            key.clone(),
            format!("Anchoring {} via {}", fp.short(), self.anchor.name()),
            StepStatus::Running,
        ))
        .await;

        let result = match tokio::time::timeout(timeout, self.anchor.anchor(fp)).await {
            Ok(Ok(reference)) if reference.trim().is_empty() => Err(SealError::MalformedResponse {
                step: Step::Anchor,
                record_id: None,
                reason: "ledger returned an empty reference".to_string(),
            }),
            Ok(Ok(reference)) => Ok(reference),
            Ok(Err(e)) => Err(SealError::from_anchor(e)),
            Err(_) => Err(SealError::ConfirmationTimeout {
                reference: None,
                waited: timeout,
            }),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(reference) => {
                self.log(
                    Event::new(
                        submission,
                        Some(Step::Anchor),
                        EventType::StepCompleted,
                        key,
                        format!("Anchor confirmed: {}", reference),
                        StepStatus::Completed,
                    )
                    .with_duration(duration_ms),
                )
                .await;
            }
            Err(e) => {
                warn!(kind = %e.kind(), error = %e, "Anchor failed; no record created");
                self.log(
                    Event::new(
                        submission,
                        Some(Step::Anchor),
                        EventType::StepFailed,
                        key,
                        format!("Anchor failed ({})", e.kind()),
                        StepStatus::Failed,
                    )
                    .with_duration(duration_ms)
                    .with_error(e.to_string()),
                )
                .await;
            }
        }

        result
    }

    /// Render the statement to audio and store both on the record.
    ///
    /// Overwrites an earlier narration (last write wins).
    #[instrument(skip(self, text), fields(record_id = %id))]
    pub async fn attach_narration(&self, id: RecordId, text: &str) -> Result<EvidenceRecord, SealError> {
        let step = Step::Narrate;
        self.limits
            .validate_statement(text)
            .map_err(|v| SealError::validation(step, Some(id), v))?;
        self.require_record(step, id).await?;

        let started = Instant::now();
        let key = generate_idempotency_key(&id.to_string(), step, text.as_bytes());
        self.log_started(id, step, &key, self.narration.name()).await;

        let timeout = self.limits.narration_timeout();
        let audio = match tokio::time::timeout(timeout, self.narration.narrate(text)).await {
            Ok(Ok(audio)) if audio.is_empty() => Err(SealError::MalformedResponse {
                step,
                record_id: Some(id),
                reason: "narration returned no audio".to_string(),
            }),
            Ok(Ok(audio)) => Ok(audio),
            Ok(Err(e)) => Err(SealError::from_service(step, id, e)),
            Err(_) => Err(SealError::Transport {
                step,
                record_id: Some(id),
                reason: format!("no response within {:?}", timeout),
            }),
        };

        let result = match audio {
            Ok(audio) => {
                let bytes = audio.len();
                self.store
                    .update(id, RecordPatch::narration(text, audio))
                    .await
                    .map_err(|e| SealError::from_store(step, id, e))
                    .map(|record| (record, format!("Narration stored ({} bytes of audio)", bytes)))
            }
            Err(e) => Err(e),
        };

        self.finish_enrichment(id, step, key, started, result).await
    }

    /// Analyze the statement and store the validated result on the record.
    ///
    /// A response that does not fit the analysis shape is rejected whole;
    /// nothing is written. Overwrites an earlier analysis (last write wins).
    #[instrument(skip(self, text), fields(record_id = %id))]
    pub async fn attach_analysis(&self, id: RecordId, text: &str) -> Result<EvidenceRecord, SealError> {
        let step = Step::Analyze;
        self.limits
            .validate_statement(text)
            .map_err(|v| SealError::validation(step, Some(id), v))?;
        self.require_record(step, id).await?;

        let started = Instant::now();
        let key = generate_idempotency_key(&id.to_string(), step, text.as_bytes());
        self.log_started(id, step, &key, self.analysis.name()).await;

        let timeout = self.limits.analysis_timeout();
        let analysis = match tokio::time::timeout(timeout, self.analysis.analyze(text)).await {
            Ok(Ok(raw)) => Analysis::from_response(&raw).map_err(|e| SealError::MalformedResponse {
                step,
                record_id: Some(id),
                reason: e.to_string(),
            }),
            Ok(Err(e)) => Err(SealError::from_service(step, id, e)),
            Err(_) => Err(SealError::Transport {
                step,
                record_id: Some(id),
                reason: format!("no response within {:?}", timeout),
            }),
        };

        let result = match analysis {
            Ok(analysis) => {
                let summary = format!(
                    "Analysis stored (category {}, urgency {})",
                    analysis.category, analysis.urgency_score
                );
                self.store
                    .update(id, RecordPatch::analysis(analysis))
                    .await
                    .map_err(|e| SealError::from_store(step, id, e))
                    .map(|record| (record, summary))
            }
            Err(e) => Err(e),
        };

        self.finish_enrichment(id, step, key, started, result).await
    }

    /// Read a record. Unknown ids are an error, never placeholder data.
    pub async fn fetch(&self, id: RecordId) -> Result<EvidenceRecord, SealError> {
        self.store
            .get(id)
            .await
            .map_err(|e| SealError::from_store(Step::Fetch, id, e))?
            .ok_or(SealError::RecordNotFound {
                step: Step::Fetch,
                id,
            })
    }

    async fn require_record(&self, step: Step, id: RecordId) -> Result<(), SealError> {
        match self.store.get(id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(SealError::RecordNotFound { step, id }),
            Err(e) => Err(SealError::from_store(step, id, e)),
        }
    }

    async fn log_started(&self, id: RecordId, step: Step, key: &str, backend: &str) {
        debug!(%step, backend, "Step started");
        self.log(
            Event::new(
                id.as_uuid(),
                Some(step),
                EventType::StepStarted,
                key.to_string(),
                format!("{} via {}", step, backend),
                StepStatus::Running,
            )
            .with_record(id),
        )
        .await;
    }

    /// Journal the outcome of an enrichment step
    async fn finish_enrichment(
        &self,
        id: RecordId,
        step: Step,
        key: String,
        started: Instant,
        result: Result<(EvidenceRecord, String), SealError>,
    ) -> Result<EvidenceRecord, SealError> {
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok((record, summary)) => {
                info!(%step, duration_ms, "{}", summary);
                self.log(
                    Event::new(
                        id.as_uuid(),
                        Some(step),
                        EventType::StepCompleted,
                        key,
                        summary,
                        StepStatus::Completed,
                    )
                    .with_record(id)
                    .with_duration(duration_ms),
                )
                .await;
                Ok(record)
            }
            Err(e) => {
                error!(%step, kind = %e.kind(), error = %e, "Step failed; sealed fields untouched");
                self.log(
                    Event::new(
                        id.as_uuid(),
                        Some(step),
                        EventType::StepFailed,
                        key,
                        format!("{} failed ({})", step, e.kind()),
                        StepStatus::Failed,
                    )
                    .with_record(id)
                    .with_duration(duration_ms)
                    .with_error(e.to_string()),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Append to the audit log; failures are logged and never fail the step
    async fn log(&self, event: Event) {
        if let Some(events) = &self.events {
            if let Err(e) = events.append(&event).await {
                warn!(error = %e, event_type = ?event.event_type, "Failed to append audit event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let id = RecordId::generate();
        let err = SealError::from_service(Step::Narrate, id, ServiceError::Unavailable("down".into()));
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.step(), Step::Narrate);
        assert_eq!(err.record_id(), Some(id));

        let err = SealError::from_service(Step::Analyze, id, ServiceError::Malformed("prose".into()));
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);

        let err = SealError::from_service(Step::Analyze, id, ServiceError::EmptyInput);
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_anchor_errors_map_to_anchor_step() {
        let err = SealError::from_anchor(AnchorError::Rejected("bad memo".into()));
        assert_eq!(err.kind(), ErrorKind::Rejected);
        assert_eq!(err.step(), Step::Anchor);
        assert_eq!(err.record_id(), None);

        let err = SealError::from_anchor(AnchorError::ConfirmationTimeout {
            reference: Some("tx-1".into()),
            waited: Duration::from_secs(5),
        });
        assert_eq!(err.kind(), ErrorKind::ConfirmationTimeout);

        let err = SealError::from_anchor(AnchorError::Unavailable("dns".into()));
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_store_not_found_is_record_not_found() {
        let id = RecordId::generate();
        let err = SealError::from_store(Step::Analyze, id, StoreError::NotFound(id));
        assert_eq!(err.kind(), ErrorKind::RecordNotFound);
        assert_eq!(err.record_id(), Some(id));
    }

    #[test]
    fn test_error_kind_rendering() {
        assert_eq!(ErrorKind::ConfirmationTimeout.to_string(), "confirmation_timeout");
        assert_eq!(
            serde_json::to_string(&ErrorKind::RecordNotFound).unwrap(),
            "\"record_not_found\""
        );
    }
}
