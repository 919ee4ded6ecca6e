//! The evidence record and the shapes used to create and extend it.
//!
//! A record only ever exists in sealed form: it is created after the
//! ledger confirmed the fingerprint, and later steps can only touch the
//! enrichment fields. `RecordPatch` has no way to express a new
//! fingerprint or anchor reference.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::analysis::Analysis;
use crate::core::fingerprint::Fingerprint;

/// Opaque record identifier.
///
/// Holding the id is the only credential needed to read or extend a
/// record, so it is a random v4 UUID rather than anything guessable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for RecordId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Stages a record can have reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SealStage {
    /// Fingerprint computed
    Ingested,
    /// Fingerprint confirmed on the ledger; the record is sealed
    Anchored,
    /// Statement rendered to audio
    Narrated,
    /// Statement classified and reported
    Analyzed,
}

/// A persisted evidence record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    /// Record identifier (assigned by the store)
    pub id: RecordId,

    /// SHA-256 of the submitted artifact. Never changes.
    pub fingerprint: Fingerprint,

    /// Ledger reference for the confirmed anchor. Never changes.
    pub anchor_reference: String,

    /// When the record was sealed
    pub sealed_at: DateTime<Utc>,

    /// Statement text the narration was rendered from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_text: Option<String>,

    /// Audio rendering of the statement
    #[serde(default, skip_serializing_if = "Option::is_none", with = "audio_base64")]
    pub narration_audio: Option<Vec<u8>>,

    /// When the narration was last written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrated_at: Option<DateTime<Utc>>,

    /// Structured analysis of the statement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,

    /// When the analysis was last written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl EvidenceRecord {
    /// Materialize a freshly created record
    pub fn from_new(id: RecordId, new: NewRecord) -> Self {
        Self {
            id,
            fingerprint: new.fingerprint,
            anchor_reference: new.anchor_reference,
            sealed_at: new.sealed_at,
            statement_text: None,
            narration_audio: None,
            narrated_at: None,
            analysis: None,
            analyzed_at: None,
        }
    }

    /// A record is sealed once it carries a confirmed anchor reference
    pub fn is_sealed(&self) -> bool {
        !self.anchor_reference.trim().is_empty()
    }

    /// Stages reached, in lifecycle order
    pub fn stages(&self) -> Vec<SealStage> {
        let mut stages = vec![SealStage::Ingested];
        if self.is_sealed() {
            stages.push(SealStage::Anchored);
        }
        if self.narration_audio.is_some() {
            stages.push(SealStage::Narrated);
        }
        if self.analysis.is_some() {
            stages.push(SealStage::Analyzed);
        }
        stages
    }

    /// The publishable proof, only for sealed records
    pub fn proof(&self) -> Option<SealProof> {
        self.is_sealed().then(|| SealProof {
            fingerprint: self.fingerprint,
            anchor_reference: self.anchor_reference.clone(),
            sealed_at: self.sealed_at,
        })
    }
}

/// What a third party needs to check an artifact against the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealProof {
    pub fingerprint: Fingerprint,
    pub anchor_reference: String,
    pub sealed_at: DateTime<Utc>,
}

/// Fields for creating a record, known only after anchor confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub fingerprint: Fingerprint,
    pub anchor_reference: String,
    pub sealed_at: DateTime<Utc>,
}

/// Field-level update of the enrichment fields.
///
/// `None` leaves a field untouched, so narration and analysis patches
/// never clobber each other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub statement_text: Option<String>,
    pub narration_audio: Option<Vec<u8>>,
    pub narrated_at: Option<DateTime<Utc>>,
    pub analysis: Option<Analysis>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl RecordPatch {
    /// Patch written by the narration step
    pub fn narration(statement_text: impl Into<String>, audio: Vec<u8>) -> Self {
        Self {
            statement_text: Some(statement_text.into()),
            narration_audio: Some(audio),
            narrated_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Patch written by the analysis step
    pub fn analysis(analysis: Analysis) -> Self {
        Self {
            analysis: Some(analysis),
            analyzed_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Apply set fields onto a record (last write wins per field)
    pub fn apply(self, record: &mut EvidenceRecord) {
        if let Some(text) = self.statement_text {
            record.statement_text = Some(text);
        }
        if let Some(audio) = self.narration_audio {
            record.narration_audio = Some(audio);
        }
        if let Some(at) = self.narrated_at {
            record.narrated_at = Some(at);
        }
        if let Some(analysis) = self.analysis {
            record.analysis = Some(analysis);
        }
        if let Some(at) = self.analyzed_at {
            record.analyzed_at = Some(at);
        }
    }
}

/// Base64 encoding for audio in JSON documents
mod audio_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(audio: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match audio {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
