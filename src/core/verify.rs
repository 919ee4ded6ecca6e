//! Independent verification of an artifact against a published fingerprint.
//!
//! Pure functions with no access to the record store: anyone holding the
//! artifact and the published fingerprint can run them. Confirming that
//! the fingerprint was recorded on the ledger at the claimed time is the
//! ledger's job (see `JournalLedger::lookup` for the local backend).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fingerprint::{fingerprint, Fingerprint};
use crate::domain::{EvidenceRecord, RecordId};

/// Outcome of comparing an artifact with a fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Byte-identical to what was sealed
    Match,
    /// At least one bit differs
    Mismatch,
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => f.write_str("MATCH"),
            Self::Mismatch => f.write_str("MISMATCH"),
        }
    }
}

/// Compare local artifact bytes with a published fingerprint.
///
/// Sealed artifacts are never empty, so empty bytes are a mismatch.
pub fn verify(local: &[u8], published: &Fingerprint) -> Verdict {
    match fingerprint(local) {
        Ok(computed) if computed == *published => Verdict::Match,
        _ => Verdict::Mismatch,
    }
}

/// Detailed verification result against a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub verdict: Verdict,
    /// Fingerprint published in the record
    pub expected: Fingerprint,
    /// Fingerprint of the local bytes (absent for empty input)
    pub computed: Option<Fingerprint>,
    /// Ledger reference to confirm the anchor independently
    pub anchor_reference: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Record {0} is not sealed and cannot serve as proof")]
    Unsealed(RecordId),
}

/// Verify local bytes against a sealed record
pub fn verify_record(
    local: &[u8],
    record: &EvidenceRecord,
) -> Result<VerificationReport, VerifyError> {
    let proof = record.proof().ok_or(VerifyError::Unsealed(record.id))?;
    let computed = fingerprint(local).ok();

    let verdict = match computed {
        Some(fp) if fp == proof.fingerprint => Verdict::Match,
        _ => Verdict::Mismatch,
    };

    Ok(VerificationReport {
        verdict,
        expected: proof.fingerprint,
        computed,
        anchor_reference: proof.anchor_reference,
    })
}
