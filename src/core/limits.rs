//! Input limits and step timeouts for the sealing pipeline.
//!
//! Inputs are checked before any external service is called, so a
//! violation never costs a ledger write.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Limits applied by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum artifact size in bytes (default: 100MB)
    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: u64,

    /// Maximum statement size in bytes (default: 32KB)
    #[serde(default = "default_max_statement_bytes")]
    pub max_statement_bytes: u64,

    /// Bound on waiting for ledger confirmation (default: 90s)
    #[serde(default = "default_anchor_timeout")]
    pub anchor_timeout_seconds: u64,

    /// Narration call timeout (default: 120s)
    #[serde(default = "default_service_timeout")]
    pub narration_timeout_seconds: u64,

    /// Analysis call timeout (default: 120s)
    #[serde(default = "default_service_timeout")]
    pub analysis_timeout_seconds: u64,
}

fn default_max_artifact_bytes() -> u64 {
    100 * 1024 * 1024
} // 100MB
fn default_max_statement_bytes() -> u64 {
    32 * 1024
} // 32KB
fn default_anchor_timeout() -> u64 {
    90
}
fn default_service_timeout() -> u64 {
    120
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_artifact_bytes: default_max_artifact_bytes(),
            max_statement_bytes: default_max_statement_bytes(),
            anchor_timeout_seconds: default_anchor_timeout(),
            narration_timeout_seconds: default_service_timeout(),
            analysis_timeout_seconds: default_service_timeout(),
        }
    }
}

impl Limits {
    /// Validate an artifact before fingerprinting
    pub fn validate_artifact(&self, artifact: &[u8]) -> Result<(), LimitViolation> {
        if artifact.is_empty() {
            return Err(LimitViolation::EmptyArtifact);
        }

        let size = artifact.len() as u64;
        if size > self.max_artifact_bytes {
            return Err(LimitViolation::ArtifactTooLarge {
                actual: size,
                limit: self.max_artifact_bytes,
            });
        }

        Ok(())
    }

    /// Validate statement text before narration or analysis
    pub fn validate_statement(&self, text: &str) -> Result<(), LimitViolation> {
        if text.trim().is_empty() {
            return Err(LimitViolation::EmptyStatement);
        }

        let size = text.len() as u64;
        if size > self.max_statement_bytes {
            return Err(LimitViolation::StatementTooLarge {
                actual: size,
                limit: self.max_statement_bytes,
            });
        }

        Ok(())
    }

    pub fn anchor_timeout(&self) -> Duration {
        Duration::from_secs(self.anchor_timeout_seconds)
    }

    pub fn narration_timeout(&self) -> Duration {
        Duration::from_secs(self.narration_timeout_seconds)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_seconds)
    }
}

/// Input limit violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitViolation {
    #[error("No artifact provided")]
    EmptyArtifact,

    #[error("Artifact too large: {actual} > {limit} bytes")]
    ArtifactTooLarge { actual: u64, limit: u64 },

    #[error("No statement text provided")]
    EmptyStatement,

    #[error("Statement too large: {actual} > {limit} bytes")]
    StatementTooLarge { actual: u64, limit: u64 },
}
