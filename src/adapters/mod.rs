//! Capability interfaces for external systems.
//!
//! The orchestrator talks to the ledger, the narration engine and the
//! analysis engine only through these traits, one operation each, so the
//! pipeline can run against real providers or deterministic fakes.
//! None of the implementations retry on their own.

pub mod analysis;
pub mod journal;
pub mod ledger;
pub mod narration;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::config::{AnchorSettings, ResolvedConfig};
use crate::core::fingerprint::Fingerprint;

pub use analysis::{ChatAnalysisClient, ANALYSIS_INSTRUCTION};
pub use journal::{JournalError, JournalLedger, LedgerEntry};
pub use ledger::HttpAnchorClient;
pub use narration::HttpNarrationClient;

/// Failure to anchor a fingerprint
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnchorError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Ledger rejected submission: {0}")]
    Rejected(String),

    #[error("Anchor not confirmed within {waited:?}")]
    ConfirmationTimeout {
        /// Reference of the accepted-but-unconfirmed write, if one was issued
        reference: Option<String>,
        waited: Duration,
    },
}

/// Failure of a narration or analysis call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Empty input")]
    EmptyInput,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Writes fingerprints to an immutable ledger
#[async_trait]
pub trait AnchorClient: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Submit the fingerprint and block until the write is confirmed.
    ///
    /// Returns the ledger reference. Each call is a new irreversible
    /// ledger write.
    async fn anchor(&self, fingerprint: &Fingerprint) -> Result<String, AnchorError>;
}

/// Renders statement text to audio
#[async_trait]
pub trait NarrationClient: Send + Sync {
    fn name(&self) -> &str;

    /// Convert text to audio bytes
    async fn narrate(&self, text: &str) -> Result<Vec<u8>, ServiceError>;
}

/// Produces a structured analysis of statement text
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    fn name(&self) -> &str;

    /// Return the raw structured response; callers validate its shape
    async fn analyze(&self, text: &str) -> Result<String, ServiceError>;
}

/// Build the configured anchor backend
pub fn anchor_from_config(config: &ResolvedConfig) -> Result<Arc<dyn AnchorClient>> {
    let client: Arc<dyn AnchorClient> = match &config.anchor {
        AnchorSettings::Journal { path, memo_prefix } => {
            Arc::new(JournalLedger::new(path.clone()).with_memo_prefix(memo_prefix.clone()))
        }
        AnchorSettings::Http {
            endpoint,
            token_env,
            poll_interval_ms,
            memo_prefix,
        } => {
            let token = token_env.as_deref().and_then(|name| std::env::var(name).ok());
            Arc::new(
                HttpAnchorClient::new(
                    endpoint.clone(),
                    token,
                    Duration::from_millis(*poll_interval_ms),
                    config.limits.anchor_timeout(),
                )?
                .with_memo_prefix(memo_prefix.clone()),
            )
        }
    };
    Ok(client)
}

/// Build the configured narration backend
pub fn narration_from_config(config: &ResolvedConfig) -> Result<Arc<dyn NarrationClient>> {
    Ok(Arc::new(HttpNarrationClient::from_settings(&config.narration)?))
}

/// Build the configured analysis backend
pub fn analysis_from_config(config: &ResolvedConfig) -> Result<Arc<dyn AnalysisClient>> {
    Ok(Arc::new(ChatAnalysisClient::from_settings(&config.analysis)?))
}
