//! HTTP anchor gateway client.
//!
//! Protocol:
//! - `POST {endpoint}/anchors` with `{"fingerprint", "memo"}` returns
//!   `{"reference"}` once the ledger accepted the write.
//! - `GET {endpoint}/anchors/{reference}` returns
//!   `{"status": "pending" | "confirmed" | "failed"}`.
//!
//! The submission is sent exactly once. Only the status read is repeated
//! until confirmation or the deadline. Every request is bounded by the
//! same deadline, so once a reference exists a timeout always carries it.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, warn};

use super::{AnchorClient, AnchorError};
use crate::core::fingerprint::Fingerprint;

/// Default memo written alongside each fingerprint
pub const DEFAULT_MEMO_PREFIX: &str = "witness:v1";

/// Anchor client for an HTTP ledger gateway
pub struct HttpAnchorClient {
    endpoint: String,
    token: Option<String>,
    memo_prefix: String,
    poll_interval: Duration,
    confirm_timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    fingerprint: &'a str,
    memo: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    reference: String,
}

/// Confirmation status reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum AnchorStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: AnchorStatus,
    #[serde(default)]
    error: Option<String>,
}

impl HttpAnchorClient {
    /// Create a client
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        poll_interval: Duration,
        confirm_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client for anchor gateway")?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
            memo_prefix: DEFAULT_MEMO_PREFIX.to_string(),
            poll_interval,
            confirm_timeout,
            client,
        })
    }

    /// Override the memo written with each fingerprint
    pub fn with_memo_prefix(mut self, memo_prefix: impl Into<String>) -> Self {
        self.memo_prefix = memo_prefix.into();
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Send the one and only write for this fingerprint
    async fn submit(&self, fingerprint: &Fingerprint) -> Result<String, AnchorError> {
        let payload = SubmitRequest {
            fingerprint: &fingerprint.to_hex(),
            memo: format!("{}:{}", self.memo_prefix, fingerprint),
        };

        let response = self
            .authorize(self.client.post(format!("{}/anchors", self.endpoint)))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AnchorError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(AnchorError::Rejected(format!("{}: {}", status, text.trim())));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AnchorError::Unavailable(format!("{}: {}", status, text.trim())));
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| AnchorError::Unavailable(format!("Unreadable submit response: {}", e)))?;

        if body.reference.trim().is_empty() {
            return Err(AnchorError::Rejected("Gateway returned an empty reference".to_string()));
        }

        Ok(body.reference)
    }

    /// Read the confirmation status of a submitted write
    async fn status(&self, reference: &str) -> Result<StatusResponse, String> {
        let response = self
            .authorize(
                self.client
                    .get(format!("{}/anchors/{}", self.endpoint, reference)),
            )
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("status check returned {}", status));
        }

        response.json().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl AnchorClient for HttpAnchorClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn anchor(&self, fingerprint: &Fingerprint) -> Result<String, AnchorError> {
        let started = Instant::now();
        let deadline = started + self.confirm_timeout;

        let reference = match timeout_at(deadline, self.submit(fingerprint)).await {
            Ok(submitted) => submitted?,
            Err(_) => {
                return Err(AnchorError::ConfirmationTimeout {
                    reference: None,
                    waited: started.elapsed(),
                });
            }
        };
        debug!(%reference, "Anchor accepted, awaiting confirmation");

        loop {
            let checked = match timeout_at(deadline, self.status(&reference)).await {
                Ok(checked) => checked,
                Err(_) => {
                    warn!(%reference, "Confirmation check outlived the deadline");
                    return Err(AnchorError::ConfirmationTimeout {
                        reference: Some(reference),
                        waited: started.elapsed(),
                    });
                }
            };

            match checked {
                Ok(StatusResponse {
                    status: AnchorStatus::Confirmed,
                    ..
                }) => return Ok(reference),
                Ok(StatusResponse {
                    status: AnchorStatus::Failed,
                    error,
                }) => {
                    return Err(AnchorError::Rejected(
                        error.unwrap_or_else(|| format!("Ledger write {} failed", reference)),
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(%reference, error = %e, "Confirmation check failed");
                }
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(AnchorError::ConfirmationTimeout {
                    reference: Some(reference),
                    waited: started.elapsed(),
                });
            }
            sleep(self.poll_interval).await;
        }
    }
}
