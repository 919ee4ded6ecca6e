//! HTTP API over the sealing orchestrator.
//!
//! Routes:
//! - `GET  /`                 liveness text
//! - `POST /api/submit`       raw artifact bytes, seals a new record
//! - `POST /api/voice`        `{record_id, text}`, attaches narration
//! - `POST /api/analyze`      `{record_id, text}`, attaches analysis
//! - `GET  /api/vault/{id}`   full evidence record
//! - `POST /api/verify/{id}`  raw artifact bytes, checked against the record
//!
//! Possession of a record id is the only credential. CORS is open so a
//! browser client on another origin can call the API.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection},
        DefaultBodyLimit, Json, Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::core::fingerprint::Fingerprint;
use crate::core::orchestrator::{ErrorKind, Orchestrator, SealError};
use crate::core::verify::{verify_record, VerificationReport};
use crate::domain::{Analysis, EvidenceRecord, RecordId, Step};

/// JSON error body: `{error, step, record_id, message}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    record_id: Option<RecordId>,
    message: String,
}

impl ApiError {
    fn not_found(step: Step, raw_id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorBody {
                error: ErrorKind::RecordNotFound.to_string(),
                step: Some(step),
                record_id: None,
                message: format!("Evidence not found: {}", raw_id),
            },
        }
    }

    /// A request the extractors could not accept
    fn invalid_request(step: Step, message: String) -> Self {
        Self {
            status: status_for(ErrorKind::Validation),
            body: ErrorBody {
                error: ErrorKind::Validation.to_string(),
                step: Some(step),
                record_id: None,
                message,
            },
        }
    }
}

impl From<(Step, JsonRejection)> for ApiError {
    fn from((step, rejection): (Step, JsonRejection)) -> Self {
        Self::invalid_request(step, rejection.body_text())
    }
}

impl From<(Step, BytesRejection)> for ApiError {
    fn from((step, rejection): (Step, BytesRejection)) -> Self {
        Self::invalid_request(step, rejection.body_text())
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::RecordNotFound => StatusCode::NOT_FOUND,
        ErrorKind::Rejected | ErrorKind::MalformedResponse => StatusCode::BAD_GATEWAY,
        ErrorKind::Transport => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ConfirmationTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<SealError> for ApiError {
    fn from(err: SealError) -> Self {
        let kind = err.kind();
        Self {
            status: status_for(kind),
            body: ErrorBody {
                error: kind.to_string(),
                step: Some(err.step()),
                record_id: err.record_id(),
                message: err.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Parse a path or body id; anything unparseable cannot name a record
fn parse_id(step: Step, raw: &str) -> Result<RecordId, ApiError> {
    raw.trim().parse().map_err(|_| ApiError::not_found(step, raw))
}

#[derive(Debug, Deserialize)]
pub struct StatementRequest {
    pub record_id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: String,
    pub record_id: RecordId,
    pub fingerprint: Fingerprint,
    pub anchor_reference: String,
    pub sealed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct VoiceResponse {
    pub record_id: RecordId,
    pub audio_base64: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub message: String,
    pub record_id: RecordId,
    pub analysis: Analysis,
}

/// Build the API router
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let body_limit = usize::try_from(orchestrator.limits().max_artifact_bytes).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(index))
        .route("/api/submit", post(submit))
        .route("/api/voice", post(voice))
        .route("/api/analyze", post(analyze))
        .route("/api/vault/{id}", get(vault))
        .route("/api/verify/{id}", post(verify))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(orchestrator)
}

/// Bind and serve until the process is stopped
pub async fn serve(orchestrator: Arc<Orchestrator>, address: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    info!(%address, anchor = orchestrator.anchor_backend(), "Witness API listening");
    axum::serve(listener, router(orchestrator))
        .await
        .context("Server terminated")?;

    Ok(())
}

async fn index() -> &'static str {
    "Witness API Running"
}

async fn submit(
    State(orchestrator): State<Arc<Orchestrator>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let body = body.map_err(|e| (Step::Fingerprint, e))?;
    let record = orchestrator.submit(&body).await?;

    Ok(Json(SubmitResponse {
        message: "Sealed to ledger".to_string(),
        record_id: record.id,
        fingerprint: record.fingerprint,
        anchor_reference: record.anchor_reference,
        sealed_at: record.sealed_at,
    }))
}

async fn voice(
    State(orchestrator): State<Arc<Orchestrator>>,
    request: Result<Json<StatementRequest>, JsonRejection>,
) -> Result<Json<VoiceResponse>, ApiError> {
    let Json(request) = request.map_err(|e| (Step::Narrate, e))?;
    let id = parse_id(Step::Narrate, &request.record_id)?;
    let record = orchestrator.attach_narration(id, &request.text).await?;

    Ok(Json(VoiceResponse {
        record_id: record.id,
        audio_base64: STANDARD.encode(record.narration_audio.unwrap_or_default()),
    }))
}

async fn analyze(
    State(orchestrator): State<Arc<Orchestrator>>,
    request: Result<Json<StatementRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = request.map_err(|e| (Step::Analyze, e))?;
    let id = parse_id(Step::Analyze, &request.record_id)?;
    let record = orchestrator.attach_analysis(id, &request.text).await?;

    let response = match record.analysis {
        Some(analysis) => Json(AnalyzeResponse {
            message: "Analysis complete".to_string(),
            record_id: record.id,
            analysis,
        })
        .into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    Ok(response)
}

async fn vault(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(raw_id): Path<String>,
) -> Result<Json<EvidenceRecord>, ApiError> {
    let id = parse_id(Step::Fetch, &raw_id)?;
    Ok(Json(orchestrator.fetch(id).await?))
}

async fn verify(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(raw_id): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<VerificationReport>, ApiError> {
    let id = parse_id(Step::Fetch, &raw_id)?;
    let body = body.map_err(|e| (Step::Fingerprint, e))?;
    let record = orchestrator.fetch(id).await?;

    verify_record(&body, &record).map(Json).map_err(|e| ApiError {
        status: StatusCode::CONFLICT,
        body: ErrorBody {
            error: "unsealed".to_string(),
            step: Some(Step::Fetch),
            record_id: Some(id),
            message: e.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::RecordNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::MalformedResponse), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::Transport), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorKind::ConfirmationTimeout), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_malformed_id_is_not_found() {
        let err = parse_id(Step::Fetch, "not-a-uuid").unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.body.error, "record_not_found");
    }
}
