//! Chat-completions analysis client.
//!
//! Endpoint: POST {endpoint}/chat/completions
//! Auth: Bearer token
//!
//! The model is told to answer with JSON only; this client hands back the
//! message content untouched and leaves shape validation to
//! `Analysis::from_response`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AnalysisClient, ServiceError};
use crate::config::AnalysisSettings;

/// System instruction sent with every statement
pub const ANALYSIS_INSTRUCTION: &str = r#"Given this incident statement, return ONLY valid JSON in this exact format with no extra text:
{
  "incidentType": "police | workplace | housing | other",
  "urgency": 1,
  "extractedEntities": ["example entity"],
  "formalReport": "Detailed 3 paragraph legal-style incident report"
}"#;

/// Analysis client for an OpenAI-compatible chat API
pub struct ChatAnalysisClient {
    endpoint: String,
    model: String,
    api_key_env: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatAnalysisClient {
    /// Create from resolved settings; the API key is read from the
    /// environment variable the settings name
    pub fn from_settings(settings: &AnalysisSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client for analysis")?;

        Ok(Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key_env: settings.api_key_env.clone(),
            api_key: std::env::var(&settings.api_key_env).ok().filter(|k| !k.is_empty()),
            client,
        })
    }

    fn request<'a>(&'a self, text: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: [
                ChatMessage {
                    role: "system",
                    content: ANALYSIS_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        }
    }
}

/// Pull the first choice's message content out of a completion body
fn extract_content(body: &str) -> Result<String, ServiceError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::Malformed(format!("unreadable completion: {}", e)))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| ServiceError::Malformed("completion has no message content".to_string()))
}

#[async_trait]
impl AnalysisClient for ChatAnalysisClient {
    fn name(&self) -> &str {
        "chat"
    }

    async fn analyze(&self, text: &str) -> Result<String, ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::EmptyInput);
        }

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ServiceError::Unavailable(format!("{} is not set", self.api_key_env)))?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&self.request(text))
            .send()
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(ServiceError::Unavailable(format!("{}: {}", status, body.trim())));
        }

        extract_content(&body)
    }
}
