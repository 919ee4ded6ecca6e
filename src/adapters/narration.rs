//! Text-to-speech client.
//!
//! Endpoint: POST {endpoint}/v1/text-to-speech/{voice_id}
//! Auth: `xi-api-key` header
//! Response: audio bytes (mpeg)

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use super::{NarrationClient, ServiceError};
use crate::config::NarrationSettings;

/// Narration client for an ElevenLabs-compatible speech API
pub struct HttpNarrationClient {
    endpoint: String,
    voice_id: String,
    model_id: String,
    api_key_env: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

impl HttpNarrationClient {
    /// Create from resolved settings; the API key is read from the
    /// environment variable the settings name
    pub fn from_settings(settings: &NarrationSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client for narration")?;

        Ok(Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            voice_id: settings.voice_id.clone(),
            model_id: settings.model_id.clone(),
            api_key_env: settings.api_key_env.clone(),
            api_key: std::env::var(&settings.api_key_env).ok().filter(|k| !k.is_empty()),
            client,
        })
    }

    fn speech_url(&self) -> String {
        format!("{}/v1/text-to-speech/{}", self.endpoint, self.voice_id)
    }
}

#[async_trait]
impl NarrationClient for HttpNarrationClient {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn narrate(&self, text: &str) -> Result<Vec<u8>, ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::EmptyInput);
        }

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ServiceError::Unavailable(format!("{} is not set", self.api_key_env)))?;

        let response = self
            .client
            .post(self.speech_url())
            .header("xi-api-key", api_key)
            .header("Accept", "audio/mpeg")
            .json(&SpeechRequest {
                text,
                model_id: &self.model_id,
            })
            .send()
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Unavailable(format!("{}: {}", status, body.trim())));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        if audio.is_empty() {
            return Err(ServiceError::Malformed("empty audio body".to_string()));
        }

        Ok(audio.to_vec())
    }
}
