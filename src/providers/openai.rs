use std::path::Path;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, error};
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client};
use serde::Deserialize;

use crate::errors::ProviderError;
use crate::providers::{check_status, map_request_error, Transcriber};

// @const: OpenAI audio transcription endpoint
pub const OPENAI_TRANSCRIPTION_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Transcription response, `{"text": "..."}`
#[derive(Debug, Deserialize)]
pub struct TranscriptionResponse {
    /// Transcribed text
    pub text: String,
}

/// Client for OpenAI transcription and OpenAI-compatible servers
/// (whisper.cpp server, faster-whisper and similar)
#[derive(Debug, Clone)]
pub struct OpenAITranscriber {
    /// HTTP client for API requests
    client: Client,
    /// Model sent in the form, may be empty for custom servers
    model: String,
    /// Full URL of the transcription route
    endpoint: String,
    /// Bearer token, if the server wants one
    api_key: Option<String>,
    /// Context prompt sent with every clip
    initial_prompt: String,
}

impl OpenAITranscriber {
    pub fn new(
        model: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        initial_prompt: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::builder()
                .build()
                .unwrap_or_default(),
            model: model.into(),
            endpoint: endpoint.into(),
            api_key,
            initial_prompt: initial_prompt.into(),
        }
    }

    async fn build_form(&self, clip: &Path, language: &str) -> Result<Form, ProviderError> {
        let content = tokio::fs::read(clip)
            .await
            .map_err(|e| ProviderError::RequestFailed(format!("couldn't open audio file {:?}: {}", clip, e)))?;

        let file_part = Part::bytes(content).file_name(
            clip.file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned(),
        );

        let mut form = Form::new();
        if !self.model.is_empty() {
            form = form.text("model", self.model.clone());
        }
        if !language.is_empty() {
            form = form.text("language", language.to_string());
        }
        if !self.initial_prompt.is_empty() {
            form = form.text("prompt", self.initial_prompt.clone());
        }
        Ok(form.part("file", file_part))
    }
}

#[async_trait]
impl Transcriber for OpenAITranscriber {
    async fn transcribe(&self, clip: &Path, language: &str, timeout: Duration) -> Result<String, ProviderError> {
        let form = self.build_form(clip, language).await?;

        let mut request = self.client
            .post(&self.endpoint)
            .timeout(timeout)
            .multipart(form);
        if let Some(api_key) = &self.api_key {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", api_key));
        }

        debug!("Requesting {} transcription of {:?}", self.model, clip);
        let response = request
            .send()
            .await
            .map_err(|e| map_request_error(e, timeout))?;

        let response = check_status(response).await.inspect_err(|e| {
            error!("Transcription API error: {}", e);
        })?;

        let parsed = response.json::<TranscriptionResponse>().await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(parsed.text.trim().to_string())
    }

    fn model_name(&self) -> &str {
        if self.model.is_empty() { crate::providers::CUSTOM_PROVIDER } else { &self.model }
    }
}
