/*!
 * Remote collaborators for speech-to-text and voice separation.
 *
 * This module contains the capability traits and their implementations:
 * - OpenAI: OpenAI transcription models and compatible custom endpoints
 * - Separation: custom voice isolation endpoint
 * - Mock: scripted providers for tests
 *
 * Providers are looked up by name once per job through `ProviderRegistry`.
 */

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::Config;
use crate::errors::ProviderError;

pub mod openai;
pub mod separation;
pub mod mock;

// @const: Models served by the OpenAI transcription endpoint
pub const OPENAI_TRANSCRIPTION_MODELS: &[&str] = &["gpt-4o-transcribe", "gpt-4o-mini-transcribe", "whisper-1"];

// @const: Name of user-configured endpoints
pub const CUSTOM_PROVIDER: &str = "custom";

/// Every transcription model name the registry can know about
pub fn known_transcription_models() -> Vec<&'static str> {
    let mut models = OPENAI_TRANSCRIPTION_MODELS.to_vec();
    models.push(CUSTOM_PROVIDER);
    models
}

/// Speech-to-text capability
#[async_trait]
pub trait Transcriber: Send + Sync + Debug {
    /// Transcribe one audio clip
    ///
    /// # Arguments
    /// * `clip` - Audio file to upload
    /// * `language` - ISO code of the spoken language, may be empty
    /// * `timeout` - Budget for the whole call
    async fn transcribe(&self, clip: &Path, language: &str, timeout: Duration) -> Result<String, ProviderError>;

    /// Model name, used in dubtitle file names
    fn model_name(&self) -> &str;
}

/// Voice isolation capability
#[async_trait]
pub trait VoiceSeparator: Send + Sync + Debug {
    /// Return the isolated voice track of `audio` encoded as `output_format`
    async fn separate(&self, audio: &Path, output_format: &str, timeout: Duration) -> Result<Bytes, ProviderError>;

    fn name(&self) -> &str;
}

/// Name-keyed lookup of providers
#[derive(Debug, Default, Clone)]
pub struct ProviderRegistry {
    transcribers: HashMap<String, Arc<dyn Transcriber>>,
    separators: HashMap<String, Arc<dyn VoiceSeparator>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in providers configured in `config`
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        let stt = &config.transcription;

        if !stt.api_key.is_empty() {
            for model in OPENAI_TRANSCRIPTION_MODELS {
                registry.register_transcriber(
                    *model,
                    Arc::new(openai::OpenAITranscriber::new(
                        *model,
                        openai::OPENAI_TRANSCRIPTION_URL,
                        Some(stt.api_key.clone()),
                        stt.initial_prompt.clone(),
                    )),
                );
            }
        }

        if !stt.endpoint.is_empty() && stt.endpoint != openai::OPENAI_TRANSCRIPTION_URL {
            let api_key = (!stt.api_key.is_empty()).then(|| stt.api_key.clone());
            registry.register_transcriber(
                CUSTOM_PROVIDER,
                Arc::new(openai::OpenAITranscriber::new(
                    stt.custom_model.clone(),
                    stt.endpoint.clone(),
                    api_key,
                    stt.initial_prompt.clone(),
                )),
            );
        }

        let sep = &config.separation;
        if !sep.endpoint.is_empty() {
            let api_key = (!sep.api_key.is_empty()).then(|| sep.api_key.clone());
            let name = match sep.provider.trim() {
                "" => CUSTOM_PROVIDER,
                name => name,
            };
            registry.register_separator(
                name,
                Arc::new(separation::CustomSeparator::new(sep.endpoint.clone(), api_key)),
            );
        }

        registry
    }

    pub fn register_transcriber(&mut self, name: impl Into<String>, transcriber: Arc<dyn Transcriber>) {
        self.transcribers.insert(name.into(), transcriber);
    }

    pub fn register_separator(&mut self, name: impl Into<String>, separator: Arc<dyn VoiceSeparator>) {
        self.separators.insert(name.into(), separator);
    }

    /// Resolve a transcriber by model name
    pub fn transcriber(&self, name: &str) -> Result<Arc<dyn Transcriber>, ProviderError> {
        self.transcribers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(format!("transcription model '{}'", name)))
    }

    /// Resolve a voice separator by provider name
    pub fn separator(&self, name: &str) -> Result<Arc<dyn VoiceSeparator>, ProviderError> {
        self.separators
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(format!("separation provider '{}'", name)))
    }
}

/// Map a reqwest failure onto the provider error kinds
pub(crate) fn map_request_error(error: reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout.as_secs())
    } else {
        ProviderError::RequestFailed(error.to_string())
    }
}

/// Turn a non-success response into an `ApiError` or `AuthenticationError`
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await
        .unwrap_or_else(|_| "Failed to get error response text".to_string());

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ProviderError::AuthenticationError(message));
    }

    Err(ProviderError::ApiError {
        status_code: status.as_u16(),
        message,
    })
}
