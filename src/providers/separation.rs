use std::path::Path;
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error};
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client};

use crate::errors::ProviderError;
use crate::providers::{check_status, map_request_error, VoiceSeparator};

/// Client for a user-configured voice isolation endpoint.
///
/// The endpoint takes a multipart POST with an `audio` file field and an
/// optional `output_format` field, and answers with the raw audio bytes.
#[derive(Debug, Clone)]
pub struct CustomSeparator {
    /// HTTP client for API requests
    client: Client,
    /// Full URL of the separation route
    endpoint: String,
    /// Bearer token, if the server wants one
    api_key: Option<String>,
}

impl CustomSeparator {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl VoiceSeparator for CustomSeparator {
    async fn separate(&self, audio: &Path, output_format: &str, timeout: Duration) -> Result<Bytes, ProviderError> {
        let content = tokio::fs::read(audio)
            .await
            .map_err(|e| ProviderError::RequestFailed(format!("couldn't open audio file {:?}: {}", audio, e)))?;

        let audio_part = Part::bytes(content).file_name(
            audio.file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned(),
        );

        let mut form = Form::new();
        if !output_format.is_empty() {
            form = form.text("output_format", output_format.to_string());
        }
        let form = form.part("audio", audio_part);

        let mut request = self.client
            .post(&self.endpoint)
            .timeout(timeout)
            .multipart(form);
        if let Some(api_key) = &self.api_key {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", api_key));
        }

        debug!("Uploading {:?} for voice separation", audio);
        let response = request
            .send()
            .await
            .map_err(|e| map_request_error(e, timeout))?;

        let response = check_status(response).await.inspect_err(|e| {
            error!("Voice separation API error: {}", e);
        })?;

        let body = response.bytes().await
            .map_err(|e| map_request_error(e, timeout))?;

        if body.is_empty() {
            return Err(ProviderError::ParseError("voice separation returned no audio".to_string()));
        }
        Ok(body)
    }

    fn name(&self) -> &str {
        crate::providers::CUSTOM_PROVIDER
    }
}
