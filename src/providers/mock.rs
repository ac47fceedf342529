/*!
 * Mock provider implementations for testing.
 *
 * This module provides mock providers that simulate different behaviors:
 * - `MockTranscriber::working()` - Always succeeds with a marked transcription
 * - `MockTranscriber::intermittent(n)` - Fails every nth request
 * - `MockTranscriber::failing()` - Always fails with an error
 * - `MockSeparator::working()` - Returns a fixed voice track
 */

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{Transcriber, VoiceSeparator};

/// Behavior mode for the mock providers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Always fails with an error
    Failing,
    /// Returns empty response
    Empty,
    /// Simulates slow response (for timeout testing)
    Slow { delay_ms: u64 },
}

/// Mock transcriber for testing dubtitle and card behavior
#[derive(Debug)]
pub struct MockTranscriber {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter, shared between clones
    request_count: Arc<AtomicUsize>,
    /// Calls currently running, shared between clones
    in_flight: Arc<AtomicUsize>,
    /// Highest number of calls seen running at once
    peak_in_flight: Arc<AtomicUsize>,
    /// Language code of every request, in arrival order
    languages: Arc<Mutex<Vec<String>>>,
}

impl MockTranscriber {
    /// Create a new mock transcriber with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            languages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a working mock transcriber that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create an intermittently failing mock transcriber
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every })
    }

    /// Create a failing mock transcriber that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a slow mock transcriber
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Highest concurrency observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Languages requested so far
    pub fn requested_languages(&self) -> Vec<String> {
        self.languages.lock().clone()
    }

    /// Text returned for a clip
    pub fn transcription_for(clip: &Path, language: &str) -> String {
        let stem = clip.file_stem().unwrap_or_default().to_string_lossy();
        format!("[TRANSCRIBED:{}] {}", language, stem)
    }

    async fn respond(&self, clip: &Path, language: &str, timeout: Duration) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.languages.lock().push(language.to_string());

        match self.behavior {
            MockBehavior::Working => Ok(Self::transcription_for(clip, language)),

            MockBehavior::Intermittent { fail_every } => {
                if count % fail_every == fail_every - 1 {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                        status_code: 503,
                    })
                } else {
                    Ok(Self::transcription_for(clip, language))
                }
            }

            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),

            MockBehavior::Empty => Ok(String::new()),

            MockBehavior::Slow { delay_ms } => {
                let delay = Duration::from_millis(delay_ms);
                if delay > timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(ProviderError::Timeout(timeout.as_secs()));
                }
                tokio::time::sleep(delay).await;
                Ok(Self::transcription_for(clip, language))
            }
        }
    }
}

impl Clone for MockTranscriber {
    fn clone(&self) -> Self {
        Self {
            behavior: self.behavior,
            request_count: Arc::clone(&self.request_count),
            in_flight: Arc::clone(&self.in_flight),
            peak_in_flight: Arc::clone(&self.peak_in_flight),
            languages: Arc::clone(&self.languages),
        }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, clip: &Path, language: &str, timeout: Duration) -> Result<String, ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = self.respond(clip, language, timeout).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn model_name(&self) -> &str {
        "whisper-1"
    }
}

/// Mock voice separator for testing
#[derive(Debug, Clone)]
pub struct MockSeparator {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter, shared between clones
    request_count: Arc<AtomicUsize>,
}

impl MockSeparator {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceSeparator for MockSeparator {
    async fn separate(&self, _audio: &Path, output_format: &str, _timeout: Duration) -> Result<Bytes, ProviderError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        match self.behavior {
            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated separation failure".to_string(),
                status_code: 500,
            }),
            MockBehavior::Empty => Err(ProviderError::ParseError("voice separation returned no audio".to_string())),
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(Bytes::from(format!("VOICES:{}", output_format)))
            }
            _ => Ok(Bytes::from(format!("VOICES:{}", output_format))),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
