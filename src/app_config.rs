use anyhow::{anyhow, Context, Result};
use log::{warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::job::Mode;
use crate::language_utils::{parse_language_tags, Lang};
use crate::media::AudioFormat;
use crate::providers::openai::OPENAI_TRANSCRIPTION_URL;
use crate::providers::{CUSTOM_PROVIDER, OPENAI_TRANSCRIPTION_MODELS};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Language tags, target first, then reference languages in preference order
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    /// Processing mode
    #[serde(default)]
    pub mode: Mode,

    /// Worker count, 0 picks logical CPUs minus one
    #[serde(default)]
    pub workers: usize,

    /// Padding added around each audio clip, in milliseconds
    #[serde(default = "default_offset_ms")]
    pub offset_ms: u64,

    /// Audio stream to use, auto-selected when absent
    #[serde(default)]
    pub audio_track: Option<usize>,

    /// Preferred channel count during audio track auto-selection
    #[serde(default = "default_target_channels")]
    pub target_channels: u32,

    /// Field delimiter of the record file
    #[serde(default = "default_field_separator")]
    pub field_separator: String,

    /// Build a condensed audio track from the dialogue fragments
    #[serde(default)]
    pub condensed_audio: bool,

    /// Container of the condensed audio track
    #[serde(default = "default_condensed_audio_format")]
    pub condensed_audio_format: AudioFormat,

    /// Audio-centric processing without still images
    #[serde(default)]
    pub dub_only: bool,

    /// ffmpeg binary
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// ffprobe binary
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    /// Time budget of a single ffmpeg/ffprobe process
    #[serde(default = "default_media_timeout_secs")]
    pub media_timeout_secs: u64,

    /// Speech-to-text settings
    #[serde(default)]
    pub transcription: TranscriptionConfig,

    /// Voice separation settings
    #[serde(default)]
    pub separation: SeparationConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Speech-to-text configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranscriptionConfig {
    // @field: Model name, also selects the provider; empty disables transcription
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "default_transcription_endpoint")]
    pub endpoint: String,

    // @field: Model name sent to a custom endpoint
    #[serde(default = "String::new")]
    pub custom_model: String,

    // @field: Context prompt sent with every clip
    #[serde(default = "String::new")]
    pub initial_prompt: String,

    // @field: Timeout seconds
    #[serde(default = "default_transcription_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Max concurrent requests
    #[serde(default = "default_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

impl TranscriptionConfig {
    // @returns: True when a model is configured
    pub fn is_enabled(&self) -> bool {
        !self.model.trim().is_empty()
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            api_key: String::new(),
            endpoint: default_transcription_endpoint(),
            custom_model: String::new(),
            initial_prompt: String::new(),
            timeout_secs: default_transcription_timeout_secs(),
            max_concurrent_requests: default_concurrent_requests(),
        }
    }
}

/// Voice separation configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SeparationConfig {
    // @field: Provider name; empty disables separation
    #[serde(default = "String::new")]
    pub provider: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Timeout seconds
    #[serde(default = "default_separation_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Audio format requested from the service
    #[serde(default = "default_separation_output_format")]
    pub output_format: AudioFormat,
}

impl SeparationConfig {
    // @returns: True when a provider is configured
    pub fn is_enabled(&self) -> bool {
        !self.provider.trim().is_empty()
    }
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            api_key: String::new(),
            endpoint: String::new(),
            timeout_secs: default_separation_timeout_secs(),
            output_format: default_separation_output_format(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

fn default_languages() -> Vec<String> {
    vec!["ja".to_string(), "en".to_string()]
}

fn default_offset_ms() -> u64 {
    250
}

fn default_target_channels() -> u32 {
    2
}

fn default_field_separator() -> String {
    "\t".to_string()
}

fn default_condensed_audio_format() -> AudioFormat {
    AudioFormat::Mp3
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_media_timeout_secs() -> u64 {
    300
}

fn default_transcription_endpoint() -> String {
    OPENAI_TRANSCRIPTION_URL.to_string()
}

fn default_transcription_timeout_secs() -> u64 {
    90
}

fn default_concurrent_requests() -> usize {
    4
}

fn default_separation_timeout_secs() -> u64 {
    600
}

fn default_separation_output_format() -> AudioFormat {
    AudioFormat::Flac
}

impl Config {
    /// Load the configuration file, creating it with defaults when missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file: {:?}", path))?;
            let reader = BufReader::new(file);
            let config: Config = serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            return Ok(config);
        }

        warn!("Config file not found at {:?}, creating default config.", path);
        let config = Config::default();

        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write default config to file: {:?}", path))?;

        Ok(config)
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        let languages = self.language_list()?;
        if self.mode == Mode::Cards && languages.len() < 2 {
            warn!("No reference language configured, cards will only carry the target text");
        }

        if self.mode == Mode::Dubs && !self.transcription.is_enabled() {
            return Err(anyhow!("Dubs mode needs a transcription model (--stt)"));
        }

        if self.field_separator.is_empty() {
            return Err(anyhow!("Field separator must not be empty"));
        }

        if self.field_separator.contains('"') || self.field_separator.contains('\n') {
            return Err(anyhow!("Field separator must not contain quotes or newlines"));
        }

        if self.transcription.is_enabled() {
            let model = self.transcription.model.as_str();
            if OPENAI_TRANSCRIPTION_MODELS.contains(&model) {
                if self.transcription.api_key.is_empty() {
                    return Err(anyhow!("Transcription API key is required for model {}", model));
                }
            } else if model == CUSTOM_PROVIDER {
                let endpoint = self.transcription.endpoint.as_str();
                if endpoint.is_empty() || endpoint == OPENAI_TRANSCRIPTION_URL {
                    return Err(anyhow!("Custom transcription requires its own endpoint"));
                }
            } else {
                return Err(anyhow!("Unknown transcription model: {}", model));
            }

            if self.transcription.max_concurrent_requests == 0 {
                return Err(anyhow!("transcription.max_concurrent_requests must be at least 1"));
            }
        }

        if self.separation.is_enabled() && self.separation.endpoint.is_empty() {
            return Err(anyhow!("Voice separation provider '{}' requires an endpoint", self.separation.provider));
        }

        Ok(())
    }

    /// Parsed preference list, target language first
    pub fn language_list(&self) -> Result<Vec<Lang>> {
        parse_language_tags(&self.languages)
            .context("Invalid language list")
    }

    /// Worker count actually used by the pool
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            languages: default_languages(),
            mode: Mode::default(),
            workers: 0,
            offset_ms: default_offset_ms(),
            audio_track: None,
            target_channels: default_target_channels(),
            field_separator: default_field_separator(),
            condensed_audio: false,
            condensed_audio_format: default_condensed_audio_format(),
            dub_only: false,
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            media_timeout_secs: default_media_timeout_secs(),
            transcription: TranscriptionConfig::default(),
            separation: SeparationConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
