/*!
 * Error types for the subs2study engine.
 *
 * Library-level error kinds are defined with thiserror. Application code
 * propagates them through anyhow with added context.
 */

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when talking to transcription or separation providers
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// The call did not complete within the job's timeout
    #[error("Provider call timed out after {0}s")]
    Timeout(u64),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// No provider is registered under this name
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

/// Errors raised by the media collaborator
#[derive(Error, Debug)]
pub enum MediaError {
    /// The artifact is already on disk; the resumption signal
    #[error("Artifact already exists: {0:?}")]
    AlreadyExists(PathBuf),

    /// The ffmpeg/ffprobe process ran but reported a failure
    #[error("ffmpeg failed: {0}")]
    CommandFailed(String),

    /// The process could not be spawned
    #[error("Failed to spawn {program}: {message}")]
    Spawn {
        /// Program that could not be run
        program: String,
        /// Underlying error message
        message: String,
    },

    /// The process exceeded its time budget
    #[error("{0} timed out")]
    Timeout(String),

    /// Filesystem error around an artifact
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    // @returns: True for the "already exists" resumption signal
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Setup-phase errors that abort a single job; bulk mode moves on to the next one
#[derive(Error, Debug)]
pub enum JobError {
    /// No subtitle file in the target language was found next to the media
    #[error("No subtitle file in {language} was found for {media:?}")]
    NoTargetSubtitle {
        /// Media file being resolved
        media: PathBuf,
        /// Display name of the target language
        language: String,
    },

    /// Card generation was requested without any way to find a reference subtitle
    #[error("No reference subtitle or reference language given for card generation")]
    NoReferenceSource,

    /// The target subtitle could not be opened or parsed
    #[error("Cannot open target subtitle {path:?}: {message}")]
    TargetSubtitle {
        /// Subtitle file path
        path: PathBuf,
        /// Underlying error message
        message: String,
    },

    /// The artifact directory could not be created
    #[error("Cannot create output directory {path:?}: {message}")]
    OutputDirectory {
        /// Directory path
        path: PathBuf,
        /// Underlying error message
        message: String,
    },

    /// The media file failed the integrity probe
    #[error("Media file is corrupted: {0:?}")]
    Corrupted(PathBuf),

    /// The requested mode is handled outside this engine
    #[error("Mode '{0}' is not handled by this engine")]
    UnsupportedMode(String),

    /// The user declined the advisory prompt
    #[error("Job cancelled by user")]
    Declined,

    /// A provider could not be resolved for this job
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}
