/*!
 * # subs2study - study material from subtitled media
 *
 * A Rust library that turns a media file and its subtitles into per-line
 * study material: an audio clip and a still frame per line, the line text
 * aligned with a reference translation, and one record per line in a
 * tab or comma separated file.
 *
 * ## Features
 *
 * - Automatic target/reference subtitle selection from sibling files
 * - BCP-47 style language preferences (`pt-BR`, `zh-Hant`, `de-DE`)
 * - Concurrent per-line extraction with ffmpeg
 * - Resumable runs: finished lines are never redone
 * - Condensed audio tracks, dubtitles from speech-to-text, voice separation
 * - Bulk processing of whole directories
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `app_controller`: Bulk scheduling and per-job orchestration
 * - `autosub`: Automatic subtitle selection
 * - `job`: Job model, shared settings and run context
 * - `worker_pool`: Fan-out/fan-in extraction pool
 * - `extraction`: Per-line extraction
 * - `resumption`: Skipping lines recorded by earlier runs
 * - `output`: Record file, condensed audio and dubtitle writing
 * - `media`: ffmpeg/ffprobe collaborator
 * - `subtitle_processor`: Subtitle parsing and normalization
 * - `language_utils`: Language tags, filename guessing and ranking
 * - `file_utils`: File system operations and output layout
 * - `providers`: Transcription and voice separation clients:
 *   - `providers::openai`: OpenAI-compatible transcription
 *   - `providers::separation`: Custom voice separation endpoint
 *   - `providers::mock`: Scripted providers for tests
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod autosub;
pub mod errors;
pub mod extraction;
pub mod file_utils;
pub mod job;
pub mod language_utils;
pub mod media;
pub mod output;
pub mod providers;
pub mod resumption;
pub mod subtitle_processor;
pub mod worker_pool;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::Controller;
pub use errors::{JobError, MediaError, ProviderError};
pub use extraction::{ItemOutcome, ProcessedItem};
pub use job::{Job, JobSettings, Mode};
pub use language_utils::{is_preferred, language_codes_match, Lang};
pub use subtitle_processor::{SubtitleItem, SubtitleTrack};
