/*!
 * Media collaborator: clip, frame and condensed audio extraction.
 *
 * The engine only talks to the `MediaCollaborator` trait. `FfmpegMedia`
 * implements it on top of `ffmpeg` / `ffprobe` subprocesses. Every artifact
 * request fails with `MediaError::AlreadyExists` when the target file is
 * already on disk, which is what the resumption logic keys on.
 */

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use async_trait::async_trait;
use log::{debug, error, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;

use crate::errors::MediaError;
use crate::subtitle_processor::path_position;

// @const: Still frame bounding box
pub const FRAME_WIDTH: u32 = 1000;
pub const FRAME_HEIGHT: u32 = 562;

// @const: stderr fragments that mark a media file as unreadable
static CORRUPTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"Invalid data found when processing input",
        r"Error while decoding stream",
        r"could not find codec parameters",
        r"Failed to open input",
        r"Invalid header",
        r"error reading header",
        r"Invalid NAL",
        r"Error splitting the input into NAL units",
        r"Sample size \d+ is too large",
        r"Invalid sample size",
        r"moov atom not found",
        r"Invalid chunk offset",
        r"Error while decoding frame",
        r"broken frame",
        r"Invalid index",
        r"invalid frame size",
        r"Invalid data found",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Audio container produced by an extraction or conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Ogg,
    Wav,
    Mp3,
    M4a,
    Opus,
    Flac,
}

impl AudioFormat {
    // @returns: File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Ogg => "ogg",
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Opus => "opus",
            Self::Flac => "flac",
        }
    }

    /// ffmpeg codec arguments used when converting to this format
    pub fn codec_args(&self) -> Vec<&'static str> {
        match self {
            Self::M4a => vec!["-acodec", "aac", "-b:a", "192k"],
            Self::Opus | Self::Ogg => vec!["-acodec", "libopus", "-b:a", "112k"],
            Self::Flac => vec!["-acodec", "flac"],
            Self::Wav => vec!["-acodec", "pcm_s16le"],
            Self::Mp3 => vec!["-acodec", "libmp3lame", "-b:a", "192k"],
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ogg" => Ok(Self::Ogg),
            "wav" => Ok(Self::Wav),
            "mp3" => Ok(Self::Mp3),
            "m4a" | "aac" => Ok(Self::M4a),
            "opus" => Ok(Self::Opus),
            "flac" => Ok(Self::Flac),
            other => Err(format!("Unknown audio format: {}", other)),
        }
    }
}

/// One audio clip to cut out of a media file
#[derive(Debug, Clone)]
pub struct AudioRequest<'a> {
    pub format: AudioFormat,
    /// Relative audio stream index (`0:a:N`)
    pub track: usize,
    /// Padding applied on both sides of the span
    pub offset_ms: u64,
    pub start_ms: u64,
    pub end_ms: u64,
    pub media: &'a Path,
    /// Artifact prefix, the file name is derived from it
    pub prefix: &'a Path,
}

impl AudioRequest<'_> {
    // @returns: Path of the clip this request produces
    pub fn output_path(&self) -> PathBuf {
        artifact_path(self.prefix, self.start_ms, self.end_ms, self.format.extension())
    }
}

/// One still frame to take out of a media file
#[derive(Debug, Clone)]
pub struct ImageRequest<'a> {
    pub start_ms: u64,
    pub end_ms: u64,
    pub media: &'a Path,
    pub prefix: &'a Path,
    /// Compute the path and existence only, never encode
    pub dry_run: bool,
}

impl ImageRequest<'_> {
    // @returns: Path of the frame this request produces
    pub fn output_path(&self) -> PathBuf {
        artifact_path(self.prefix, self.start_ms, self.end_ms, "avif")
    }
}

/// Audio stream metadata reported by ffprobe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrackInfo {
    /// Relative audio stream index
    pub index: usize,
    pub language: Option<String>,
    pub channels: u32,
    pub title: Option<String>,
}

/// `<prefix>_<start>-<end>.<ext>`
pub fn artifact_path(prefix: &Path, start_ms: u64, end_ms: u64, ext: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!("_{}-{}.{}", path_position(start_ms), path_position(end_ms), ext));
    PathBuf::from(name)
}

/// Seek position understood by ffmpeg (`<secs>.<millis>`)
pub fn ffmpeg_position(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

/// Pick an audio track: language and channel count first, then language alone, then the first track
pub fn select_audio_track(tracks: &[AudioTrackInfo], language: &str, channels: u32) -> Option<usize> {
    let lang_matches = |t: &&AudioTrackInfo| {
        t.language
            .as_deref()
            .map(|l| crate::language_utils::language_codes_match(l, language))
            .unwrap_or(false)
    };

    tracks
        .iter()
        .filter(lang_matches)
        .find(|t| t.channels == channels)
        .or_else(|| tracks.iter().find(lang_matches))
        .or_else(|| tracks.first())
        .map(|t| t.index)
}

/// Whether ffmpeg stderr reports a damaged input
pub fn stderr_reports_corruption(stderr: &str) -> bool {
    CORRUPTION_PATTERNS.iter().any(|p| p.is_match(stderr))
}

/// Operations the engine needs from a media toolchain
#[async_trait]
pub trait MediaCollaborator: Send + Sync + fmt::Debug {
    /// Cut an audio clip. Fails with `AlreadyExists` if the clip is on disk.
    async fn extract_audio(&self, request: &AudioRequest<'_>) -> Result<PathBuf, MediaError>;

    /// Take a still frame at the middle of the span. Fails with `AlreadyExists` if the frame is on disk.
    async fn extract_image(&self, request: &ImageRequest<'_>) -> Result<PathBuf, MediaError>;

    /// Probe a media file, `Ok(false)` means corrupted
    async fn check_integrity(&self, media: &Path) -> Result<bool, MediaError>;

    /// List the audio streams of a media file
    async fn probe_audio_tracks(&self, media: &Path) -> Result<Vec<AudioTrackInfo>, MediaError>;

    /// Concatenate wav fragments, in order, into one file of the output's format
    async fn concat_audio(&self, fragments: &[PathBuf], output: &Path) -> Result<(), MediaError>;

    /// Extract a whole audio track, used as voice separation input
    async fn extract_full_audio(&self, media: &Path, track: usize, output: &Path) -> Result<(), MediaError>;
}

// @struct: ffmpeg-backed media collaborator
#[derive(Debug, Clone)]
pub struct FfmpegMedia {
    // @field: ffmpeg binary
    ffmpeg_path: String,

    // @field: ffprobe binary
    ffprobe_path: String,

    // @field: Per-process time budget
    timeout: Duration,
}

impl FfmpegMedia {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            timeout,
        }
    }

    /// Run ffmpeg with the standard flags and a timeout
    async fn ffmpeg(&self, args: Vec<String>) -> Result<(), MediaError> {
        let mut full_args = vec!["-loglevel".to_string(), "error".to_string()];
        full_args.extend(args);
        full_args.push("-hide_banner".to_string());
        full_args.push("-y".to_string());

        debug!("Running {} {}", self.ffmpeg_path, full_args.join(" "));
        let ffmpeg_future = Command::new(&self.ffmpeg_path)
            .args(&full_args)
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            result = ffmpeg_future => {
                result.map_err(|e| MediaError::Spawn {
                    program: self.ffmpeg_path.clone(),
                    message: e.to_string(),
                })?
            },
            _ = tokio::time::sleep(self.timeout) => {
                return Err(MediaError::Timeout(format!("ffmpeg after {}s", self.timeout.as_secs())));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let filtered = filter_ffmpeg_stderr(&stderr);
            error!("ffmpeg failed: {}", filtered);
            return Err(MediaError::CommandFailed(filtered));
        }

        Ok(())
    }

    async fn ffprobe_json(&self, media: &Path) -> Result<Value, MediaError> {
        let ffprobe_future = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_streams", "-select_streams", "a"])
            .arg(media)
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            result = ffprobe_future => {
                result.map_err(|e| MediaError::Spawn {
                    program: self.ffprobe_path.clone(),
                    message: e.to_string(),
                })?
            },
            _ = tokio::time::sleep(self.timeout) => {
                return Err(MediaError::Timeout(format!("ffprobe after {}s", self.timeout.as_secs())));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::CommandFailed(format!("ffprobe failed: {}", stderr.trim())));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&stdout)
            .map_err(|e| MediaError::CommandFailed(format!("Failed to parse ffprobe JSON output: {}", e)))
    }
}

#[async_trait]
impl MediaCollaborator for FfmpegMedia {
    async fn extract_audio(&self, request: &AudioRequest<'_>) -> Result<PathBuf, MediaError> {
        let out = request.output_path();
        if out.exists() {
            return Err(MediaError::AlreadyExists(out));
        }

        let start = request.start_ms.saturating_sub(request.offset_ms);
        let end = request.end_ms + request.offset_ms;

        // -to before -i gives frame-accurate cuts
        let mut args = vec![
            "-ss".to_string(), ffmpeg_position(start),
            "-to".to_string(), ffmpeg_position(end),
            "-i".to_string(), request.media.to_string_lossy().to_string(),
            "-map".to_string(), format!("0:a:{}", request.track),
            "-filter:a".to_string(), "volume=10dB".to_string(),
            "-vn".to_string(),
        ];
        if request.format == AudioFormat::Ogg {
            args.extend(["-acodec", "libopus", "-b:a", "96k"].iter().map(|s| s.to_string()));
        }
        args.push(out.to_string_lossy().to_string());

        self.ffmpeg(args).await?;
        Ok(out)
    }

    async fn extract_image(&self, request: &ImageRequest<'_>) -> Result<PathBuf, MediaError> {
        let out = request.output_path();
        if out.exists() {
            return Err(MediaError::AlreadyExists(out));
        }
        if request.dry_run {
            return Ok(out);
        }

        let frame_at = if request.end_ms > request.start_ms {
            request.start_ms + (request.end_ms - request.start_ms) / 2
        } else {
            request.start_ms
        };

        let mut args = vec![
            "-ss".to_string(), ffmpeg_position(frame_at),
            "-i".to_string(), request.media.to_string_lossy().to_string(),
        ];
        if request.end_ms > frame_at {
            args.push("-t".to_string());
            args.push(ffmpeg_position(request.end_ms - frame_at));
        }
        args.extend([
            "-vf".to_string(), format!("scale={}:{}", FRAME_WIDTH, FRAME_HEIGHT),
            "-c:v".to_string(), "libaom-av1".to_string(),
            "-frames".to_string(), "1".to_string(),
            out.to_string_lossy().to_string(),
        ]);

        self.ffmpeg(args).await?;
        Ok(out)
    }

    async fn check_integrity(&self, media: &Path) -> Result<bool, MediaError> {
        let probe_future = Command::new(&self.ffmpeg_path)
            .args(["-loglevel", "error", "-i"])
            .arg(media)
            .args(["-t", "0", "-f", "null", "-"])
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            result = probe_future => {
                result.map_err(|e| MediaError::Spawn {
                    program: self.ffmpeg_path.clone(),
                    message: e.to_string(),
                })?
            },
            _ = tokio::time::sleep(self.timeout) => {
                return Err(MediaError::Timeout(format!("integrity probe of {:?}", media)));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr_reports_corruption(&stderr) {
            warn!("Integrity probe of {:?} failed: {}", media, stderr.trim());
            return Ok(false);
        }
        if !output.status.success() {
            return Err(MediaError::CommandFailed(filter_ffmpeg_stderr(&stderr)));
        }

        Ok(true)
    }

    async fn probe_audio_tracks(&self, media: &Path) -> Result<Vec<AudioTrackInfo>, MediaError> {
        let json = self.ffprobe_json(media).await?;
        let mut tracks = Vec::new();

        if let Some(streams) = json.get("streams").and_then(|s| s.as_array()) {
            for (index, stream) in streams.iter().enumerate() {
                let channels = stream.get("channels")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32)
                    .unwrap_or(0);

                let language = stream.get("tags")
                    .and_then(|t| t.get("language"))
                    .and_then(|l| l.as_str())
                    .map(|s| s.to_string());

                let title = stream.get("tags")
                    .and_then(|t| t.get("title"))
                    .and_then(|l| l.as_str())
                    .map(|s| s.to_string());

                tracks.push(AudioTrackInfo { index, language, channels, title });
            }
        }

        debug!("Found {} audio tracks in {:?}", tracks.len(), media);
        Ok(tracks)
    }

    async fn concat_audio(&self, fragments: &[PathBuf], output: &Path) -> Result<(), MediaError> {
        let list = tempfile::Builder::new()
            .prefix("ffmpeg_concat_")
            .suffix(".txt")
            .tempfile()?;

        let content: String = fragments
            .iter()
            .map(|f| format!("file '{}'\n", f.to_string_lossy()))
            .collect();
        std::fs::write(list.path(), content)?;

        let mut intermediate = output.as_os_str().to_os_string();
        intermediate.push(".concatenated.wav");
        let intermediate = PathBuf::from(intermediate);

        self.ffmpeg(vec![
            "-f".to_string(), "concat".to_string(),
            "-safe".to_string(), "0".to_string(),
            "-i".to_string(), list.path().to_string_lossy().to_string(),
            "-c".to_string(), "copy".to_string(),
            intermediate.to_string_lossy().to_string(),
        ])
        .await?;

        let format = output
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse::<AudioFormat>().ok())
            .unwrap_or(AudioFormat::Mp3);

        let mut args = vec!["-i".to_string(), intermediate.to_string_lossy().to_string()];
        args.extend(format.codec_args().into_iter().map(String::from));
        args.push(output.to_string_lossy().to_string());
        let converted = self.ffmpeg(args).await;

        if let Err(e) = std::fs::remove_file(&intermediate) {
            warn!("Could not remove {:?}: {}", intermediate, e);
        }
        converted
    }

    async fn extract_full_audio(&self, media: &Path, track: usize, output: &Path) -> Result<(), MediaError> {
        if output.exists() {
            return Err(MediaError::AlreadyExists(output.to_path_buf()));
        }

        let format = output
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse::<AudioFormat>().ok())
            .unwrap_or(AudioFormat::Flac);

        let mut args = vec![
            "-i".to_string(), media.to_string_lossy().to_string(),
            "-map".to_string(), format!("0:a:{}", track),
            "-vn".to_string(),
        ];
        args.extend(format.codec_args().into_iter().map(String::from));
        args.push(output.to_string_lossy().to_string());

        self.ffmpeg(args).await
    }
}

/// Filter ffmpeg stderr to only show meaningful error lines, stripping the
/// version banner, build configuration, and stream metadata noise.
pub fn filter_ffmpeg_stderr(stderr: &str) -> String {
    let dominated_prefixes = [
        "ffmpeg version",
        "  built with",
        "  configuration:",
        "  lib",
        "Input #",
        "  Metadata:",
        "  Duration:",
        "  Stream #",
        "      Metadata:",
        "Output #",
        "Stream mapping:",
        "Press [q]",
    ];

    let meaningful: Vec<&str> = stderr
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !dominated_prefixes.iter().any(|p| line.starts_with(p) || trimmed.starts_with(p))
        })
        .collect();

    if meaningful.is_empty() {
        "unknown ffmpeg error (stderr was empty after filtering)".to_string()
    } else {
        meaningful.join("\n")
    }
}
