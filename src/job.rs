/*!
 * Job model: one media file bound to its target and reference subtitles.
 *
 * `JobSettings` is derived once from the configuration and shared by every
 * job of a run. A `Job` is resolved by `autosub`, loaded with `load_tracks`,
 * then handed to the worker pool. `RunContext` carries the collaborators and
 * the cancellation flag for the whole run.
 */

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use indicatif::MultiProgress;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::app_config::Config;
use crate::errors::JobError;
use crate::file_utils::OutputLayout;
use crate::language_utils::Lang;
use crate::media::{AudioFormat, MediaCollaborator};
use crate::providers::ProviderRegistry;
use crate::subtitle_processor::SubtitleTrack;

/// What a job produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Study cards: clip, image and aligned text per line
    #[default]
    Cards,
    /// Dubtitles: transcribed text per line
    Dubs,
    /// Transliteration, handled by a separate tool
    Translit,
    /// Voice enhancement only, no per-line work
    Enhance,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cards => "cards",
            Self::Dubs => "dubs",
            Self::Translit => "translit",
            Self::Enhance => "enhance",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cards" | "subs2cards" => Ok(Self::Cards),
            "dubs" | "subs2dubs" => Ok(Self::Dubs),
            "translit" => Ok(Self::Translit),
            "enhance" => Ok(Self::Enhance),
            _ => Err(anyhow::anyhow!("Invalid mode: {}", s)),
        }
    }
}

/// Settings shared by every job of a run
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Preference list, index 0 is the target language
    pub languages: Vec<Lang>,
    pub mode: Mode,
    pub workers: usize,
    pub offset_ms: u64,
    pub audio_track: Option<usize>,
    pub target_channels: u32,
    pub field_separator: String,
    pub condensed_audio: bool,
    pub condensed_audio_format: AudioFormat,
    pub dub_only: bool,

    /// Transcription model, None when transcription is off
    pub transcription_model: Option<String>,
    pub transcription_timeout: Duration,
    pub initial_prompt: String,
    /// Cap on transcription calls running at once
    pub max_concurrent_requests: usize,

    /// Separation provider, None when separation is off
    pub separation_provider: Option<String>,
    pub separation_timeout: Duration,
    pub separation_format: AudioFormat,

    /// Subtitle files given explicitly, bypassing auto-selection
    pub explicit_target: Option<PathBuf>,
    pub explicit_reference: Option<PathBuf>,
}

impl JobSettings {
    // @creates: Settings from a validated config
    pub fn from_config(config: &Config) -> Result<Self> {
        let non_empty = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };

        Ok(Self {
            languages: config.language_list()?,
            mode: config.mode,
            workers: config.worker_count(),
            offset_ms: config.offset_ms,
            audio_track: config.audio_track,
            target_channels: config.target_channels,
            field_separator: config.field_separator.clone(),
            condensed_audio: config.condensed_audio,
            condensed_audio_format: config.condensed_audio_format,
            dub_only: config.dub_only,
            transcription_model: non_empty(&config.transcription.model),
            transcription_timeout: Duration::from_secs(config.transcription.timeout_secs),
            initial_prompt: config.transcription.initial_prompt.clone(),
            max_concurrent_requests: config.transcription.max_concurrent_requests.max(1),
            separation_provider: non_empty(&config.separation.provider),
            separation_timeout: Duration::from_secs(config.separation.timeout_secs),
            separation_format: config.separation.output_format,
            explicit_target: None,
            explicit_reference: None,
        })
    }

    // @returns: Settings with explicit subtitle files
    pub fn with_subtitles(mut self, target: Option<PathBuf>, reference: Option<PathBuf>) -> Self {
        self.explicit_target = target;
        self.explicit_reference = reference;
        self
    }

    // @returns: Target language, the head of the preference list
    pub fn target_language(&self) -> Option<&Lang> {
        self.languages.first()
    }

    // @returns: Reference languages in preference order
    pub fn reference_languages(&self) -> &[Lang] {
        self.languages.get(1..).unwrap_or(&[])
    }
}

/// One media file and the subtitles resolved for it
#[derive(Debug, Clone)]
pub struct Job {
    pub media: PathBuf,
    pub settings: Arc<JobSettings>,

    pub target_lang: Option<Lang>,
    pub reference_lang: Option<Lang>,
    pub target_subtitle: Option<PathBuf>,
    pub reference_subtitle: Option<PathBuf>,

    /// The winning reference file is closed captions or dub-matched
    pub is_cc_or_dub: bool,

    /// Relative audio stream index used for clips
    pub audio_track: usize,

    /// Language tag of that stream, when the container declares one
    pub audio_language: Option<String>,

    pub target_track: Option<Arc<SubtitleTrack>>,
    pub reference_track: Option<Arc<SubtitleTrack>>,
}

impl Job {
    pub fn new(media: impl Into<PathBuf>, settings: Arc<JobSettings>) -> Self {
        let audio_track = settings.audio_track.unwrap_or(0);
        Self {
            media: media.into(),
            target_lang: settings.target_language().cloned(),
            settings,
            reference_lang: None,
            target_subtitle: None,
            reference_subtitle: None,
            is_cc_or_dub: false,
            audio_track,
            audio_language: None,
            target_track: None,
            reference_track: None,
        }
    }

    /// Open and normalize the resolved subtitles, returning the line count.
    ///
    /// Closed-caption targets lose their bracketed annotations here, so the
    /// returned count is what the pool will dispatch.
    pub fn load_tracks(&mut self) -> Result<usize, JobError> {
        let Some(target_path) = self.target_subtitle.clone() else {
            return Ok(0);
        };

        let mut target = SubtitleTrack::load(&target_path).map_err(|e| JobError::TargetSubtitle {
            path: target_path.clone(),
            message: format!("{:#}", e),
        })?;

        if SubtitleTrack::is_closed_caption_file(&target_path) {
            target.trim_cc_annotations();
        }
        let count = target.len();
        self.target_track = Some(Arc::new(target));

        if let Some(reference_path) = self.reference_subtitle.clone() {
            match SubtitleTrack::load(&reference_path) {
                Ok(reference) => self.reference_track = Some(Arc::new(reference)),
                Err(e) => log::warn!("Reference subtitle {:?} ignored: {:#}", reference_path, e),
            }
        }

        debug!("Job {:?} has {} lines", self.media, count);
        Ok(count)
    }

    // @returns: Number of lines the pool will see
    pub fn line_count(&self) -> usize {
        self.target_track.as_ref().map(|t| t.len()).unwrap_or(0)
    }

    // @returns: Output layout of this job
    pub fn layout(&self) -> OutputLayout {
        OutputLayout::new(&self.media, self.target_subtitle.as_deref(), &self.settings.field_separator)
    }

    pub fn media_path(&self) -> &Path {
        &self.media
    }

    pub fn wants_transcription(&self) -> bool {
        self.settings.transcription_model.is_some()
    }

    /// Padded clip requested for cards or as transcription input
    pub fn wants_audio_clip(&self) -> bool {
        self.settings.mode == Mode::Cards || self.wants_transcription()
    }

    /// Untrimmed fragment requested for the condensed track
    pub fn wants_condensed_fragment(&self) -> bool {
        self.settings.condensed_audio && !self.settings.dub_only
    }

    /// Images are only encoded for cards; other modes only check for them
    pub fn encodes_images(&self) -> bool {
        self.settings.mode == Mode::Cards && !self.settings.dub_only
    }

    // @returns: Language code sent to the transcriber, the audio stream's own tag first
    pub fn transcription_language(&self) -> String {
        self.audio_language
            .as_deref()
            .filter(|tag| !tag.eq_ignore_ascii_case("und"))
            .and_then(|tag| Lang::parse(tag).ok())
            .or_else(|| self.target_lang.clone())
            .map(|l| l.short_code())
            .unwrap_or_default()
    }
}

/// Shared stop signal, set on Ctrl-C
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Collaborators and run-wide state passed to every job
#[derive(Clone)]
pub struct RunContext {
    pub media: Arc<dyn MediaCollaborator>,
    pub providers: Arc<ProviderRegistry>,
    pub cancel: CancelFlag,
    pub progress: MultiProgress,

    /// Answer yes to advisory prompts
    pub assume_yes: bool,

    /// Hide progress bars
    pub quiet: bool,
}

impl RunContext {
    pub fn new(media: Arc<dyn MediaCollaborator>, providers: Arc<ProviderRegistry>) -> Self {
        Self {
            media,
            providers,
            cancel: CancelFlag::new(),
            progress: MultiProgress::new(),
            assume_yes: false,
            quiet: false,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("media", &self.media)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("assume_yes", &self.assume_yes)
            .finish()
    }
}
