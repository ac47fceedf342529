/*!
 * Per-line extraction.
 *
 * `LineExtractor::process` turns one subtitle line into a `ProcessedItem`:
 * aligned reference text, a still image, the audio clip(s) and an optional
 * transcription. Every call yields exactly one `ItemOutcome`; collaborator
 * failures degrade the item but never drop it.
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{debug, error, trace, warn};
use tokio::sync::Semaphore;

use crate::errors::{JobError, MediaError};
use crate::file_utils::FileManager;
use crate::job::Job;
use crate::media::{AudioFormat, AudioRequest, ImageRequest, MediaCollaborator};
use crate::providers::Transcriber;
use crate::subtitle_processor::{join_lines, SubtitleItem, SubtitleTrack};

/// One output record and its chronological key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedItem {
    /// Line start in ms, the sort key
    pub start_ms: u64,

    /// Artifacts were found from an earlier run
    pub already_done: bool,

    pub sound: String,
    pub time: String,
    pub source: String,
    pub image: String,
    pub target_current: String,
    pub reference_current: String,
    pub target_previous: String,
    pub reference_previous: String,
    pub target_next: String,
    pub reference_next: String,
}

impl ProcessedItem {
    /// The ten record fields, in file order
    pub fn record_fields(&self) -> [&str; 10] {
        [
            &self.sound,
            &self.time,
            &self.source,
            &self.image,
            &self.target_current,
            &self.reference_current,
            &self.target_previous,
            &self.reference_previous,
            &self.target_next,
            &self.reference_next,
        ]
    }

    /// Rebuild an item from a parsed record; None when the time field is unreadable
    pub fn from_record(fields: Vec<String>) -> Option<Self> {
        let mut fields = fields.into_iter();
        let mut next = || fields.next().unwrap_or_default();

        let sound = next();
        let time = next();
        let start_ms = crate::subtitle_processor::parse_timestamp(&time).ok()?;

        Some(Self {
            start_ms,
            already_done: true,
            sound,
            time,
            source: next(),
            image: next(),
            target_current: next(),
            reference_current: next(),
            target_previous: next(),
            reference_previous: next(),
            target_next: next(),
            reference_next: next(),
        })
    }
}

/// What a worker reports for one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Processed during this run
    Done(ProcessedItem),
    /// Artifacts were already on disk
    AlreadyDone(ProcessedItem),
    /// Processed with at least one collaborator failure
    Failed(ProcessedItem),
}

impl ItemOutcome {
    pub fn item(&self) -> &ProcessedItem {
        match self {
            Self::Done(item) | Self::AlreadyDone(item) | Self::Failed(item) => item,
        }
    }

    pub fn into_item(self) -> ProcessedItem {
        match self {
            Self::Done(item) | Self::AlreadyDone(item) | Self::Failed(item) => item,
        }
    }
}

fn sound_field(path: &Path) -> String {
    format!("[sound:{}]", FileManager::file_name_string(path))
}

fn image_field(path: &Path) -> String {
    format!("<img src=\"{}\">", FileManager::file_name_string(path))
}

/// Shared per-job state used by every worker
#[derive(Debug, Clone)]
pub struct LineExtractor {
    job: Arc<Job>,
    target: Arc<SubtitleTrack>,
    reference: Option<Arc<SubtitleTrack>>,
    media: Arc<dyn MediaCollaborator>,
    transcriber: Option<Arc<dyn Transcriber>>,
    remote_permits: Arc<Semaphore>,
    prefix: PathBuf,
    source: String,
}

impl LineExtractor {
    pub fn new(
        job: Arc<Job>,
        media: Arc<dyn MediaCollaborator>,
        transcriber: Option<Arc<dyn Transcriber>>,
        remote_permits: Arc<Semaphore>,
    ) -> Result<Self, JobError> {
        let target = job.target_track.clone().ok_or_else(|| JobError::NoTargetSubtitle {
            media: job.media.clone(),
            language: job.target_lang.as_ref().map(|l| l.name()).unwrap_or_default(),
        })?;
        let layout = job.layout();

        Ok(Self {
            reference: job.reference_track.clone(),
            target,
            media,
            transcriber,
            remote_permits,
            prefix: layout.media_prefix(),
            source: layout.source_label(),
            job,
        })
    }

    pub fn line_count(&self) -> usize {
        self.target.len()
    }

    pub fn line(&self, index: usize) -> Option<&SubtitleItem> {
        self.target.items.get(index)
    }

    fn audio_request(&self, line: &SubtitleItem, format: AudioFormat, offset_ms: u64) -> AudioRequest<'_> {
        AudioRequest {
            format,
            track: self.job.audio_track,
            offset_ms,
            start_ms: line.start_ms,
            end_ms: line.end_ms,
            media: self.job.media_path(),
            prefix: &self.prefix,
        }
    }

    /// Process the line at `index` of the target track
    pub async fn process(&self, index: usize) -> ItemOutcome {
        let Some(line) = self.line(index) else {
            error!("Line index {} is out of range", index);
            return ItemOutcome::Failed(ProcessedItem::default());
        };

        let mut item = ProcessedItem {
            start_ms: line.start_ms,
            time: line.time_key(),
            source: self.source.clone(),
            target_current: line.joined_text(),
            ..Default::default()
        };
        if let Some(reference) = &self.reference {
            item.reference_current = reference.overlapping_text(line.start_ms, line.end_ms);
        }
        self.fill_neighbours(index, &mut item);

        let mut degraded = false;

        // The image is the most expensive artifact, its presence proves the line was done
        let image_request = ImageRequest {
            start_ms: line.start_ms,
            end_ms: line.end_ms,
            media: self.job.media_path(),
            prefix: &self.prefix,
            dry_run: !self.job.encodes_images(),
        };
        match self.media.extract_image(&image_request).await {
            Ok(path) => {
                if self.job.encodes_images() {
                    item.image = image_field(&path);
                }
            }
            Err(MediaError::AlreadyExists(path)) => {
                item.image = image_field(&path);
                item.already_done = true;
            }
            Err(e) => {
                error!("Can't extract image at {}: {}", item.time, e);
                degraded = true;
            }
        }

        if item.already_done {
            if self.job.wants_audio_clip() {
                let clip = self.audio_request(line, AudioFormat::Ogg, self.job.settings.offset_ms).output_path();
                item.sound = sound_field(&clip);
            }
            trace!("Line {} already processed", item.time);
            return ItemOutcome::AlreadyDone(item);
        }

        let mut clip = None;
        if self.job.wants_audio_clip() {
            let request = self.audio_request(line, AudioFormat::Ogg, self.job.settings.offset_ms);
            match self.media.extract_audio(&request).await {
                Ok(path) | Err(MediaError::AlreadyExists(path)) => {
                    item.sound = sound_field(&path);
                    clip = Some(path);
                }
                Err(e) => {
                    error!("Can't extract audio clip at {}: {}", item.time, e);
                    degraded = true;
                }
            }
        }

        if self.job.wants_condensed_fragment() {
            // No padding, adjacent fragments would overlap in the condensed track
            let request = self.audio_request(line, AudioFormat::Wav, 0);
            match self.media.extract_audio(&request).await {
                Ok(_) | Err(MediaError::AlreadyExists(_)) => {}
                Err(e) => {
                    error!("Can't extract audio fragment at {}: {}", item.time, e);
                    degraded = true;
                }
            }
        }

        if let (Some(transcriber), Some(clip)) = (&self.transcriber, clip.as_deref()) {
            if !self.transcribe_into(transcriber.as_ref(), clip, &mut item).await {
                degraded = true;
            }
        }

        if degraded {
            ItemOutcome::Failed(item)
        } else {
            ItemOutcome::Done(item)
        }
    }

    async fn transcribe_into(&self, transcriber: &dyn Transcriber, clip: &Path, item: &mut ProcessedItem) -> bool {
        let Ok(_permit) = self.remote_permits.acquire().await else {
            warn!("Transcription skipped at {}: request limiter closed", item.time);
            return false;
        };

        let timeout = self.job.settings.transcription_timeout;
        let language = self.job.transcription_language();
        debug!("Requesting {} transcription at {}", transcriber.model_name(), item.time);

        match tokio::time::timeout(timeout, transcriber.transcribe(clip, &language, timeout)).await {
            Ok(Ok(text)) => {
                item.target_current = join_lines(&[text]);
                true
            }
            Ok(Err(e)) => {
                warn!("Transcription failed at {}, keeping subtitle text: {}", item.time, e);
                false
            }
            Err(_) => {
                warn!("Transcription timed out at {} after {}s, keeping subtitle text", item.time, timeout.as_secs());
                false
            }
        }
    }

    fn fill_neighbours(&self, index: usize, item: &mut ProcessedItem) {
        let target = &self.target.items;
        if index > 0 {
            if let Some(prev) = target.get(index - 1) {
                item.target_previous = prev.joined_text();
            }
        }
        if let Some(next) = target.get(index + 1) {
            item.target_next = next.joined_text();
        }

        if let Some(reference) = &self.reference {
            if index > 0 {
                if let Some(prev) = reference.items.get(index - 1) {
                    item.reference_previous = prev.joined_text();
                }
            }
            if let Some(next) = reference.items.get(index + 1) {
                item.reference_next = next.joined_text();
            }
        }
    }
}
