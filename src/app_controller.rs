use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::autosub;
use crate::errors::JobError;
use crate::file_utils::FileManager;
use crate::job::{Job, JobSettings, Mode, RunContext};
use crate::media::select_audio_track;
use crate::output::OutputSequencer;
use crate::providers::{known_transcription_models, VoiceSeparator};
use crate::worker_pool::{PoolReport, WorkerPool};

// @module: Bulk scheduling and per-job orchestration

/// Jobs discovered under an input path, ready to run
#[derive(Debug, Default)]
pub struct RoutePlan {
    /// Resolved jobs in discovery order
    pub jobs: Vec<Job>,
    /// Sum of the line counts of every job
    pub total_lines: usize,
    /// Candidates excluded by the integrity probe
    pub corrupted: usize,
    /// Candidates whose resolution failed
    pub failed: usize,
}

/// What one job produced
#[derive(Debug)]
pub struct JobReport {
    pub media: PathBuf,
    /// Records in the record file after the job
    pub records: usize,
    /// Separated voice track written by this job
    pub voices: Option<PathBuf>,
    /// Worker pool statistics, absent for audio-only jobs
    pub pool: Option<PoolReport>,
}

/// Totals of a whole run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Drives jobs from discovery to finalized output
pub struct Controller {
    // @field: Settings shared by every job
    settings: Arc<JobSettings>,

    // @field: Collaborators and run-wide flags
    ctx: RunContext,

    // @field: Pool reused for every job
    pool: WorkerPool,
}

impl Controller {
    // @creates: Controller for the given settings and collaborators
    pub fn new(settings: JobSettings, ctx: RunContext) -> Self {
        let pool = WorkerPool::new(settings.workers);
        Self {
            settings: Arc::new(settings),
            ctx,
            pool,
        }
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Discover and resolve the jobs under `path`.
    ///
    /// A file becomes one job. A directory is walked recursively, skipping
    /// artifact directories. Corrupted media and jobs that fail to resolve
    /// are logged and left out.
    pub async fn route(&self, path: &Path) -> Result<RoutePlan> {
        if !path.exists() {
            return Err(anyhow!("Input path does not exist: {:?}", path));
        }

        let candidates = if path.is_dir() {
            FileManager::find_media_files(path)?
        } else {
            vec![path.to_path_buf()]
        };
        debug!("Found {} media candidates under {:?}", candidates.len(), path);

        let models = known_transcription_models();
        let mut plan = RoutePlan::default();

        for media in candidates {
            if self.ctx.cancel.is_cancelled() {
                break;
            }

            let name = FileManager::file_name_string(&media);
            match self.ctx.media.check_integrity(&media).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Skipping corrupted media file: {}", name);
                    plan.corrupted += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Skipping {}, integrity probe failed: {}", name, e);
                    plan.corrupted += 1;
                    continue;
                }
            }

            let mut job = Job::new(&media, Arc::clone(&self.settings));
            let resolved = autosub::resolve(&mut job, &models).and_then(|_| job.load_tracks());
            match resolved {
                Ok(lines) => {
                    plan.total_lines += lines;
                    plan.jobs.push(job);
                }
                Err(e) => {
                    error!("{}: {}", name, e);
                    plan.failed += 1;
                }
            }
        }

        Ok(plan)
    }

    /// Route `path` and run every job in discovery order
    pub async fn run(&self, path: &Path) -> Result<RunSummary> {
        if self.settings.mode == Mode::Translit {
            return Err(JobError::UnsupportedMode(self.settings.mode.to_string()).into());
        }

        let start_time = Instant::now();
        let plan = self.route(path).await?;
        let mut summary = RunSummary {
            skipped: plan.corrupted,
            failed: plan.failed,
            ..Default::default()
        };

        let job_count = plan.jobs.len();
        let overall = self.overall_bar(plan.total_lines as u64);

        for (index, job) in plan.jobs.into_iter().enumerate() {
            if self.ctx.cancel.is_cancelled() {
                summary.skipped += job_count - index;
                break;
            }

            let name = FileManager::file_name_string(&job.media);
            let lines = job.line_count() as u64;
            overall.set_message(name.clone());

            match self.run_job(job).await {
                Ok(report) => {
                    summary.processed += 1;
                    debug!("{}: {} records", name, report.records);
                }
                Err(e) => {
                    if matches!(e.downcast_ref::<JobError>(), Some(JobError::Declined)) {
                        warn!("Skipped {}", name);
                        summary.skipped += 1;
                    } else {
                        error!("Error processing file {}: {:#}", name, e);
                        summary.failed += 1;
                    }
                }
            }
            overall.inc(lines);
        }

        overall.finish_and_clear();
        info!(
            "Processing completed: {} processed, {} skipped, {} errors in {}",
            summary.processed,
            summary.skipped,
            summary.failed,
            Self::format_duration(start_time.elapsed())
        );

        Ok(summary)
    }

    /// Run one resolved job end to end
    pub async fn run_job(&self, mut job: Job) -> Result<JobReport> {
        let layout = job.layout();
        let media_dir = layout.media_dir();
        FileManager::ensure_dir(&media_dir).map_err(|e| JobError::OutputDirectory {
            path: media_dir.clone(),
            message: format!("{:#}", e),
        })?;

        self.pick_audio_track(&mut job).await;

        if job.is_cc_or_dub && job.wants_transcription() && !self.ctx.assume_yes {
            let question = format!(
                "The reference subtitles of {} already match the audio closely. Transcribe anyway?",
                FileManager::file_name_string(&job.media)
            );
            if !self.confirm(question).await? {
                return Err(JobError::Declined.into());
            }
        }

        let mut voices = None;
        if let Some(provider) = &self.settings.separation_provider {
            let separator = self.ctx.providers.separator(provider).map_err(JobError::from)?;
            match self.separate_voices(&job, separator.as_ref()).await {
                Ok(path) => voices = path,
                Err(e) if self.settings.mode == Mode::Enhance => return Err(e),
                Err(e) => warn!("Voice separation failed, continuing without it: {:#}", e),
            }
        }

        if self.settings.mode == Mode::Enhance {
            if self.settings.separation_provider.is_none() {
                warn!("Enhance mode without a separation provider has nothing to do");
            }
            return Ok(JobReport { media: job.media, records: 0, voices, pool: None });
        }

        let job = Arc::new(job);
        let mut pool = self.pool.supervise(Arc::clone(&job), &self.ctx).await?;

        let sequencer = OutputSequencer::new(&job, Arc::clone(&self.ctx.media));
        let items = std::mem::take(&mut pool.items);
        let records = sequencer
            .finalize(items, job.target_track.as_deref(), !pool.cancelled)
            .await
            .with_context(|| format!("Failed to write output of {:?}", job.media))?;

        if pool.failed > 0 {
            warn!("{} lines of {} had errors", pool.failed, FileManager::file_name_string(&job.media));
        }
        info!("Success: {}", sequencer.record_path().display());

        Ok(JobReport { media: job.media.clone(), records, voices, pool: Some(pool) })
    }

    // @creates: Audio stream of the job, best matching the target language and
    // channel count unless set explicitly, along with its language tag
    async fn pick_audio_track(&self, job: &mut Job) {
        let tracks = match self.ctx.media.probe_audio_tracks(&job.media).await {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!("Couldn't probe audio tracks, using track {}: {}", job.audio_track, e);
                return;
            }
        };

        if self.settings.audio_track.is_none() {
            let language = job.target_lang.as_ref().map(|l| l.code.clone()).unwrap_or_default();
            job.audio_track = select_audio_track(&tracks, &language, self.settings.target_channels).unwrap_or(0);
        }
        job.audio_language = tracks
            .iter()
            .find(|t| t.index == job.audio_track)
            .and_then(|t| t.language.clone());
        debug!("Audio track {} ({})", job.audio_track, job.audio_language.as_deref().unwrap_or("unknown language"));
    }

    /// Isolate the voices of the job's audio track into `<prefix>.VOICES.<ext>`
    async fn separate_voices(&self, job: &Job, separator: &dyn VoiceSeparator) -> Result<Option<PathBuf>> {
        let format = self.settings.separation_format;
        let output = job.layout().voices_path(format.extension());
        if FileManager::file_exists(&output) {
            info!("Voice track already exists: {}", output.display());
            return Ok(None);
        }

        let workdir = tempfile::tempdir().context("Failed to create a working directory")?;
        let full_audio = workdir.path().join(format!("full.{}", format.extension()));
        self.ctx
            .media
            .extract_full_audio(&job.media, job.audio_track, &full_audio)
            .await
            .context("Failed to extract the audio track")?;

        info!("Separating voices with {}", separator.name());
        let voices = separator
            .separate(&full_audio, format.extension(), self.settings.separation_timeout)
            .await
            .map_err(JobError::from)?;

        tokio::fs::write(&output, &voices)
            .await
            .with_context(|| format!("Failed to write {:?}", output))?;
        info!("Voice track written to {}", output.display());
        Ok(Some(output))
    }

    /// Ask a yes/no question on the terminal
    async fn confirm(&self, question: String) -> Result<bool> {
        let progress = self.ctx.progress.clone();
        let answer = tokio::task::spawn_blocking(move || {
            progress.suspend(|| -> std::io::Result<String> {
                let mut stderr = std::io::stderr();
                write!(stderr, "{} [y/N] ", question)?;
                stderr.flush()?;
                let mut line = String::new();
                std::io::stdin().read_line(&mut line)?;
                Ok(line)
            })
        })
        .await
        .context("Prompt task failed")?
        .context("Failed to read the answer")?;

        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }

    fn overall_bar(&self, total_lines: u64) -> ProgressBar {
        if self.ctx.quiet {
            return ProgressBar::hidden();
        }

        let bar = self.ctx.progress.add(ProgressBar::new(total_lines));
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} total ({percent}%) {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("█▓▒░"));
        bar
    }

    // Format duration in a human-readable format (HH:MM:SS)
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
