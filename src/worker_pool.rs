/*!
 * Extraction worker pool.
 *
 * One dispatcher feeds line indices in chronological order, consulting the
 * resumption service first. N workers share the dispatch receiver behind an
 * async mutex and report one event per line. A single collector drains the
 * results and owns the progress bar, including its denominator.
 */

use std::sync::Arc;
use std::time::Instant;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, trace, warn};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::errors::JobError;
use crate::extraction::{ItemOutcome, LineExtractor, ProcessedItem};
use crate::job::{CancelFlag, Job, RunContext};
use crate::resumption::{ResumptionHandle, ResumptionService, SeenTimeKeys};

// @struct: What the collector receives for each line
#[derive(Debug)]
enum PoolEvent {
    /// Already in the record file, never dispatched
    Skipped,
    Outcome(ItemOutcome),
}

/// Result of one pool run
#[derive(Debug, Default)]
pub struct PoolReport {
    /// Collected items, in completion order
    pub items: Vec<ProcessedItem>,
    /// Lines processed during this run, failures included
    pub processed: usize,
    /// Lines whose artifacts were already on disk
    pub already_done: usize,
    /// Lines found in the record file and never dispatched
    pub skipped: usize,
    /// Lines processed with a collaborator failure
    pub failed: usize,
    /// Dispatch stopped early on cancellation
    pub cancelled: bool,
}

/// Fan-out/fan-in pool running the per-line extraction of a job
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self { workers: workers.max(1) }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every line of `job` through the workers and collect the results.
    ///
    /// Returns once the collector has drained the results and every worker has exited.
    pub async fn supervise(&self, job: Arc<Job>, ctx: &RunContext) -> Result<PoolReport, JobError> {
        let transcriber = match &job.settings.transcription_model {
            Some(model) => Some(ctx.providers.transcriber(model)?),
            None => None,
        };
        let remote_permits = Arc::new(Semaphore::new(job.settings.max_concurrent_requests));
        let extractor = LineExtractor::new(Arc::clone(&job), Arc::clone(&ctx.media), transcriber, remote_permits)?;

        let line_count = extractor.line_count();
        let time_keys: Vec<String> = (0..line_count)
            .filter_map(|i| extractor.line(i).map(|line| line.time_key()))
            .collect();

        let layout = job.layout();
        let seen = SeenTimeKeys::load(layout.record_path(), &job.settings.field_separator)
            .unwrap_or_else(|e| {
                warn!("Couldn't read existing records, processing every line: {:#}", e);
                SeenTimeKeys::default()
            });
        let (resumption, resumption_task) = ResumptionService::spawn(seen);

        let started = Instant::now();
        let (line_tx, line_rx) = mpsc::channel::<usize>(self.workers);
        let line_rx = Arc::new(Mutex::new(line_rx));
        let (event_tx, mut event_rx) = mpsc::channel::<PoolEvent>(line_count.max(1));

        let dispatcher = Self::spawn_dispatcher(time_keys, resumption, line_tx, event_tx.clone(), ctx.cancel.clone());

        let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let line_rx = Arc::clone(&line_rx);
            let event_tx = event_tx.clone();
            let extractor = extractor.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    let next = { line_rx.lock().await.recv().await };
                    let Some(index) = next else { break };

                    let outcome = extractor.process(index).await;
                    if event_tx.send(PoolEvent::Outcome(outcome)).await.is_err() {
                        break;
                    }
                }
                trace!("Worker {} finished", worker_id);
            }));
        }
        drop(event_tx);

        let progress = Self::progress_bar(ctx, line_count, &layout.output_base);
        let mut report = PoolReport::default();

        while let Some(event) = event_rx.recv().await {
            match event {
                PoolEvent::Skipped => {
                    report.skipped += 1;
                    Self::shrink(&progress);
                }
                PoolEvent::Outcome(ItemOutcome::AlreadyDone(item)) => {
                    report.already_done += 1;
                    Self::shrink(&progress);
                    report.items.push(item);
                }
                PoolEvent::Outcome(ItemOutcome::Failed(item)) => {
                    report.failed += 1;
                    report.processed += 1;
                    progress.inc(1);
                    report.items.push(item);
                }
                PoolEvent::Outcome(ItemOutcome::Done(item)) => {
                    report.processed += 1;
                    progress.inc(1);
                    report.items.push(item);
                }
            }
        }

        match dispatcher.await {
            Ok(cancelled) => report.cancelled = cancelled,
            Err(e) => error!("Dispatcher task failed: {}", e),
        }
        for result in join_all(workers).await {
            if let Err(e) = result {
                error!("Worker task failed: {}", e);
            }
        }
        if let Err(e) = resumption_task.await {
            error!("Resumption service failed: {}", e);
        }

        progress.finish_and_clear();

        if report.skipped + report.already_done > 0 {
            info!(
                "{}: {} lines already done, {} resumed",
                layout.output_base,
                report.skipped + report.already_done,
                report.processed
            );
        }
        debug!(
            "Pool finished {} lines with {} workers in {:.2?}",
            report.items.len(),
            self.workers,
            started.elapsed()
        );

        Ok(report)
    }

    // @returns: Dispatcher task, true when it stopped on cancellation
    fn spawn_dispatcher(
        time_keys: Vec<String>,
        resumption: ResumptionHandle,
        line_tx: mpsc::Sender<usize>,
        event_tx: mpsc::Sender<PoolEvent>,
        cancel: CancelFlag,
    ) -> JoinHandle<bool> {
        tokio::spawn(async move {
            for (index, time_key) in time_keys.iter().enumerate() {
                if cancel.is_cancelled() {
                    warn!("Cancelled, {} lines left undispatched", time_keys.len() - index);
                    return true;
                }

                if resumption.is_already_recorded(time_key).await {
                    trace!("Skipping {}, already recorded", time_key);
                    if event_tx.send(PoolEvent::Skipped).await.is_err() {
                        break;
                    }
                    continue;
                }

                if line_tx.send(index).await.is_err() {
                    break;
                }
            }
            false
        })
    }

    fn progress_bar(ctx: &RunContext, line_count: usize, label: &str) -> ProgressBar {
        if ctx.quiet {
            return ProgressBar::hidden();
        }

        let bar = ctx.progress.add(ProgressBar::new(line_count as u64));
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} lines ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("█▓▒░"));
        bar.set_message(label.to_string());
        bar
    }

    fn shrink(bar: &ProgressBar) {
        if let Some(len) = bar.length() {
            bar.set_length(len.saturating_sub(1));
        }
    }
}
