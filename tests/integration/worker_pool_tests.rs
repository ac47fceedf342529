/*!
 * Integration tests for the extraction worker pool
 */

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use subs2study::app_controller::Controller;
use subs2study::autosub;
use subs2study::job::{Job, Mode};
use subs2study::output::parse_records;
use subs2study::providers::known_transcription_models;
use subs2study::subtitle_processor::parse_timestamp;
use subs2study::worker_pool::WorkerPool;
use crate::common::{self, MockMedia};

fn resolved_job(media: &Path, mode: Mode, workers: usize) -> Result<Job> {
    let mut job = Job::new(media, Arc::new(common::test_settings(mode, workers)));
    autosub::resolve(&mut job, &known_transcription_models())?;
    job.load_tracks()?;
    Ok(job)
}

fn record_times(path: &Path) -> Result<Vec<u64>> {
    let content = std::fs::read_to_string(path)?;
    parse_records(&content, "\t")
        .iter()
        .map(|fields| parse_timestamp(&fields[1]))
        .collect()
}

/// A slow early line must not let later lines jump ahead in the record file
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_withSlowFirstLine_shouldKeepChronologicalOrder() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    let media_path = common::create_episode(temp_dir.path(), "ep", 100)?;
    let media = Arc::new(
        MockMedia::new()
            .with_delay(1_000, Duration::from_secs(2))
            .with_jitter(5),
    );

    let controller = Controller::new(common::test_settings(Mode::Cards, 4), common::test_context(media.clone()));
    let summary = controller.run(&media_path).await?;

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);

    let record_path = temp_dir.path().join("ep.ja.tsv");
    let times = record_times(&record_path)?;
    assert_eq!(times.len(), 100);
    assert_eq!(times[0], 1_000);
    assert!(times.windows(2).all(|pair| pair[0] < pair[1]));

    assert!(media.peak_in_flight() > 1);
    assert!(media.peak_in_flight() <= 4);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_inCardsMode_shouldFillEveryField() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let media_path = common::create_episode(temp_dir.path(), "ep", 3)?;
    let media = Arc::new(MockMedia::new());

    let controller = Controller::new(common::test_settings(Mode::Cards, 2), common::test_context(media.clone()));
    controller.run(&media_path).await?;

    let content = std::fs::read_to_string(temp_dir.path().join("ep.ja.tsv"))?;
    let records = parse_records(&content, "\t");
    assert_eq!(records.len(), 3);
    assert_eq!(
        records[0],
        vec![
            "[sound:ep.ja_00h00m01s000ms-00h00m01s800ms.ogg]",
            "00:00:01,000",
            "ep.ja",
            "<img src=\"ep.ja_00h00m01s000ms-00h00m01s800ms.avif\">",
            "日本語 1",
            "English 1",
            "",
            "",
            "日本語 2",
            "English 2",
        ]
    );
    assert_eq!(records[2][6], "日本語 2");
    assert_eq!(records[2][8], "");

    let media_dir = temp_dir.path().join("ep.ja.media");
    assert!(media_dir.join("ep.ja_00h00m03s000ms-00h00m03s800ms.avif").exists());
    assert!(media_dir.join("ep.ja_00h00m03s000ms-00h00m03s800ms.ogg").exists());
    assert_eq!(media.files_written(), 6);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_supervise_shouldReportEveryLineOnce() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let media_path = common::create_episode(temp_dir.path(), "ep", 25)?;
    let media = Arc::new(MockMedia::new().with_jitter(3));
    let ctx = common::test_context(media.clone());

    let job = Arc::new(resolved_job(&media_path, Mode::Cards, 3)?);
    let pool = WorkerPool::new(3);
    let report = pool.supervise(job, &ctx).await?;

    assert_eq!(report.items.len(), 25);
    assert_eq!(report.processed, 25);
    assert_eq!(report.failed + report.skipped + report.already_done, 0);
    assert!(!report.cancelled);

    let mut starts: Vec<u64> = report.items.iter().map(|item| item.start_ms).collect();
    starts.sort_unstable();
    starts.dedup();
    assert_eq!(starts.len(), 25);
    assert_eq!(media.image_requests(), 25);
    Ok(())
}

/// Collaborator failures degrade items but never drop them
#[tokio::test]
async fn test_supervise_withFailingAudio_shouldKeepFailedItems() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let media_path = common::create_episode(temp_dir.path(), "ep", 5)?;
    let ctx = common::test_context(Arc::new(MockMedia::new().failing_audio()));

    let job = Arc::new(resolved_job(&media_path, Mode::Cards, 2)?);
    let report = WorkerPool::new(2).supervise(job, &ctx).await?;

    assert_eq!(report.items.len(), 5);
    assert_eq!(report.failed, 5);
    assert_eq!(report.processed, 5);
    assert!(report.items.iter().all(|item| item.sound.is_empty() && !item.image.is_empty()));
    Ok(())
}

#[test]
fn test_worker_pool_withZeroWorkers_shouldUseOne() {
    assert_eq!(WorkerPool::new(0).workers(), 1);
    assert_eq!(WorkerPool::new(8).workers(), 8);
}
