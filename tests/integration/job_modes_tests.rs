/*!
 * Integration tests for dubtitles, condensed audio and voice separation
 */

use std::fs;
use std::sync::Arc;
use anyhow::Result;
use subs2study::app_controller::{Controller, RunSummary};
use subs2study::job::{JobSettings, Mode};
use subs2study::output::parse_records;
use subs2study::providers::mock::{MockSeparator, MockTranscriber};
use subs2study::providers::ProviderRegistry;
use subs2study::subtitle_processor::SubtitleTrack;
use crate::common::{self, MockMedia};

fn dubs_settings(workers: usize, max_concurrent_requests: usize) -> JobSettings {
    JobSettings {
        transcription_model: Some("whisper-1".to_string()),
        max_concurrent_requests,
        audio_track: None,
        ..common::test_settings(Mode::Dubs, workers)
    }
}

fn registry_with_transcriber(transcriber: &MockTranscriber) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register_transcriber("whisper-1", Arc::new(transcriber.clone()));
    registry
}

fn registry_with_separator(name: &str, separator: &MockSeparator) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register_separator(name, Arc::new(separator.clone()));
    registry
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_inDubsMode_shouldTranscribeAndWriteDubtitles() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    let media_path = common::create_episode(temp_dir.path(), "ep", 12)?;
    let transcriber = MockTranscriber::working();
    let media = Arc::new(MockMedia::new().with_jitter(5));
    let ctx = common::test_context_with(media.clone(), registry_with_transcriber(&transcriber));

    let controller = Controller::new(dubs_settings(4, 2), ctx);
    let summary = controller.run(&media_path).await?;

    assert_eq!(summary, RunSummary { processed: 1, skipped: 0, failed: 0 });
    assert_eq!(transcriber.request_count(), 12);
    assert!(transcriber.peak_in_flight() <= 2);
    assert!(transcriber.requested_languages().iter().all(|lang| lang == "ja"));

    let content = fs::read_to_string(temp_dir.path().join("ep.ja.tsv"))?;
    let records = parse_records(&content, "\t");
    assert_eq!(records.len(), 12);
    assert_eq!(records[0][4], "[TRANSCRIBED:ja] ep.ja_00h00m01s000ms-00h00m01s800ms");
    assert!(records.iter().all(|r| r[3].is_empty()));

    let dubtitles = SubtitleTrack::load(temp_dir.path().join("ep.ja.DUBTITLES.WHISPER-1.srt"))?;
    assert_eq!(dubtitles.len(), 12);
    assert!(dubtitles.items[11].lines[0].starts_with("[TRANSCRIBED:ja]"));

    // Images are never encoded outside card mode
    assert!(!temp_dir.path().join("ep.ja.media/ep.ja_00h00m01s000ms-00h00m01s800ms.avif").exists());

    // The generated dubtitles must not be picked up as a target afterwards
    let plan = controller.route(&media_path).await?;
    assert_eq!(plan.jobs[0].target_subtitle, Some(temp_dir.path().join("ep.ja.srt")));
    Ok(())
}

/// The declared language of a pinned audio stream is what gets transcribed
#[tokio::test]
async fn test_run_withPinnedAudioTrack_shouldTranscribeItsLanguage() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let media_path = common::create_episode(temp_dir.path(), "ep", 3)?;
    let transcriber = MockTranscriber::working();
    let ctx = common::test_context_with(Arc::new(MockMedia::new()), registry_with_transcriber(&transcriber));
    let settings = JobSettings {
        audio_track: Some(0),
        ..dubs_settings(1, 1)
    };

    let controller = Controller::new(settings, ctx);
    let job = controller.route(&media_path).await?.jobs.remove(0);
    let report = controller.run_job(job).await?;

    assert_eq!(report.records, 3);
    assert_eq!(transcriber.requested_languages(), vec!["en"; 3]);
    Ok(())
}

/// A failed transcription keeps the subtitle text and still produces a record
#[tokio::test]
async fn test_run_withFailingTranscriber_shouldKeepSubtitleText() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let media_path = common::create_episode(temp_dir.path(), "ep", 4)?;
    let transcriber = MockTranscriber::failing();
    let ctx = common::test_context_with(Arc::new(MockMedia::new()), registry_with_transcriber(&transcriber));

    let controller = Controller::new(dubs_settings(2, 1), ctx);
    let job = controller.route(&media_path).await?.jobs.remove(0);
    let report = controller.run_job(job).await?;
    let pool = report.pool.expect("pool report");

    assert_eq!(pool.failed, 4);
    assert_eq!(report.records, 4);
    let records = parse_records(&fs::read_to_string(temp_dir.path().join("ep.ja.tsv"))?, "\t");
    assert_eq!(records[0][4], "日本語 1");
    assert_eq!(records[3][4], "日本語 4");
    Ok(())
}

#[tokio::test]
async fn test_run_withUnknownTranscriptionModel_shouldFailTheJob() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let media_path = common::create_episode(temp_dir.path(), "ep", 2)?;
    let controller = Controller::new(
        dubs_settings(1, 1),
        common::test_context(Arc::new(MockMedia::new())),
    );

    let summary = controller.run(&media_path).await?;

    assert_eq!(summary, RunSummary { processed: 0, skipped: 0, failed: 1 });
    assert!(!temp_dir.path().join("ep.ja.tsv").exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_withCondensedAudio_shouldBuildTrackAndRemoveFragments() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let media_path = common::create_episode(temp_dir.path(), "ep", 5)?;
    let settings = JobSettings {
        condensed_audio: true,
        ..common::test_settings(Mode::Cards, 3)
    };
    let media = Arc::new(MockMedia::new().with_jitter(3));
    let controller = Controller::new(settings, common::test_context(media.clone()));

    controller.run(&media_path).await?;

    let media_dir = temp_dir.path().join("ep.ja.media");
    let condensed = media_dir.join("ep.ja.CONDENSED.mp3");
    assert_eq!(
        fs::read_to_string(&condensed)?,
        "audio 1000\naudio 2000\naudio 3000\naudio 4000\naudio 5000\n"
    );
    let leftover_wav = fs::read_dir(&media_dir)?
        .filter_map(|entry| entry.ok())
        .any(|entry| entry.path().extension().is_some_and(|ext| ext == "wav"));
    assert!(!leftover_wav);
    assert_eq!(media.audio_requests(), 10);
    assert_eq!(common::read_records(&temp_dir.path().join("ep.ja.tsv")).len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_run_inEnhanceMode_shouldWriteVoicesOnce() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let media_path = common::create_test_file(temp_dir.path(), "movie.mkv", "not really a video")?;
    let separator = MockSeparator::working();
    let settings = JobSettings {
        separation_provider: Some("demucs".to_string()),
        ..common::test_settings(Mode::Enhance, 1)
    };
    let ctx = common::test_context_with(Arc::new(MockMedia::new()), registry_with_separator("demucs", &separator));
    let controller = Controller::new(settings, ctx);

    let summary = controller.run(&media_path).await?;

    assert_eq!(summary.processed, 1);
    let voices = temp_dir.path().join("movie.media/movie.VOICES.flac");
    assert_eq!(fs::read_to_string(&voices)?, "VOICES:flac");
    assert!(!temp_dir.path().join("movie.tsv").exists());

    controller.run(&media_path).await?;
    assert_eq!(separator.request_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_run_withFailingSeparator_shouldOnlyFailEnhanceJobs() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let media_path = common::create_episode(temp_dir.path(), "ep", 3)?;
    let separator = MockSeparator::failing();

    let cards = JobSettings {
        separation_provider: Some("demucs".to_string()),
        ..common::test_settings(Mode::Cards, 1)
    };
    let ctx = common::test_context_with(Arc::new(MockMedia::new()), registry_with_separator("demucs", &separator));
    let summary = Controller::new(cards.clone(), ctx.clone()).run(&media_path).await?;
    assert_eq!(summary.processed, 1);
    assert_eq!(common::read_records(&temp_dir.path().join("ep.ja.tsv")).len(), 3);

    let enhance = JobSettings { mode: Mode::Enhance, ..cards };
    let summary = Controller::new(enhance, ctx).run(&media_path).await?;
    assert_eq!(summary.failed, 1);
    assert_eq!(separator.request_count(), 2);
    assert!(!temp_dir.path().join("ep.ja.media/ep.ja.VOICES.flac").exists());
    Ok(())
}
