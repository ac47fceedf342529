/*!
 * Integration tests for directory routing
 */

use std::fs;
use std::sync::Arc;
use anyhow::Result;
use subs2study::app_controller::{Controller, RunSummary};
use subs2study::errors::JobError;
use subs2study::file_utils::FileManager;
use subs2study::job::Mode;
use crate::common::{self, MockMedia};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_route_withCorruptedEpisode_shouldExcludeIt() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    for i in 1..=5 {
        common::create_episode(temp_dir.path(), &format!("ep{}", i), 3)?;
    }
    let media = Arc::new(MockMedia::new().with_corrupted("ep3.mkv"));
    let controller = Controller::new(common::test_settings(Mode::Cards, 2), common::test_context(media));

    let plan = controller.route(temp_dir.path()).await?;

    assert_eq!(plan.jobs.len(), 4);
    assert_eq!(plan.corrupted, 1);
    assert_eq!(plan.failed, 0);
    assert_eq!(plan.total_lines, 12);
    let names: Vec<String> = plan.jobs.iter().map(|job| FileManager::file_name_string(&job.media)).collect();
    assert_eq!(names, vec!["ep1.mkv", "ep2.mkv", "ep4.mkv", "ep5.mkv"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_overDirectory_shouldProcessEveryHealthyEpisode() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    for i in 1..=5 {
        common::create_episode(temp_dir.path(), &format!("ep{}", i), 4)?;
    }
    let media = Arc::new(MockMedia::new().with_corrupted("ep3.mkv"));
    let controller = Controller::new(common::test_settings(Mode::Cards, 2), common::test_context(media));

    let summary = controller.run(temp_dir.path()).await?;

    assert_eq!(summary, RunSummary { processed: 4, skipped: 1, failed: 0 });
    for i in [1, 2, 4, 5] {
        let records = common::read_records(&temp_dir.path().join(format!("ep{}.ja.tsv", i)));
        assert_eq!(records.len(), 4);
    }
    assert!(!temp_dir.path().join("ep3.ja.tsv").exists());
    Ok(())
}

/// Artifact directories and episodes without target subtitles are left out
#[tokio::test]
async fn test_route_withNestedFolders_shouldSkipArtifactsAndUnresolved() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let season = temp_dir.path().join("season 1");
    fs::create_dir_all(&season)?;
    common::create_episode(&season, "s01e01", 2)?;
    common::create_test_file(&season, "s01e02.mkv", "")?;
    common::create_test_file(&season, "s01e02.en.srt", &common::numbered_srt(2, "English"))?;

    let artifacts = temp_dir.path().join("old.ja.media");
    fs::create_dir_all(&artifacts)?;
    common::create_test_file(&artifacts, "preview.mp4", "")?;

    let controller = Controller::new(
        common::test_settings(Mode::Cards, 1),
        common::test_context(Arc::new(MockMedia::new())),
    );
    let plan = controller.route(temp_dir.path()).await?;

    assert_eq!(plan.jobs.len(), 1);
    assert_eq!(plan.failed, 1);
    assert_eq!(plan.corrupted, 0);
    assert_eq!(plan.jobs[0].target_subtitle, Some(season.join("s01e01.ja.srt")));
    assert_eq!(plan.jobs[0].reference_subtitle, Some(season.join("s01e01.en.srt")));
    Ok(())
}

#[tokio::test]
async fn test_route_withMissingPath_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let controller = Controller::new(
        common::test_settings(Mode::Cards, 1),
        common::test_context(Arc::new(MockMedia::new())),
    );
    assert!(controller.route(&temp_dir.path().join("nowhere")).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_run_inTranslitMode_shouldRefuse() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let media_path = common::create_episode(temp_dir.path(), "ep", 2)?;
    let controller = Controller::new(
        common::test_settings(Mode::Translit, 1),
        common::test_context(Arc::new(MockMedia::new())),
    );

    let err = controller.run(&media_path).await.unwrap_err();

    assert!(matches!(err.downcast_ref::<JobError>(), Some(JobError::UnsupportedMode(_))));
    assert!(!temp_dir.path().join("ep.ja.tsv").exists());
    Ok(())
}
