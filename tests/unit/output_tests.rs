/*!
 * Tests for record writing and job-level artifacts
 */

use std::fs;
use std::path::Path;
use std::sync::Arc;
use anyhow::Result;
use subs2study::extraction::ProcessedItem;
use subs2study::job::{Job, JobSettings, Mode};
use subs2study::output::{parse_records, OutputSequencer};
use subs2study::subtitle_processor::{format_timestamp, SubtitleItem, SubtitleTrack};
use crate::common::{self, MockMedia};

fn job_in(dir: &Path, settings: JobSettings) -> Job {
    let mut job = Job::new(dir.join("show.mkv"), Arc::new(settings));
    job.target_subtitle = Some(dir.join("show.ja.srt"));
    job
}

fn item(start_ms: u64, text: &str) -> ProcessedItem {
    ProcessedItem {
        start_ms,
        time: format_timestamp(start_ms),
        source: "show.ja".to_string(),
        target_current: text.to_string(),
        ..Default::default()
    }
}

fn times(records: &[Vec<String>]) -> Vec<&str> {
    records.iter().map(|r| r[1].as_str()).collect()
}

#[test]
fn test_write_records_withUnsortedItems_shouldSortByStart() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let job = job_in(temp_dir.path(), common::test_settings(Mode::Cards, 1));
    let sequencer = OutputSequencer::new(&job, Arc::new(MockMedia::new()));

    let total = sequencer.write_records(vec![item(3_000, "c"), item(1_000, "a"), item(2_000, "b")])?;

    assert_eq!(total, 3);
    let content = fs::read_to_string(sequencer.record_path())?;
    let records = parse_records(&content, "\t");
    assert_eq!(times(&records), vec!["00:00:01,000", "00:00:02,000", "00:00:03,000"]);
    assert!(records.iter().all(|r| r.len() == 10));
    assert_eq!(records[0][2], "show.ja");
    Ok(())
}

/// New records interleave with the ones of an earlier run
#[test]
fn test_write_records_withExistingFile_shouldMergeAndReplace() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let job = job_in(temp_dir.path(), common::test_settings(Mode::Cards, 1));
    let sequencer = OutputSequencer::new(&job, Arc::new(MockMedia::new()));

    sequencer.write_records(vec![item(2_000, "old two"), item(4_000, "four")])?;
    let total = sequencer.write_records(vec![item(3_000, "three"), item(2_000, "new two"), item(1_000, "one")])?;

    assert_eq!(total, 4);
    let records = parse_records(&fs::read_to_string(sequencer.record_path())?, "\t");
    assert_eq!(
        times(&records),
        vec!["00:00:01,000", "00:00:02,000", "00:00:03,000", "00:00:04,000"]
    );
    assert_eq!(records[1][4], "new two");
    assert_eq!(records[3][4], "four");
    Ok(())
}

#[test]
fn test_write_records_withNoItems_shouldLeaveFileUntouched() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let job = job_in(temp_dir.path(), common::test_settings(Mode::Cards, 1));
    let sequencer = OutputSequencer::new(&job, Arc::new(MockMedia::new()));

    assert_eq!(sequencer.write_records(Vec::new())?, 0);
    assert!(!sequencer.record_path().exists());

    fs::write(sequencer.record_path(), "x\tnot a time\n")?;
    assert_eq!(sequencer.write_records(Vec::new())?, 1);
    assert_eq!(fs::read_to_string(sequencer.record_path())?, "x\tnot a time\n");
    Ok(())
}

#[test]
fn test_write_records_withUnreadableTime_shouldKeepRecordLast() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let job = job_in(temp_dir.path(), common::test_settings(Mode::Cards, 1));
    let sequencer = OutputSequencer::new(&job, Arc::new(MockMedia::new()));
    fs::write(sequencer.record_path(), "x\tnot a time\n")?;

    sequencer.write_records(vec![item(1_000, "one")])?;

    let records = parse_records(&fs::read_to_string(sequencer.record_path())?, "\t");
    assert_eq!(times(&records), vec!["00:00:01,000", "not a time"]);
    Ok(())
}

#[test]
fn test_write_records_withSeparatorInText_shouldQuoteField() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let settings = JobSettings {
        field_separator: ";".to_string(),
        ..common::test_settings(Mode::Cards, 1)
    };
    let job = job_in(temp_dir.path(), settings);
    let sequencer = OutputSequencer::new(&job, Arc::new(MockMedia::new()));

    sequencer.write_records(vec![item(1_000, "a; \"b\"")])?;

    assert_eq!(sequencer.record_path(), temp_dir.path().join("show.ja.csv"));
    let content = fs::read_to_string(sequencer.record_path())?;
    assert!(content.contains("\"a; \"\"b\"\"\""));
    assert_eq!(parse_records(&content, ";")[0][4], "a; \"b\"");
    Ok(())
}

#[tokio::test]
async fn test_build_condensed_audio_shouldConcatenateAndRemoveFragments() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let settings = JobSettings {
        condensed_audio: true,
        ..common::test_settings(Mode::Cards, 1)
    };
    let job = job_in(temp_dir.path(), settings);
    let media_dir = job.layout().media_dir();
    fs::create_dir_all(&media_dir)?;
    fs::write(media_dir.join("show.ja_00h00m02s000ms-00h00m03s000ms.wav"), "second")?;
    fs::write(media_dir.join("show.ja_00h00m01s000ms-00h00m02s000ms.wav"), "first")?;
    fs::write(media_dir.join("show.ja_00h00m01s000ms-00h00m02s000ms.ogg"), "clip")?;

    let mock = Arc::new(MockMedia::new());
    let sequencer = OutputSequencer::new(&job, mock.clone());
    let output = sequencer.build_condensed_audio().await?.expect("condensed track");

    assert_eq!(output, media_dir.join("show.ja.CONDENSED.mp3"));
    assert_eq!(fs::read_to_string(&output)?, "first\nsecond\n");
    let remaining: Vec<_> = fs::read_dir(&media_dir)?.filter_map(|e| e.ok()).map(|e| e.file_name()).collect();
    assert_eq!(remaining.len(), 2);

    // A second pass keeps the existing track
    assert!(sequencer.build_condensed_audio().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_finalize_inDubsMode_shouldWriteDubtitles() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let settings = JobSettings {
        transcription_model: Some("whisper-1".to_string()),
        ..common::test_settings(Mode::Dubs, 1)
    };
    let job = job_in(temp_dir.path(), settings);
    let target = SubtitleTrack::new(
        temp_dir.path().join("show.ja.srt"),
        vec![
            SubtitleItem::new(1_000, 1_800, vec!["元のテキスト".to_string()]),
            SubtitleItem::new(2_000, 2_800, vec!["二行目".to_string()]),
        ],
    );

    let sequencer = OutputSequencer::new(&job, Arc::new(MockMedia::new()));
    let total = sequencer
        .finalize(vec![item(1_000, "聞き取った文"), item(2_000, "二番目")], Some(&target), true)
        .await?;

    assert_eq!(total, 2);
    let dubtitles = SubtitleTrack::load(temp_dir.path().join("show.ja.DUBTITLES.WHISPER-1.srt"))?;
    assert_eq!(dubtitles.items[0].lines, vec!["聞き取った文"]);
    assert_eq!(dubtitles.items[1].lines, vec!["二番目"]);
    assert_eq!(dubtitles.items[1].start_ms, 2_000);
    Ok(())
}

#[tokio::test]
async fn test_finalize_afterInterruption_shouldOnlyWriteRecords() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let settings = JobSettings {
        transcription_model: Some("whisper-1".to_string()),
        condensed_audio: true,
        ..common::test_settings(Mode::Dubs, 1)
    };
    let job = job_in(temp_dir.path(), settings);
    let target = SubtitleTrack::new(
        temp_dir.path().join("show.ja.srt"),
        vec![SubtitleItem::new(1_000, 1_800, vec!["元のテキスト".to_string()])],
    );
    let media_dir = temp_dir.path().join("show.ja.media");
    fs::create_dir_all(&media_dir)?;
    common::create_test_file(&media_dir, "show.ja_00h00m01s000ms-00h00m01s800ms.wav", "audio 1000")?;

    let sequencer = OutputSequencer::new(&job, Arc::new(MockMedia::new()));
    let total = sequencer
        .finalize(vec![item(1_000, "聞き取った文")], Some(&target), false)
        .await?;

    assert_eq!(total, 1);
    assert!(!temp_dir.path().join("show.ja.DUBTITLES.WHISPER-1.srt").exists());
    assert!(!media_dir.join("show.ja.CONDENSED.mp3").exists());
    assert!(media_dir.join("show.ja_00h00m01s000ms-00h00m01s800ms.wav").exists());
    Ok(())
}
