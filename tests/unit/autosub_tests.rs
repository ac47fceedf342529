/*!
 * Tests for automatic subtitle selection
 */

use std::fs;
use std::sync::Arc;
use anyhow::Result;
use subs2study::app_config::Config;
use subs2study::autosub::{resolve, sibling_subtitles};
use subs2study::errors::JobError;
use subs2study::file_utils::FileManager;
use subs2study::job::{Job, JobSettings, Mode};
use crate::common;

const MODELS: &[&str] = &["whisper-1"];

fn names(paths: &[std::path::PathBuf]) -> Vec<String> {
    paths.iter().map(FileManager::file_name_string).collect()
}

#[test]
fn test_sibling_subtitles_shouldFilterUnrelatedFiles() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let media = common::create_test_file(dir, "show.mkv", "")?;
    for name in [
        "show.en.srt",
        "show.dubtitles.en.srt",
        "show.en.forced.srt",
        "show.ja.srt",
        "show.ja.DUBTITLES.WHISPER-1.srt",
        "show.ja.tsv",
        "other.en.srt",
    ] {
        common::create_test_file(dir, name, "")?;
    }
    fs::create_dir_all(dir.join("show.ja.media"))?;

    let siblings = sibling_subtitles(&media, MODELS)?;

    assert_eq!(
        names(&siblings),
        vec!["show.dubtitles.en.srt", "show.en.srt", "show.ja.srt"]
    );
    Ok(())
}

/// A dub-matched reference beats a plain one of the same language
#[test]
fn test_resolve_withDubAndPlainReference_shouldPickDub() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let media = common::create_test_file(dir, "show.mkv", "")?;
    common::create_test_file(dir, "show.ja.srt", "")?;
    common::create_test_file(dir, "show.en.srt", "")?;
    common::create_test_file(dir, "show.dubtitles.en.srt", "")?;

    let mut job = Job::new(&media, Arc::new(common::test_settings(Mode::Cards, 1)));
    resolve(&mut job, MODELS)?;

    assert_eq!(job.target_subtitle, Some(dir.join("show.ja.srt")));
    assert_eq!(job.reference_subtitle, Some(dir.join("show.dubtitles.en.srt")));
    assert_eq!(job.reference_lang.as_ref().map(|l| l.code.as_str()), Some("eng"));
    assert!(job.is_cc_or_dub);
    Ok(())
}

#[test]
fn test_resolve_withRegionalTarget_shouldAdoptFoundLanguage() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let media = common::create_test_file(dir, "film.mkv", "")?;
    common::create_test_file(dir, "film.pt-BR.srt", "")?;
    common::create_test_file(dir, "film.en.srt", "")?;

    let config = Config {
        languages: vec!["pt".to_string(), "en".to_string()],
        ..Config::default()
    };
    let settings = JobSettings::from_config(&config)?;
    let mut job = Job::new(&media, Arc::new(settings));
    resolve(&mut job, MODELS)?;

    let target = job.target_lang.expect("target language");
    assert_eq!(target.code, "por");
    assert_eq!(target.subtag, "br");
    assert!(!job.is_cc_or_dub);
    Ok(())
}

#[test]
fn test_resolve_withoutTarget_shouldFailOutsideEnhance() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let media = common::create_test_file(dir, "show.mkv", "")?;
    common::create_test_file(dir, "show.en.srt", "")?;

    let mut job = Job::new(&media, Arc::new(common::test_settings(Mode::Cards, 1)));
    let err = resolve(&mut job, MODELS).unwrap_err();
    assert!(matches!(err, JobError::NoTargetSubtitle { .. }));
    assert!(err.to_string().contains("Japanese"));

    let mut enhance = Job::new(&media, Arc::new(common::test_settings(Mode::Enhance, 1)));
    resolve(&mut enhance, MODELS)?;
    assert!(enhance.target_subtitle.is_none());
    Ok(())
}

#[test]
fn test_resolve_withoutReferenceLanguages_shouldFailForCards() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let media = common::create_test_file(dir, "show.mkv", "")?;
    common::create_test_file(dir, "show.ja.srt", "")?;

    let config = Config { languages: vec!["ja".to_string()], ..Config::default() };
    let settings = Arc::new(JobSettings::from_config(&config)?);

    let mut job = Job::new(&media, settings.clone());
    assert!(matches!(resolve(&mut job, MODELS), Err(JobError::NoReferenceSource)));

    let dubs_settings = JobSettings { mode: Mode::Dubs, ..(*settings).clone() };
    let mut dubs = Job::new(&media, Arc::new(dubs_settings));
    resolve(&mut dubs, MODELS)?;
    assert!(dubs.reference_subtitle.is_none());
    Ok(())
}

#[test]
fn test_resolve_withExplicitPaths_shouldSkipSelection() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let media = common::create_test_file(dir, "show.mkv", "")?;
    let target = common::create_test_file(dir, "anything.srt", "")?;
    let reference = common::create_test_file(dir, "show.en.closedcaptions.srt", "")?;
    common::create_test_file(dir, "show.ja.srt", "")?;

    let settings = common::test_settings(Mode::Cards, 1)
        .with_subtitles(Some(target.clone()), Some(reference.clone()));
    let mut job = Job::new(&media, Arc::new(settings));
    resolve(&mut job, MODELS)?;

    assert_eq!(job.target_subtitle, Some(target));
    assert_eq!(job.reference_subtitle, Some(reference));
    assert!(job.is_cc_or_dub);
    Ok(())
}

/// Formats that can't be loaded never shadow a readable SRT of the same language
#[test]
fn test_resolve_withAssNextToSrt_shouldPickSrt() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let media = common::create_test_file(dir, "ep.mkv", "")?;
    common::create_test_file(dir, "ep.en.srt", "")?;
    common::create_test_file(dir, "ep.ja.ass", "")?;
    common::create_test_file(dir, "ep.ja.srt", "")?;
    common::create_test_file(dir, "ep.ja.vtt", "")?;

    assert_eq!(names(&sibling_subtitles(&media, MODELS)?), vec!["ep.en.srt", "ep.ja.srt"]);

    let mut job = Job::new(&media, Arc::new(common::test_settings(Mode::Cards, 1)));
    resolve(&mut job, MODELS)?;

    assert_eq!(job.target_subtitle, Some(dir.join("ep.ja.srt")));
    assert_eq!(job.reference_subtitle, Some(dir.join("ep.en.srt")));
    Ok(())
}
