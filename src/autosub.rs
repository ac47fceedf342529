/*!
 * Automatic subtitle selection.
 *
 * Looks at the files sitting next to a media file and picks the best target
 * and reference subtitles according to the language preference list.
 */

use std::path::{Path, PathBuf};
use anyhow::Context;
use log::{debug, info, warn};

use crate::errors::JobError;
use crate::file_utils::{is_generated_dubtitle, FileManager};
use crate::job::{Job, Mode};
use crate::language_utils::{is_preferred, Lang, SubtitleCandidate, SubtitleSubtype};

/// Subtitle files next to `media` that may belong to it
pub fn sibling_subtitles(media: &Path, dubtitle_models: &[&str]) -> anyhow::Result<Vec<PathBuf>> {
    let dir = match media.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = FileManager::file_stem_string(media);

    let mut siblings = Vec::new();
    let entries = std::fs::read_dir(&dir)
        .with_context(|| format!("Failed to list directory: {:?}", dir))?;

    for entry in entries {
        let path = entry.context("Failed to read directory entry")?.path();
        let name = FileManager::file_name_string(&path);

        if path == media || path.is_dir() || !name.starts_with(&prefix) {
            continue;
        }
        if FileManager::is_unreadable_subtitle_file(&path) {
            debug!("Ignoring {:?}, only SRT subtitles are read", name);
            continue;
        }
        if !FileManager::is_subtitle_file(&path) {
            continue;
        }
        if name.to_lowercase().contains("forced") {
            debug!("Ignoring forced subtitles {:?}", name);
            continue;
        }
        if is_generated_dubtitle(&path, dubtitle_models) {
            debug!("Ignoring generated dubtitles {:?}", name);
            continue;
        }
        siblings.push(path);
    }

    siblings.sort();
    Ok(siblings)
}

// @returns: Best candidate for the preference list, first-seen wins ties
fn best_candidate<'a>(preferences: &[Lang], candidates: &'a [SubtitleCandidate]) -> Option<&'a SubtitleCandidate> {
    let mut best: Option<&SubtitleCandidate> = None;
    for candidate in candidates {
        if is_preferred(preferences, candidate, best) {
            best = Some(candidate);
        }
    }
    best
}

/// Fill in the subtitle paths of `job`.
///
/// Explicit paths from the job settings are kept as given. The others are
/// chosen among the sibling files of the media.
pub fn resolve(job: &mut Job, dubtitle_models: &[&str]) -> Result<(), JobError> {
    let settings = job.settings.clone();

    let needs_lookup = settings.explicit_target.is_none() || settings.explicit_reference.is_none();
    let candidates: Vec<SubtitleCandidate> = if needs_lookup {
        sibling_subtitles(&job.media, dubtitle_models)
            .unwrap_or_else(|e| {
                warn!("{:#}", e);
                Vec::new()
            })
            .iter()
            .filter_map(SubtitleCandidate::from_path)
            .collect()
    } else {
        Vec::new()
    };

    match &settings.explicit_target {
        Some(path) => job.target_subtitle = Some(path.clone()),
        None => {
            let target: Vec<Lang> = settings.target_language().cloned().into_iter().collect();
            if let Some(found) = best_candidate(&target, &candidates) {
                job.target_lang = Some(found.lang.clone());
                job.target_subtitle = Some(found.path.clone());
            }
        }
    }

    match &settings.explicit_reference {
        Some(path) => {
            let subtype = SubtitleSubtype::from_filename(&FileManager::file_name_string(path));
            job.is_cc_or_dub = subtype.is_cc_or_dub();
            job.reference_subtitle = Some(path.clone());
        }
        None => {
            if let Some(found) = best_candidate(settings.reference_languages(), &candidates) {
                job.reference_lang = Some(found.lang.clone());
                job.reference_subtitle = Some(found.path.clone());
                job.is_cc_or_dub = found.subtype.is_cc_or_dub();
            }
        }
    }

    if job.target_subtitle.is_none() && settings.mode != Mode::Enhance {
        return Err(JobError::NoTargetSubtitle {
            media: job.media.clone(),
            language: settings.target_language().map(|l| l.name()).unwrap_or_default(),
        });
    }

    if job.reference_subtitle.is_none() && settings.mode == Mode::Cards {
        if settings.reference_languages().is_empty() {
            return Err(JobError::NoReferenceSource);
        }
        warn!("No reference subtitle found for {:?}", FileManager::file_name_string(&job.media));
    }

    if let Some(target) = &job.target_subtitle {
        info!("Target subtitles: {}", FileManager::file_name_string(target));
    }
    if let Some(reference) = &job.reference_subtitle {
        info!("Reference subtitles: {}", FileManager::file_name_string(reference));
    }
    Ok(())
}
