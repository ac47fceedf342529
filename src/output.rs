/*!
 * Output sequencing.
 *
 * The sequencer is the only writer of a job's record file. It sorts the
 * collected items by their start time, merges them with the records of
 * earlier runs and replaces the file atomically. It then assembles the
 * condensed audio track and, for dubs, the dubtitle SRT.
 */

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use tempfile::NamedTempFile;

use crate::extraction::ProcessedItem;
use crate::file_utils::{FileManager, OutputLayout};
use crate::job::{Job, Mode};
use crate::media::{AudioFormat, MediaCollaborator};
use crate::resumption::TIME_FIELD_INDEX;
use crate::subtitle_processor::{parse_timestamp, SubtitleTrack};

// @const: Position of the target text in a record
pub const TARGET_TEXT_FIELD_INDEX: usize = 4;

/// Quote a field when it contains the separator, a quote or a line break
pub fn escape_field(field: &str, field_separator: &str) -> String {
    let needs_quotes = field.contains(field_separator)
        || field.contains('"')
        || field.contains('\n')
        || field.contains('\r');

    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Format one record, without the line terminator
pub fn format_record<S: AsRef<str>>(fields: &[S], field_separator: &str) -> String {
    fields
        .iter()
        .map(|f| escape_field(f.as_ref(), field_separator))
        .collect::<Vec<_>>()
        .join(field_separator)
}

/// Split record file content into records and fields.
///
/// Quoted fields may hold the separator, doubled quotes and line breaks.
/// Blank lines are skipped.
pub fn parse_records(content: &str, field_separator: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut at_field_start = true;
    let mut rest = content.strip_prefix('\u{feff}').unwrap_or(content);

    while let Some(c) = rest.chars().next() {
        if in_quotes {
            if c == '"' {
                if rest[1..].starts_with('"') {
                    field.push('"');
                    rest = &rest[2..];
                    continue;
                }
                in_quotes = false;
            } else {
                field.push(c);
            }
            rest = &rest[c.len_utf8()..];
            continue;
        }

        if !field_separator.is_empty() && rest.starts_with(field_separator) {
            record.push(std::mem::take(&mut field));
            rest = &rest[field_separator.len()..];
            at_field_start = true;
            continue;
        }

        match c {
            '"' if at_field_start => in_quotes = true,
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                if record.len() > 1 || !record[0].is_empty() {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
                at_field_start = true;
                rest = &rest[1..];
                continue;
            }
            _ => field.push(c),
        }
        at_field_start = false;
        rest = &rest[c.len_utf8()..];
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

// @struct: A record with its sort key
#[derive(Debug)]
struct SortedRecord {
    start_ms: u64,
    fields: Vec<String>,
}

/// Writes the outputs of one job
#[derive(Debug, Clone)]
pub struct OutputSequencer {
    layout: OutputLayout,
    field_separator: String,
    condensed_format: Option<AudioFormat>,
    dubtitle_model: Option<String>,
    media: Arc<dyn MediaCollaborator>,
}

impl OutputSequencer {
    pub fn new(job: &Job, media: Arc<dyn MediaCollaborator>) -> Self {
        let settings = &job.settings;
        let dubtitle_model = if settings.mode == Mode::Dubs {
            settings.transcription_model.clone()
        } else {
            None
        };

        Self {
            layout: job.layout(),
            field_separator: settings.field_separator.clone(),
            condensed_format: job
                .wants_condensed_fragment()
                .then_some(settings.condensed_audio_format),
            dubtitle_model,
            media,
        }
    }

    pub fn record_path(&self) -> PathBuf {
        self.layout.record_path()
    }

    /// Persist the collected items and build the job-level artifacts.
    ///
    /// When the pool did not reach every line (`complete` is false) only the
    /// records are written; the condensed track and the dubtitles wait for a
    /// run that covers the whole job. Returns the number of records in the file.
    pub async fn finalize(
        &self,
        items: Vec<ProcessedItem>,
        target: Option<&SubtitleTrack>,
        complete: bool,
    ) -> Result<usize> {
        let total = self.write_records(items)?;

        if !complete {
            if self.condensed_format.is_some() || self.dubtitle_model.is_some() {
                info!("{} interrupted, job-level outputs left for the next run", self.layout.output_base);
            }
            return Ok(total);
        }

        if let Err(e) = self.build_condensed_audio().await {
            warn!("Condensed audio for {} failed: {:#}", self.layout.output_base, e);
        }

        if let (Some(model), Some(target)) = (&self.dubtitle_model, target) {
            if total > 0 {
                let path = self.write_dubtitles(target, model)?;
                info!("Dubtitles written to {:?}", path);
            }
        }

        Ok(total)
    }

    /// Merge `items` into the record file, sorted by start time.
    ///
    /// An empty item list leaves the file as it is.
    pub fn write_records(&self, mut items: Vec<ProcessedItem>) -> Result<usize> {
        let path = self.layout.record_path();
        let mut existing = self.read_existing()?;

        if items.is_empty() {
            debug!("Nothing new for {:?}", path);
            return Ok(existing.len());
        }

        items.sort_by_key(|item| item.start_ms);

        // Records rewritten in this run replace their earlier copy
        let fresh: HashSet<&str> = items.iter().map(|item| item.time.as_str()).collect();
        existing.retain(|record| {
            record
                .fields
                .get(TIME_FIELD_INDEX)
                .map_or(true, |time| !fresh.contains(time.as_str()))
        });

        let mut records = existing;
        records.extend(items.iter().map(|item| SortedRecord {
            start_ms: item.start_ms,
            fields: item.record_fields().iter().map(|f| f.to_string()).collect(),
        }));
        records.sort_by_key(|record| record.start_ms);

        let mut content = String::new();
        for record in &records {
            content.push_str(&format_record(&record.fields, &self.field_separator));
            content.push('\n');
        }

        let dir = self.layout.output_dir.clone();
        let dir = if dir.as_os_str().is_empty() { PathBuf::from(".") } else { dir };
        let mut temp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temporary record file in {:?}", dir))?;
        temp.write_all(content.as_bytes())
            .context("Failed to write records")?;
        temp.persist(&path)
            .with_context(|| format!("Failed to replace record file {:?}", path))?;

        debug!("Wrote {} records ({} new) to {:?}", records.len(), items.len(), path);
        Ok(records.len())
    }

    fn read_existing(&self) -> Result<Vec<SortedRecord>> {
        let path = self.layout.record_path();
        if !FileManager::file_exists(&path) {
            return Ok(Vec::new());
        }

        let content = FileManager::read_to_string(&path)?;
        let records = parse_records(&content, &self.field_separator)
            .into_iter()
            .map(|fields| {
                let start_ms = fields
                    .get(TIME_FIELD_INDEX)
                    .and_then(|time| parse_timestamp(time).ok())
                    .unwrap_or_else(|| {
                        warn!("Record without a readable time in {:?}, keeping it last", path);
                        u64::MAX
                    });
                SortedRecord { start_ms, fields }
            })
            .collect();
        Ok(records)
    }

    /// Concatenate the dialogue fragments into `<prefix>.CONDENSED.<ext>`.
    ///
    /// Skipped when condensed audio is off or the track already exists.
    pub async fn build_condensed_audio(&self) -> Result<Option<PathBuf>> {
        let Some(format) = self.condensed_format else {
            return Ok(None);
        };

        let output = self.layout.condensed_path(format.extension());
        if FileManager::file_exists(&output) {
            debug!("Condensed audio {:?} already exists", output);
            return Ok(None);
        }

        let prefix = self.layout.media_prefix();
        let pattern = format!("{}_*.wav", glob::Pattern::escape(&prefix.to_string_lossy()));
        let mut fragments: Vec<PathBuf> = glob::glob(&pattern)
            .with_context(|| format!("Invalid fragment pattern {}", pattern))?
            .filter_map(|entry| entry.ok())
            .collect();
        fragments.sort();

        if fragments.is_empty() {
            warn!("No audio fragments found for {}", self.layout.output_base);
            return Ok(None);
        }

        info!("Condensing {} fragments into {:?}", fragments.len(), output);
        self.media
            .concat_audio(&fragments, &output)
            .await
            .with_context(|| format!("Failed to build {:?}", output))?;

        for fragment in &fragments {
            if let Err(e) = std::fs::remove_file(fragment) {
                warn!("Couldn't remove fragment {:?}: {}", fragment, e);
            }
        }

        Ok(Some(output))
    }

    /// Write the target track with each line replaced by its transcription
    pub fn write_dubtitles(&self, target: &SubtitleTrack, model: &str) -> Result<PathBuf> {
        let content = FileManager::read_to_string(self.layout.record_path())?;
        let transcriptions: HashMap<String, String> = parse_records(&content, &self.field_separator)
            .into_iter()
            .filter_map(|fields| {
                let time = fields.get(TIME_FIELD_INDEX)?.clone();
                let text = fields.get(TARGET_TEXT_FIELD_INDEX)?.clone();
                Some((time, text))
            })
            .collect();

        let mut dubbed = target.clone();
        for item in &mut dubbed.items {
            if let Some(text) = transcriptions.get(&item.time_key()) {
                item.lines = vec![text.clone()];
            }
        }

        let path = self.layout.dubtitle_path(model);
        dubbed.write_to_srt(&path)?;
        Ok(path)
    }
}
