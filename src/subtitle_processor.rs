use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use regex::Regex;
use once_cell::sync::Lazy;
use anyhow::{Result, Context, anyhow};
use log::{warn, debug};
use crate::file_utils::FileManager;

// @module: Subtitle parsing and normalization

// @const: SRT timing line regex
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{3})")
        .expect("valid timestamp regex")
});

// @const: Line holding nothing but a bracketed annotation, e.g. "[door slams]"
static ANNOTATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\p{Z}\p{P}]*\[.*\][\p{P}\p{Z}]*$").expect("valid annotation regex")
});

// @const: Subtitle extensions this module can load
pub const SUBTITLE_EXTENSIONS: &[&str] = &["srt"];

// @const: Subtitle formats recognized but not read
pub const UNREADABLE_SUBTITLE_EXTENSIONS: &[&str] = &["ass", "ssa", "vtt", "stl", "ttml"];

// @struct: One timed subtitle item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleItem {
    // @field: Start time in ms
    pub start_ms: u64,

    // @field: End time in ms
    pub end_ms: u64,

    // @field: Wrapped text lines, possibly empty
    pub lines: Vec<String>,
}

impl SubtitleItem {
    pub fn new(start_ms: u64, end_ms: u64, lines: Vec<String>) -> Self {
        SubtitleItem { start_ms, end_ms, lines }
    }

    // @returns: Item text on a single line, tabs and newlines flattened
    pub fn joined_text(&self) -> String {
        join_lines(&self.lines)
    }

    /// Display time of the item start, also used as its resumption key
    pub fn time_key(&self) -> String {
        format_timestamp(self.start_ms)
    }

    /// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
    pub fn format_timestamp(ms: u64) -> String {
        format_timestamp(ms)
    }
}

/// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// Format a timestamp so it can be embedded in a file name on any platform
pub fn path_position(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;

    format!("{:02}h{:02}m{:02}s{:03}ms", hours, minutes, seconds, millis)
}

/// Parse an SRT timestamp (HH:MM:SS,mmm) to milliseconds
pub fn parse_timestamp(timestamp: &str) -> Result<u64> {
    let parts: Vec<&str> = timestamp.trim().split(&[':', ',', '.'][..]).collect();

    if parts.len() != 4 {
        return Err(anyhow!("Invalid timestamp format: {}", timestamp));
    }

    let hours: u64 = parts[0].parse().context("Failed to parse hours")?;
    let minutes: u64 = parts[1].parse().context("Failed to parse minutes")?;
    let seconds: u64 = parts[2].parse().context("Failed to parse seconds")?;
    let millis: u64 = parts[3].parse().context("Failed to parse milliseconds")?;

    if minutes >= 60 || seconds >= 60 || millis >= 1000 {
        return Err(anyhow!("Invalid time components in timestamp: {}", timestamp));
    }

    Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
}

/// Join wrapped lines into one record-safe field
pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .map(|l| l.as_ref().trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .replace(['\t', '\n', '\r'], " ")
}

/// Ordered, normalized subtitle items loaded from one file
#[derive(Debug, Clone)]
pub struct SubtitleTrack {
    /// Source filename
    pub source_file: PathBuf,

    /// Items sorted by start time
    pub items: Vec<SubtitleItem>,
}

impl SubtitleTrack {
    pub fn new(source_file: PathBuf, items: Vec<SubtitleItem>) -> Self {
        SubtitleTrack { source_file, items }
    }

    /// Open, parse and normalize a subtitle file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if ext != "srt" {
            return Err(anyhow!("Unsupported subtitle format '{}' for {:?}", ext, path));
        }

        let content = FileManager::read_to_string(path)?;
        let items = Self::parse_srt_string(&content)
            .with_context(|| format!("Failed to parse subtitle file: {:?}", path))?;

        let mut track = SubtitleTrack::new(path.to_path_buf(), items);
        track.normalize();
        debug!("Loaded {} subtitle items from {:?}", track.items.len(), path);
        Ok(track)
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Parse SRT format string into subtitle items, empty items included
    pub fn parse_srt_string(content: &str) -> Result<Vec<SubtitleItem>> {
        let content = content.trim_start_matches('\u{feff}');
        let mut items = Vec::new();

        let mut current: Option<SubtitleItem> = None;
        let mut pending_seq = false;

        for (line_idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();

            if trimmed.is_empty() {
                if let Some(item) = current.take() {
                    items.push(item);
                }
                pending_seq = false;
                continue;
            }

            if current.is_none() {
                if let Some(caps) = TIMESTAMP_REGEX.captures(trimmed) {
                    let start_ms = Self::captures_to_ms(&caps, 1);
                    let end_ms = Self::captures_to_ms(&caps, 5);
                    if end_ms < start_ms {
                        warn!("Item at line {} ends before it starts", line_idx + 1);
                    }
                    current = Some(SubtitleItem::new(start_ms, end_ms, Vec::new()));
                    pending_seq = false;
                    continue;
                }

                if !pending_seq && trimmed.parse::<usize>().is_ok() {
                    pending_seq = true;
                    continue;
                }

                warn!("Unexpected text at line {} outside of a subtitle item: {}", line_idx + 1, trimmed);
                continue;
            }

            if let Some(item) = current.as_mut() {
                item.lines.push(trimmed.to_string());
            }
        }

        if let Some(item) = current.take() {
            items.push(item);
        }

        if items.is_empty() {
            return Err(anyhow!("No valid subtitle entries were found in the SRT content"));
        }

        items.sort_by_key(|item| item.start_ms);
        Ok(items)
    }

    fn captures_to_ms(caps: &regex::Captures, start_idx: usize) -> u64 {
        let field = |idx: usize| -> u64 {
            caps.get(idx)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0)
        };

        (field(start_idx) * 3600 + field(start_idx + 1) * 60 + field(start_idx + 2)) * 1000
            + field(start_idx + 3)
    }

    /// Merge continuation items and drop lines repeated from the previous item.
    ///
    /// An item without lines extends its predecessor. Otherwise the longest
    /// leading run of lines equal to the predecessor's trailing lines is
    /// removed. An item left empty or identical to its predecessor is merged too.
    pub fn normalize(&mut self) {
        let items = std::mem::take(&mut self.items);
        let mut normalized: Vec<SubtitleItem> = Vec::with_capacity(items.len());
        let mut merged = 0usize;

        for item in items {
            let Some(prev) = normalized.last_mut() else {
                normalized.push(item);
                continue;
            };

            if item.lines.is_empty() {
                prev.end_ms = item.end_ms;
                merged += 1;
                continue;
            }

            let lines = Self::remove_overlap(&prev.lines, item.lines);
            if lines.is_empty() || lines == prev.lines {
                prev.end_ms = item.end_ms;
                merged += 1;
                continue;
            }

            normalized.push(SubtitleItem::new(item.start_ms, item.end_ms, lines));
        }

        if merged > 0 {
            debug!("Merged {} continuation or duplicate subtitle items", merged);
        }
        self.items = normalized;
    }

    fn remove_overlap(prev: &[String], mut next: Vec<String>) -> Vec<String> {
        let max = prev.len().min(next.len());
        for n in (1..=max).rev() {
            if prev[prev.len() - n..] == next[..n] {
                next.drain(..n);
                return next;
            }
        }
        next
    }

    /// Strip closed-caption annotations so the text matches the spoken dialogue
    pub fn trim_cc_annotations(&mut self) {
        let before = self.items.len();
        for item in self.items.iter_mut() {
            item.lines = item
                .lines
                .iter()
                .filter(|line| !ANNOTATION_REGEX.is_match(line))
                .map(|line| line.trim().to_string())
                .collect();
        }
        self.items.retain(|item| !item.lines.is_empty());
        self.normalize();
        debug!("Closed-caption trim removed {} items", before - self.items.len());
    }

    /// Items of this track overlapping the `[start_ms, end_ms)` span of another line
    pub fn overlapping(&self, start_ms: u64, end_ms: u64) -> Vec<&SubtitleItem> {
        let mut found = Vec::new();
        for item in &self.items {
            if item.start_ms >= end_ms {
                break;
            }
            if item.start_ms >= start_ms || item.end_ms > start_ms {
                found.push(item);
            }
        }
        found
    }

    /// Concatenated text of the items overlapping a span
    pub fn overlapping_text(&self, start_ms: u64, end_ms: u64) -> String {
        let lines: Vec<&str> = self
            .overlapping(start_ms, end_ms)
            .iter()
            .flat_map(|item| item.lines.iter().map(String::as_str))
            .collect();
        join_lines(&lines)
    }

    /// Write items to an SRT file
    pub fn write_to_srt<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            FileManager::ensure_dir(parent)?;
        }

        let mut file = File::create(path)
            .with_context(|| format!("Failed to create subtitle file: {}", path.display()))?;

        for (idx, item) in self.items.iter().enumerate() {
            write!(file, "{}", SrtEntry { seq_num: idx + 1, item })?;
        }

        Ok(())
    }

    /// Whether a subtitle filename denotes closed captions
    pub fn is_closed_caption_file<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase().contains("closedcaption"))
            .unwrap_or(false)
    }
}

// @struct: Numbered SRT rendering of an item
struct SrtEntry<'a> {
    seq_num: usize,
    item: &'a SubtitleItem,
}

impl fmt::Display for SrtEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.seq_num)?;
        writeln!(
            f,
            "{} --> {}",
            format_timestamp(self.item.start_ms),
            format_timestamp(self.item.end_ms)
        )?;
        for line in &self.item.lines {
            writeln!(f, "{}", line)?;
        }
        writeln!(f)
    }
}

impl fmt::Display for SubtitleTrack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Subtitle Track")?;
        writeln!(f, "Source: {:?}", self.source_file)?;
        writeln!(f, "Items: {}", self.items.len())?;
        Ok(())
    }
}
