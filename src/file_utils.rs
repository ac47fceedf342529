use anyhow::{Result, Context};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};
use regex::Regex;
use once_cell::sync::Lazy;
use crate::subtitle_processor::{SUBTITLE_EXTENSIONS, UNREADABLE_SUBTITLE_EXTENSIONS};

// @module: File and directory utilities

// @const: Container extensions considered media candidates during a walk
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v",
    "mpg", "mpeg", "ogv", "ts", "mts", "m2ts",
];

// @const: Suffix of per-job artifact directories
pub const MEDIA_DIR_SUFFIX: &str = ".media";

static SUBTITLES_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)subtitles?").expect("valid subtitles regex")
});

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().exists() && path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        fs::read_to_string(&path)
            .with_context(|| format!("Failed to read file: {:?}", path.as_ref()))
    }

    /// Write a string to a file
    pub fn write_to_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write to file: {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Whether the path has a known video container extension
    pub fn is_video_candidate<P: AsRef<Path>>(path: P) -> bool {
        Self::has_extension_in(path, VIDEO_EXTENSIONS)
    }

    /// Whether the path has a supported subtitle extension
    pub fn is_subtitle_file<P: AsRef<Path>>(path: P) -> bool {
        Self::has_extension_in(path, SUBTITLE_EXTENSIONS)
    }

    /// Whether the path is a subtitle file in a format that can't be loaded
    pub fn is_unreadable_subtitle_file<P: AsRef<Path>>(path: P) -> bool {
        Self::has_extension_in(path, UNREADABLE_SUBTITLE_EXTENSIONS)
    }

    fn has_extension_in<P: AsRef<Path>>(path: P, extensions: &[&str]) -> bool {
        path.as_ref()
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                extensions.contains(&ext.as_str())
            })
            .unwrap_or(false)
    }

    /// Find media candidates under a directory, in walk order.
    ///
    /// Artifact directories (`*.media`) are not descended into.
    pub fn find_media_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();

        let walker = WalkDir::new(dir.as_ref())
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !Self::is_artifact_dir(entry));

        for entry in walker {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file() && Self::is_video_candidate(path) {
                result.push(path.to_path_buf());
            }
        }

        Ok(result)
    }

    fn is_artifact_dir(entry: &DirEntry) -> bool {
        entry.file_type().is_dir()
            && entry.depth() > 0
            && entry.file_name().to_string_lossy().ends_with(MEDIA_DIR_SUFFIX)
    }

    // @returns: File name of a path as an owned string
    pub fn file_name_string<P: AsRef<Path>>(path: P) -> String {
        path.as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    // @returns: File stem of a path as an owned string
    pub fn file_stem_string<P: AsRef<Path>>(path: P) -> String {
        path.as_ref()
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Where a job writes its record file and artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    /// Base name shared by every output of the job
    pub output_base: String,

    /// Directory holding the media file and the record file
    pub output_dir: PathBuf,

    /// Record file extension including the dot
    pub output_ext: String,
}

impl OutputLayout {
    /// Derive the layout of a job from its media file (or target subtitle when
    /// there is no media) and the field separator.
    pub fn new<P: AsRef<Path>>(source: P, target_subtitle: Option<&Path>, field_separator: &str) -> Self {
        let source = source.as_ref();
        let output_dir = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        // ffmpeg concat lists cannot escape apostrophes
        let base_source = target_subtitle.unwrap_or(source);
        let output_base = FileManager::file_stem_string(base_source).replace('\'', " ");

        let output_ext = if field_separator == "\t" { ".tsv" } else { ".csv" }.to_string();

        OutputLayout { output_base, output_dir, output_ext }
    }

    /// Record file path
    pub fn record_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}{}", self.output_base, self.output_ext))
    }

    /// Artifact directory path
    pub fn media_dir(&self) -> PathBuf {
        self.output_dir.join(format!("{}{}", self.output_base, MEDIA_DIR_SUFFIX))
    }

    /// Prefix every artifact file name starts with
    pub fn media_prefix(&self) -> PathBuf {
        self.media_dir().join(&self.output_base)
    }

    /// Condensed audio track path
    pub fn condensed_path(&self, ext: &str) -> PathBuf {
        Self::with_suffix(&self.media_prefix(), &format!(".CONDENSED.{}", ext))
    }

    /// Separated voice track path
    pub fn voices_path(&self, ext: &str) -> PathBuf {
        Self::with_suffix(&self.media_prefix(), &format!(".VOICES.{}", ext))
    }

    /// Dubtitle file path for a transcription model
    pub fn dubtitle_path(&self, model: &str) -> PathBuf {
        let base = if SUBTITLES_WORD.is_match(&self.output_base) {
            SUBTITLES_WORD.replace_all(&self.output_base, "DUBTITLES").to_string()
        } else {
            format!("{}.DUBTITLES", self.output_base)
        };
        self.output_dir.join(format!("{}.{}.srt", base, model.to_uppercase()))
    }

    /// Source label written in every record
    pub fn source_label(&self) -> String {
        self.output_base.clone()
    }

    fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
        let mut name = prefix.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }
}

/// Whether a subtitle file was generated by this crate as a dubtitle for one of `models`
pub fn is_generated_dubtitle<P: AsRef<Path>>(path: P, models: &[&str]) -> bool {
    let name = FileManager::file_name_string(path);
    models
        .iter()
        .any(|model| name.contains(&format!(".{}", model.to_uppercase())))
}
