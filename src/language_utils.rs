/*!
 * Language utilities: ISO code handling and subtitle language matching.
 *
 * Resolves ISO 639-1 / 639-2 / 639-3 codes through isolang, guesses the
 * language tag carried by a subtitle filename and ranks candidate subtitle
 * files against an ordered preference list.
 */

use anyhow::{Result, anyhow};
use isolang::Language;
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

// @const: ISO 639-2/B codes that differ from their 639-2/T form
const BIBLIOGRAPHIC_CODES: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

// @const: Default script subtag for languages written in several scripts
const DEFAULT_SCRIPTS: &[(&str, &str)] = &[
    ("zho", "hans"),
    ("yue", "hans"),
    ("cmn", "hans"),
];

// @const: Mentions stripped from filenames before looking for a language tag
const COMMON_SUBS_MENTIONS: &[&str] = &[
    "closedcaptions",
    "subtitles",
    "subtitle",
    "dubtitles",
    "dialog",
];

/// Normalize a language code to ISO 639-2/T (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    let normalized_code = code.trim().to_lowercase();

    match normalized_code.len() {
        2 => {
            if let Some(lang) = Language::from_639_1(&normalized_code) {
                return Ok(lang.to_639_3().to_string());
            }
        }
        3 => {
            if Language::from_639_3(&normalized_code).is_some() {
                return Ok(normalized_code);
            }
            if let Some((_, terminological)) = BIBLIOGRAPHIC_CODES
                .iter()
                .find(|(bibliographic, _)| *bibliographic == normalized_code)
            {
                return Ok((*terminological).to_string());
            }
        }
        _ => {}
    }

    Err(anyhow!("Cannot normalize invalid language code: {}", code))
}

/// Normalize a language code to ISO 639-1 (2-letter) format if possible
/// Falls back to ISO 639-2/T if no ISO 639-1 code exists
pub fn normalize_to_part1_or_part2t(code: &str) -> Result<String> {
    let part2t = normalize_to_part2t(code)?;
    let lang = Language::from_639_3(&part2t)
        .ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code))?;

    Ok(lang
        .to_639_1()
        .map(|c| c.to_string())
        .unwrap_or(part2t))
}

/// Check if two language codes match (represent the same language)
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (normalize_to_part2t(code1), normalize_to_part2t(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Get the language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = normalize_to_part2t(code)?;
    let lang = Language::from_639_3(&normalized)
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))?;

    Ok(lang.to_name().to_string())
}

/// A language with an optional BCP 47-style subtag (region or script)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lang {
    // @field: ISO 639-3 code
    pub code: String,

    // @field: Lowercased region/script subtag, empty when absent
    pub subtag: String,
}

impl Lang {
    // @creates: Lang from any ISO code and a subtag
    pub fn new(code: &str, subtag: &str) -> Result<Self> {
        Ok(Self {
            code: normalize_to_part2t(code)?,
            subtag: subtag.trim().to_lowercase(),
        })
    }

    /// Parse one tag such as `pt-BR`, `jpn`, `zh-Hant` or `zh-yue-Hans`.
    ///
    /// A 3-letter second part that is itself a language code is an extended
    /// language subtag and replaces the primary language.
    pub fn parse(tag: &str) -> Result<Self> {
        let parts: Vec<&str> = tag.trim().split('-').collect();
        let primary = parts[0].to_lowercase();

        let mut code = match normalize_to_part2t(&primary) {
            Ok(code) => code,
            Err(_) if primary == "jp" => {
                return Err(anyhow!(
                    "'jp' is not a valid ISO-639 code, for Japanese use either 'ja' or 'jpn'"
                ));
            }
            Err(_) => return Err(anyhow!("An invalid language code was passed: '{}'", parts[0])),
        };

        let mut subtag_idx = 1;
        if let Some(first) = parts.get(1) {
            let first = first.to_lowercase();
            if first.len() == 3 {
                if let Ok(extlang) = normalize_to_part2t(&first) {
                    code = extlang;
                    subtag_idx = 2;
                }
            }
        }

        let subtag = parts
            .get(subtag_idx)
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        Ok(Self { code, subtag })
    }

    // @returns: Display name of the language
    pub fn name(&self) -> String {
        get_language_name(&self.code).unwrap_or_else(|_| self.code.clone())
    }

    // @returns: Shortest ISO code (639-1 when available)
    pub fn short_code(&self) -> String {
        normalize_to_part1_or_part2t(&self.code).unwrap_or_else(|_| self.code.clone())
    }

    fn default_script(&self) -> Option<&'static str> {
        DEFAULT_SCRIPTS
            .iter()
            .find(|(code, _)| *code == self.code)
            .map(|(_, script)| *script)
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subtag.is_empty() {
            write!(f, "{}", self.short_code())
        } else {
            write!(f, "{}-{}", self.short_code(), self.subtag)
        }
    }
}

/// Parse a list of user-supplied language tags, skipping blank entries
pub fn parse_language_tags<S: AsRef<str>>(tags: &[S]) -> Result<Vec<Lang>> {
    if tags.is_empty() {
        return Err(anyhow!("Empty language list"));
    }

    tags.iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .map(Lang::parse)
        .collect()
}

/// Guess the language of a subtitle file from its name.
///
/// Returns `None` when no valid tag is found within three passes or when the
/// tag does not resolve to a known ISO code (e.g. `movie.xx.srt`).
pub fn guess_language(filename: &str) -> Option<Lang> {
    let tag = guess_language_tag(filename)?;
    Lang::parse(&tag).ok()
}

/// Locate the raw language tag (`en`, `pt-br`, ...) at the end of a filename.
///
/// Follows mpv's fuzzy subtitle language heuristic: a trailing 2-3 letter
/// primary subtag, optionally followed by `-` separated subtags of up to 8
/// letters, immediately preceded by `.`, `(` or `[`. Up to two extra
/// dot-separated tokens are peeled off when the end of the name does not
/// carry a tag.
pub fn guess_language_tag(filename: &str) -> Option<String> {
    let base = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string());
    let mut stripname = strip_common_mentions(&base);

    for _ in 0..3 {
        stripname = trim_extension(&stripname).trim().to_string();
        let bytes = stripname.as_bytes();
        if bytes.len() < 2 {
            return None;
        }

        let mut ok = true;
        let mut lang_length: usize = 0;
        let mut suffixes_length: usize = 0;
        let mut i = bytes.len() as isize - 1;

        let mut delimiter = b'.';
        if bytes[i as usize] == b')' {
            delimiter = b'(';
            i -= 1;
        }
        if i >= 0 && bytes[i as usize] == b']' {
            delimiter = b'[';
            i -= 1;
        }

        loop {
            while i >= 0 && is_letter(bytes[i as usize]) {
                lang_length += 1;
                i -= 1;
            }

            if lang_length < suffixes_length + 1 || lang_length > suffixes_length + 8 {
                ok = false;
            }

            if i >= 0 && bytes[i as usize] == b'-' {
                lang_length += 1;
                i -= 1;
                suffixes_length = lang_length;
            } else {
                break;
            }
        }

        if lang_length < suffixes_length + 2
            || lang_length > suffixes_length + 3
            || i <= 0
            || bytes[i as usize] != delimiter
        {
            ok = false;
        }

        let start = (i + 1) as usize;
        let tag = &bytes[start..start + lang_length];
        if lang_length > suffixes_length + 3 && !tag.contains(&b'-') {
            ok = false;
        }

        if ok {
            return Some(String::from_utf8_lossy(tag).into_owned());
        }
    }

    None
}

fn is_letter(b: u8) -> bool {
    (b as char).is_alphabetic()
}

// Extension of the last path element, like a dot-suffix split
fn trim_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) => &name[..pos],
        None => name,
    }
}

fn strip_common_mentions(name: &str) -> String {
    let mut s = name.to_lowercase();
    for mention in COMMON_SUBS_MENTIONS {
        s = s.replace(mention, "");
    }
    s
}

/// Kind of subtitle file, inferred from filename keywords.
///
/// Ordered from least to most preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubtitleSubtype {
    /// SDH track with annotations stripped
    StrippedSdh,
    /// Regular dialogue subtitles
    Plain,
    /// Text matching a dubbed audio track
    Dub,
    /// Closed captions (dialogue plus annotations)
    ClosedCaption,
}

impl SubtitleSubtype {
    // @returns: Subtype inferred from the filename
    pub fn from_filename(filename: &str) -> Self {
        let lower = filename.to_lowercase();
        if lower.contains("closedcaptions") {
            Self::ClosedCaption
        } else if lower.contains("dubtitles") {
            Self::Dub
        } else if lower.contains("stripped_sdh") {
            Self::StrippedSdh
        } else {
            Self::Plain
        }
    }

    // @returns: True for subtypes that already match the audio closely
    pub fn is_cc_or_dub(self) -> bool {
        matches!(self, Self::ClosedCaption | Self::Dub)
    }
}

/// Position of a language among the preferences; smaller is better
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageRank {
    // @field: Index in the preference list
    pub index: usize,

    // @field: Subtag quality against the matched preference
    pub quality: u32,
}

impl Ord for LanguageRank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index
            .cmp(&other.index)
            .then_with(|| other.quality.cmp(&self.quality))
    }
}

impl PartialOrd for LanguageRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Find the first preference the candidate satisfies
pub fn preference_index(preferences: &[Lang], candidate: &Lang) -> Option<usize> {
    preferences
        .iter()
        .position(|pref| subtag_compatible(pref, candidate))
}

/// Rank a candidate language against the preference list, `None` if not desired
pub fn language_rank(preferences: &[Lang], candidate: &Lang) -> Option<LanguageRank> {
    let index = preference_index(preferences, candidate)?;
    Some(LanguageRank {
        index,
        quality: subtag_quality(&preferences[index].subtag, candidate),
    })
}

fn subtag_compatible(pref: &Lang, candidate: &Lang) -> bool {
    if pref.code != candidate.code {
        return false;
    }
    if pref.subtag == candidate.subtag {
        return true;
    }
    if pref.subtag.is_empty() {
        if candidate.subtag.is_empty() {
            return true;
        }
        if candidate.subtag.len() == 4 {
            return candidate.default_script() == Some(candidate.subtag.as_str());
        }
        return true;
    }
    if candidate.subtag.is_empty() {
        return true;
    }
    // Redundant composition such as de-DE or th-TH
    normalize_to_part2t(&candidate.subtag).is_ok_and(|code| code == pref.code)
}

fn subtag_quality(requested: &str, candidate: &Lang) -> u32 {
    if requested == candidate.subtag {
        return 100;
    }

    if requested.is_empty() {
        if candidate.subtag.is_empty() {
            return 90;
        }
        if candidate.subtag.len() == 4 {
            return if candidate.default_script() == Some(candidate.subtag.as_str()) {
                85
            } else {
                0
            };
        }
        if candidate.code == "eng" {
            match candidate.subtag.as_str() {
                "us" => return 85,
                "gb" => return 80,
                _ => {}
            }
        }
        return 50;
    }

    if candidate.subtag.is_empty() {
        return 70;
    }

    0
}

/// A subtitle file considered during automatic selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleCandidate {
    // @field: Path of the subtitle file
    pub path: PathBuf,

    // @field: Language guessed from the filename
    pub lang: Lang,

    // @field: Subtype guessed from the filename
    pub subtype: SubtitleSubtype,
}

impl SubtitleCandidate {
    // @creates: Candidate from a path, None when no language can be guessed
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        let name = path.file_name()?.to_string_lossy().to_string();
        let lang = guess_language(&name)?;
        Some(Self {
            path: path.to_path_buf(),
            lang,
            subtype: SubtitleSubtype::from_filename(&name),
        })
    }
}

/// Whether `candidate` should replace `current` as the selected subtitle.
///
/// Language rank decides first. The subtype only breaks ties between
/// equally ranked languages, so it never rescues a worse language match.
/// On a full tie the first-seen file is kept.
pub fn is_preferred(
    preferences: &[Lang],
    candidate: &SubtitleCandidate,
    current: Option<&SubtitleCandidate>,
) -> bool {
    let Some(candidate_rank) = language_rank(preferences, &candidate.lang) else {
        return false;
    };
    let Some(current) = current else {
        return true;
    };
    let Some(current_rank) = language_rank(preferences, &current.lang) else {
        return true;
    };

    match candidate_rank.cmp(&current_rank) {
        Ordering::Less => true,
        Ordering::Equal => candidate.subtype > current.subtype,
        Ordering::Greater => false,
    }
}
