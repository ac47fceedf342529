/*!
 * Tests for language utility functions
 */

use std::path::PathBuf;
use subs2study::language_utils::{
    get_language_name, guess_language, guess_language_tag, is_preferred, language_codes_match,
    language_rank, normalize_to_part2t, parse_language_tags, Lang, SubtitleCandidate, SubtitleSubtype,
};

fn prefs(tags: &[&str]) -> Vec<Lang> {
    parse_language_tags(tags).unwrap()
}

fn candidate(name: &str) -> SubtitleCandidate {
    SubtitleCandidate::from_path(PathBuf::from(name)).unwrap()
}

/// Test normalization of language codes to ISO 639-2/T format
#[test]
fn test_normalize_to_part2t_withValidCodes_shouldNormalizeCorrectly() {
    assert_eq!(normalize_to_part2t("en").unwrap(), "eng");
    assert_eq!(normalize_to_part2t("fre").unwrap(), "fra");
    assert_eq!(normalize_to_part2t(" JA ").unwrap(), "jpn");
    assert!(normalize_to_part2t("xyz1").is_err());
}

/// Test matching of different language code formats
#[test]
fn test_language_codes_match_withMixedFormats_shouldMatch() {
    assert!(language_codes_match("de", "ger"));
    assert!(language_codes_match("jpn", "ja"));
    assert!(!language_codes_match("en", "fra"));
}

#[test]
fn test_get_language_name_withValidCodes_shouldReturnCorrectName() {
    assert_eq!(get_language_name("ja").unwrap(), "Japanese");
    assert_eq!(get_language_name("eng").unwrap(), "English");
}

#[test]
fn test_parse_language_tags_withSubtags_shouldSplitCodeAndSubtag() {
    let langs = prefs(&["pt-BR", "zh-yue-Hans", "jpn", " "]);
    assert_eq!(langs.len(), 3);
    assert_eq!(langs[0], Lang { code: "por".into(), subtag: "br".into() });
    assert_eq!(langs[1], Lang { code: "yue".into(), subtag: "hans".into() });
    assert_eq!(langs[2].code, "jpn");
    assert_eq!(langs[0].to_string(), "pt-br");
}

#[test]
fn test_parse_language_tags_withJp_shouldExplain() {
    let err = parse_language_tags(&["jp"]).unwrap_err();
    assert!(err.to_string().contains("'ja'"));
}

#[test]
fn test_guess_language_withTaggedFilenames_shouldFindTag() {
    assert_eq!(guess_language_tag("movie.pt-BR.srt").as_deref(), Some("pt-br"));
    assert_eq!(guess_language_tag("movie.en.closedcaptions.srt").as_deref(), Some("en"));
    assert_eq!(guess_language_tag("movie [ja].srt").as_deref(), Some("ja"));
    assert_eq!(guess_language_tag("movie.srt"), None);
    assert!(guess_language("movie.xx.srt").is_none());
}

#[test]
fn test_subtype_withKeywords_shouldRankCcHighest() {
    assert_eq!(SubtitleSubtype::from_filename("a.en.closedcaptions.srt"), SubtitleSubtype::ClosedCaption);
    assert_eq!(SubtitleSubtype::from_filename("a.dubtitles.en.srt"), SubtitleSubtype::Dub);
    assert_eq!(SubtitleSubtype::from_filename("a.en.stripped_sdh.srt"), SubtitleSubtype::StrippedSdh);
    assert_eq!(SubtitleSubtype::from_filename("a.en.srt"), SubtitleSubtype::Plain);
    assert!(SubtitleSubtype::StrippedSdh < SubtitleSubtype::Plain);
    assert!(SubtitleSubtype::Dub < SubtitleSubtype::ClosedCaption);
}

#[test]
fn test_language_rank_withRegionSubtag_shouldMatchFirstPreference() {
    let preferences = prefs(&["pt", "en"]);
    let rank = language_rank(&preferences, &candidate("movie.pt-BR.srt").lang).unwrap();
    assert_eq!(rank.index, 0);

    let english = language_rank(&preferences, &candidate("movie.en.srt").lang).unwrap();
    assert!(rank < english);
}

#[test]
fn test_language_rank_withRedundantSubtag_shouldMatch() {
    let german = prefs(&["de"]);
    assert!(language_rank(&german, &candidate("movie.de-DE.srt").lang).is_some());

    let german_germany = prefs(&["de-DE"]);
    assert!(language_rank(&german_germany, &candidate("movie.de-AT.srt").lang).is_none());
    assert!(language_rank(&german_germany, &candidate("movie.de.srt").lang).is_some());
}

#[test]
fn test_is_preferred_withNoSelection_shouldAcceptMatchingCandidate() {
    let preferences = prefs(&["en"]);
    assert!(is_preferred(&preferences, &candidate("show.en.srt"), None));
    assert!(!is_preferred(&preferences, &candidate("show.fr.srt"), None));
}

#[test]
fn test_is_preferred_withSameLanguage_shouldPreferDubOverPlain() {
    let preferences = prefs(&["en"]);
    let plain = candidate("show.en.srt");
    let dub = candidate("show.dubtitles.en.srt");

    assert!(is_preferred(&preferences, &dub, Some(&plain)));
    assert!(!is_preferred(&preferences, &plain, Some(&dub)));
}

#[test]
fn test_is_preferred_withWorseLanguage_shouldIgnoreSubtype() {
    let preferences = prefs(&["en", "fr"]);
    let english = candidate("show.en.srt");
    let french_cc = candidate("show.fr.closedcaptions.srt");

    assert!(!is_preferred(&preferences, &french_cc, Some(&english)));
    assert!(is_preferred(&preferences, &english, Some(&french_cc)));
}

#[test]
fn test_is_preferred_withFullTie_shouldKeepFirstSeen() {
    let preferences = prefs(&["en"]);
    let first = candidate("show.en.srt");
    let second = candidate("show (1).en.srt");
    assert!(!is_preferred(&preferences, &second, Some(&first)));
}

#[test]
fn test_is_preferred_withExactSubtag_shouldBeatBareLanguage() {
    let preferences = prefs(&["pt-BR"]);
    let bare = candidate("movie.pt.srt");
    let brazil = candidate("movie.pt-BR.srt");
    assert!(is_preferred(&preferences, &brazil, Some(&bare)));
    assert!(!is_preferred(&preferences, &bare, Some(&brazil)));
}
