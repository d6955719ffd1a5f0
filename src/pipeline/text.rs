//! Answer text as shown and as spoken.

/// Code-point ranges removed before synthesis.  Voices read pictographs out
/// by name ("grinning face"), or choke on them.
const PICTOGRAPH_RANGES: &[(char, char)] = &[
    ('\u{1F600}', '\u{1F64F}'), // emoticons
    ('\u{1F300}', '\u{1F5FF}'), // symbols and pictographs
    ('\u{1F680}', '\u{1F6FF}'), // transport and map
    ('\u{1F1E0}', '\u{1F1FF}'), // regional indicators (flags)
    ('\u{1F900}', '\u{1F9FF}'), // supplemental symbols and pictographs
    ('\u{1FA70}', '\u{1FAFF}'),
    ('\u{2600}', '\u{26FF}'), // miscellaneous symbols
    ('\u{2702}', '\u{27B0}'), // dingbats
    ('\u{FE0F}', '\u{FE0F}'), // emoji presentation selector
    ('\u{200D}', '\u{200D}'), // zero-width joiner
];

fn is_pictograph(c: char) -> bool {
    PICTOGRAPH_RANGES
        .iter()
        .any(|&(lo, hi)| (lo..=hi).contains(&c))
}

/// Join all lines with single spaces and trim.
///
/// ```
/// use voice_query::pipeline::text::single_line;
///
/// assert_eq!(single_line("Two rows:\n  Ayesha\n\nBilal "), "Two rows: Ayesha Bilal");
/// ```
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// [`single_line`] without pictographs.
pub fn sanitize_for_speech(text: &str) -> String {
    let kept: String = text.chars().filter(|&c| !is_pictograph(c)).collect();
    single_line(&kept)
}
