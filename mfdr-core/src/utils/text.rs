//! Text normalization for filename matching
//!
//! All comparisons in the indexer and matcher go through [`normalize`]:
//! lower-case, punctuation folded to spaces, whitespace collapsed.

/// Folder names that never count as artist or album evidence
///
/// Compared against normalized directory names.
pub const GENERIC_FOLDER_NAMES: &[&str] = &[
    "music",
    "media",
    "itunes",
    "itunes music",
    "itunes media",
    "apple music",
    "compilations",
    "unknown artist",
    "unknown album",
    "downloads",
    "audio",
    "automatically add to music",
    "automatically add to itunes",
    "backup",
    "songs",
];

/// Words introducing a featured-artist tail ("Song feat. Someone")
const FEATURE_MARKERS: &[&str] = &["feat", "ft", "featuring"];

/// Words marking a dash-separated version annotation ("Song - Live at X")
const VERSION_MARKERS: &[&str] = &[
    "live", "remix", "mix", "remaster", "remastered", "version", "edit", "demo", "acoustic",
];

/// Lower-case, fold punctuation to spaces, collapse whitespace
///
/// Apostrophes are dropped rather than split ("Don't" -> "dont") and `&`
/// becomes "and".
pub fn normalize(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\'' | '\u{2019}' => {}
            '&' => folded.push_str(" and "),
            c if c.is_alphanumeric() => folded.extend(c.to_lowercase()),
            _ => folded.push(' '),
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized whitespace-separated tokens
pub fn tokens(text: &str) -> Vec<String> {
    normalize(text).split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect()
}

/// Remove bracketed annotations, featured artists and dash-separated version tags
///
/// "Hey Jude (Remastered 2015)" -> "Hey Jude", "Song feat. X" -> "Song",
/// "Song - Live at Wembley" -> "Song". Result is not normalized.
pub fn strip_annotations(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut depth = 0usize;
    for c in name.chars() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            c if depth == 0 => out.push(c),
            _ => {}
        }
    }

    // Cut at " - <version marker> ..."
    if let Some(pos) = out.find(" - ") {
        let tail = normalize(&out[pos + 3..]);
        let first = tail.split(' ').next().unwrap_or("");
        if VERSION_MARKERS.contains(&first) {
            out.truncate(pos);
        }
    }

    // Cut at a featured-artist marker
    let words: Vec<&str> = out.split_whitespace().collect();
    let cut = words.iter().position(|w| {
        let bare = w.trim_end_matches('.').to_lowercase();
        FEATURE_MARKERS.contains(&bare.as_str())
    });
    let words = match cut {
        Some(0) | None => &words[..],
        Some(i) => &words[..i],
    };
    words.join(" ").trim().to_string()
}

/// Whether a file stem carries a literal "1" duplicate-download suffix
///
/// Matches "track1", "track 1", "track-1" and "track (1)"; a bare "1" or a
/// longer number such as "track11" does not count.
pub fn has_duplicate_suffix(stem: &str) -> bool {
    duplicate_suffix_start(stem).is_some()
}

/// File stem with any duplicate suffix removed
pub fn strip_duplicate_suffix(stem: &str) -> &str {
    match duplicate_suffix_start(stem) {
        Some(start) => stem[..start].trim_end_matches([' ', '-', '_']),
        None => stem,
    }
}

fn duplicate_suffix_start(stem: &str) -> Option<usize> {
    let trimmed = stem.trim_end();
    let (body, start) = match trimmed.strip_suffix("(1)") {
        Some(body) => (body, body.len()),
        None => {
            let body = trimmed.strip_suffix('1')?;
            (body, body.len())
        }
    };
    let prev = body.chars().next_back()?;
    if prev.is_ascii_digit() || body.trim().is_empty() {
        return None;
    }
    Some(start)
}

/// Whether `needle` occurs in `haystack` on token boundaries
///
/// Both arguments must already be normalized.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let padded_hay = format!(" {} ", haystack);
    let padded_needle = format!(" {} ", needle);
    padded_hay.contains(&padded_needle)
}

/// Check if a normalized directory name is a generic library folder
pub fn is_generic_folder(normalized: &str) -> bool {
    normalized.is_empty() || GENERIC_FOLDER_NAMES.contains(&normalized)
}

/// Leading track number tokens ("01", "1", "101") are not part of a title
pub fn is_track_number(token: &str) -> bool {
    !token.is_empty() && token.len() <= 3 && token.chars().all(|c| c.is_ascii_digit())
}

/// Lookup key for a file stem: duplicate suffix and leading track numbers removed
///
/// "01 - Hey Jude 1" -> "hey jude". A stem made only of numbers keeps them.
pub fn title_key(stem: &str) -> String {
    strip_track_numbers(&normalize(strip_duplicate_suffix(stem)))
}

/// Normalized text without leading track numbers; all-number text is kept
pub fn strip_track_numbers(normalized: &str) -> String {
    let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
    let skip = words.iter().take_while(|w| is_track_number(w)).count();
    if skip == words.len() {
        return normalized.to_string();
    }
    words[skip..].join(" ")
}

/// Whether the normalized `text` ends with the normalized `phrase` on a token boundary
pub fn ends_with_phrase(text: &str, phrase: &str) -> bool {
    !phrase.is_empty() && format!(" {}", text).ends_with(&format!(" {}", phrase))
}
