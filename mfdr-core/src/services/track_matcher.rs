//! Track matcher
//!
//! Scores replacement candidates for a missing track and decides whether the
//! best one can be used without asking.
//!
//! **Scoring** (100 points, each component clamped):
//! - Name (40): full credit when the track name appears in the filename on
//!   token boundaries with no extra version annotation. Otherwise partial
//!   credit scaled by token overlap, with near-equal long tokens counted
//!   (normalized Levenshtein >= 0.85), capped at [`NAME_PARTIAL_CAP`].
//! - Artist (30): artist in the filename or in any ancestor directory name
//! - Album (20): album in the immediate parent directory name
//! - Size (10): full within the size tolerance, linear down to zero at
//!   [`SIZE_ZERO_DEVIATION`], zero when the expected size is unknown
//!
//! Generic folder names ("Music", "iTunes Media", ...) never earn artist or
//! album credit. DRM-only files are never offered.
//!
//! A trailing "1" on the filename is only read as a duplicate-download
//! suffix when the track name does not end in "1" itself ("Symphony No. 1").
//!
//! **Ranking:** score descending; on equal scores a filename without the
//! duplicate-download suffix wins; otherwise discovery order.
//!
//! **Acceptance:** best score >= threshold, or a sole candidate scoring above
//! the single-candidate floor.

use crate::config::ScanConfig;
use crate::models::candidate::{ALBUM_MAX, ARTIST_MAX, NAME_MAX, SIZE_MAX};
use crate::models::{
    AcceptReason, Acceptance, AudioFileRef, ComponentScores, MatchCandidate, MatchDecision,
    TrackDescriptor,
};
use crate::services::candidate_indexer::CandidateIndex;
use crate::utils::text::{
    contains_phrase, ends_with_phrase, has_duplicate_suffix, is_generic_folder, normalize,
    strip_annotations, strip_duplicate_suffix, strip_track_numbers, tokens,
};
use std::collections::BTreeSet;

/// Highest name score without a strong match
pub const NAME_PARTIAL_CAP: f64 = 36.0;

/// Relative size deviation at which the size score reaches zero
pub const SIZE_ZERO_DEVIATION: f64 = 0.5;

/// Similarity at which two long tokens count as equal
const FUZZY_TOKEN_SIMILARITY: f64 = 0.85;

/// Tokens shorter than this must match exactly
const FUZZY_MIN_TOKEN_LEN: usize = 5;

/// Matcher tunables
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherOptions {
    pub auto_accept_threshold: f64,
    pub single_candidate_floor: f64,
    pub max_results: usize,
    pub size_tolerance: f64,
}

impl MatcherOptions {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            auto_accept_threshold: config.auto_accept_threshold,
            single_candidate_floor: config.single_candidate_floor,
            max_results: config.max_results,
            size_tolerance: config.size_tolerance,
        }
    }
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

/// Normalized forms of the track fields, computed once per request
struct TrackTerms {
    name: String,
    name_tokens: BTreeSet<String>,
    /// Track name itself ends like a duplicate suffix
    name_ends_in_one: bool,
    artist: String,
    artist_bare: String,
    album: String,
    album_base: String,
    expected_size: Option<u64>,
}

impl TrackTerms {
    fn new(track: &TrackDescriptor) -> Self {
        let artist = normalize(&track.artist);
        let artist = if is_generic_folder(&artist) { String::new() } else { artist };
        let album = normalize(&track.album);
        let album = if is_generic_folder(&album) { String::new() } else { album };
        Self {
            name: normalize(&track.name),
            name_tokens: tokens(&track.name).into_iter().collect(),
            name_ends_in_one: has_duplicate_suffix(&track.name),
            artist_bare: without_article(&artist).to_string(),
            artist,
            album_base: normalize(&strip_annotations(&track.album)),
            album,
            expected_size: track.expected_size.filter(|s| *s > 0),
        }
    }
}

fn without_article(text: &str) -> &str {
    text.strip_prefix("the ").unwrap_or(text)
}

/// Stem with the duplicate suffix removed, unless the suffix belongs to the title
fn base_stem<'s>(terms: &TrackTerms, stem: &'s str) -> &'s str {
    if terms.name_ends_in_one && ends_with_phrase(&normalize(stem), &terms.name) {
        stem
    } else {
        strip_duplicate_suffix(stem)
    }
}

fn is_duplicate(terms: &TrackTerms, file: &AudioFileRef) -> bool {
    let stem = file.stem();
    base_stem(terms, &stem) != stem
}

/// Scores and ranks candidates for track descriptors
#[derive(Debug, Clone, Default)]
pub struct TrackMatcher {
    options: MatcherOptions,
}

impl TrackMatcher {
    pub fn new(options: MatcherOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MatcherOptions {
        &self.options
    }

    /// Score one file against one track
    pub fn score(&self, track: &TrackDescriptor, file: &AudioFileRef) -> MatchCandidate {
        self.score_terms(&TrackTerms::new(track), file)
    }

    fn score_terms(&self, terms: &TrackTerms, file: &AudioFileRef) -> MatchCandidate {
        let stem = file.stem();
        let base = base_stem(terms, &stem);
        let file_name = normalize(base);

        let components = ComponentScores::new(
            name_score(terms, base, &file_name),
            artist_score(terms, file, &file_name),
            album_score(terms, file),
            size_score(terms.expected_size, file.size, self.options.size_tolerance),
        );
        MatchCandidate::new(file.clone(), components)
    }

    /// Score and order `files` best first; DRM-only files are dropped
    pub fn rank<'a>(
        &self,
        track: &TrackDescriptor,
        files: impl IntoIterator<Item = &'a AudioFileRef>,
    ) -> Vec<MatchCandidate> {
        let terms = TrackTerms::new(track);
        let mut ranked: Vec<MatchCandidate> = files
            .into_iter()
            .filter(|f| !f.is_drm_container())
            .map(|f| self.score_terms(&terms, f))
            .collect();

        // Stable: equal keys keep discovery order
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| is_duplicate(&terms, &a.file).cmp(&is_duplicate(&terms, &b.file)))
        });
        ranked
    }

    /// Apply the acceptance rules to a ranked list and truncate it
    pub fn decide(&self, mut ranked: Vec<MatchCandidate>, max_results: usize) -> MatchDecision {
        let considered = ranked.len();
        let acceptance = match ranked.first() {
            None => Acceptance::NoCandidates,
            Some(best) if best.score >= self.options.auto_accept_threshold => Acceptance::AutoAccepted {
                reason: AcceptReason::AboveThreshold,
            },
            Some(best) if considered == 1 && best.score > self.options.single_candidate_floor => {
                Acceptance::AutoAccepted {
                    reason: AcceptReason::SingleCandidate,
                }
            }
            Some(_) => Acceptance::NeedsReview,
        };
        ranked.truncate(max_results);
        MatchDecision {
            candidates: ranked,
            acceptance,
            considered,
        }
    }

    /// Find, score and judge replacement candidates for a track
    pub fn match_track(
        &self,
        track: &TrackDescriptor,
        index: &CandidateIndex,
        max_results: usize,
    ) -> MatchDecision {
        let ranked = self.rank(track, index.candidates_for(track));
        let decision = self.decide(ranked, max_results.min(self.options.max_results));

        match decision.best() {
            Some(best) => tracing::debug!(
                track = %track,
                best = %best.file.path.display(),
                score = best.score,
                considered = decision.considered,
                acceptance = ?decision.acceptance,
                "Matched track"
            ),
            None => tracing::debug!(track = %track, "No replacement candidates"),
        }
        decision
    }
}

// ============================================================================
// Components
// ============================================================================

/// `stem` has already been through [`base_stem`]
fn name_score(terms: &TrackTerms, stem: &str, file_name: &str) -> f64 {
    if terms.name.is_empty() {
        return 0.0;
    }

    // Tokens the filename adds through its own annotations ("(Live)", "feat. X")
    let file_base: BTreeSet<String> = tokens(&strip_annotations(stem)).into_iter().collect();
    let file_tokens: BTreeSet<String> = tokens(stem).into_iter().collect();
    let extra_variant = file_tokens
        .difference(&file_base)
        .any(|t| !terms.name_tokens.contains(t));

    if contains_phrase(file_name, &terms.name) && !extra_variant {
        return NAME_MAX;
    }

    // Title tokens of the file, without track numbers or the artist
    let title: BTreeSet<String> = strip_track_numbers(file_name)
        .split(' ')
        .filter(|t| !t.is_empty())
        .filter(|t| terms.name_tokens.contains(*t) || !contains_phrase(&terms.artist, t))
        .map(str::to_string)
        .collect();
    if title.is_empty() || terms.name_tokens.is_empty() {
        return 0.0;
    }

    let matched = terms
        .name_tokens
        .iter()
        .filter(|t| title.iter().any(|f| tokens_match(t, f)))
        .count();
    let denominator = terms.name_tokens.len().max(title.len());
    let ratio = matched as f64 / denominator as f64;
    (NAME_MAX * ratio).min(NAME_PARTIAL_CAP)
}

fn tokens_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    a.chars().count() >= FUZZY_MIN_TOKEN_LEN
        && b.chars().count() >= FUZZY_MIN_TOKEN_LEN
        && strsim::normalized_levenshtein(a, b) >= FUZZY_TOKEN_SIMILARITY
}

fn artist_score(terms: &TrackTerms, file: &AudioFileRef, file_name: &str) -> f64 {
    if terms.artist.is_empty() {
        return 0.0;
    }
    let matches = |text: &str| {
        contains_phrase(text, &terms.artist)
            || (terms.artist_bare != terms.artist && contains_phrase(text, &terms.artist_bare))
    };
    if matches(file_name) {
        return ARTIST_MAX;
    }
    let in_ancestor = file
        .path
        .ancestors()
        .skip(1)
        .filter_map(|p| p.file_name())
        .map(|n| normalize(&n.to_string_lossy()))
        .filter(|dir| !is_generic_folder(dir))
        .any(|dir| matches(&dir));
    if in_ancestor {
        ARTIST_MAX
    } else {
        0.0
    }
}

fn album_score(terms: &TrackTerms, file: &AudioFileRef) -> f64 {
    if terms.album.is_empty() {
        return 0.0;
    }
    let Some(parent) = file.path.parent().and_then(|p| p.file_name()) else {
        return 0.0;
    };
    let parent = normalize(&parent.to_string_lossy());
    if is_generic_folder(&parent) {
        return 0.0;
    }
    let found = contains_phrase(&parent, &terms.album)
        || (!terms.album_base.is_empty() && contains_phrase(&parent, &terms.album_base));
    if found {
        ALBUM_MAX
    } else {
        0.0
    }
}

/// Full within `tolerance`, linear to zero at [`SIZE_ZERO_DEVIATION`]
pub fn size_score(expected: Option<u64>, actual: u64, tolerance: f64) -> f64 {
    let Some(expected) = expected.filter(|e| *e > 0) else {
        return 0.0;
    };
    let deviation = (actual as f64 - expected as f64).abs() / expected as f64;
    if deviation <= tolerance {
        SIZE_MAX
    } else if deviation >= SIZE_ZERO_DEVIATION || tolerance >= SIZE_ZERO_DEVIATION {
        0.0
    } else {
        SIZE_MAX * (SIZE_ZERO_DEVIATION - deviation) / (SIZE_ZERO_DEVIATION - tolerance)
    }
}
