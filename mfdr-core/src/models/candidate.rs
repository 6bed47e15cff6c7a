//! Scored replacement candidates and match decisions

use crate::models::AudioFileRef;
use serde::{Deserialize, Serialize};

/// Maximum points for the name component
pub const NAME_MAX: f64 = 40.0;
/// Maximum points for the artist component
pub const ARTIST_MAX: f64 = 30.0;
/// Maximum points for the album component
pub const ALBUM_MAX: f64 = 20.0;
/// Maximum points for the size component
pub const SIZE_MAX: f64 = 10.0;

/// Per-component scores; each is clamped to its own maximum
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub name: f64,
    pub artist: f64,
    pub album: f64,
    pub size: f64,
}

impl ComponentScores {
    pub fn new(name: f64, artist: f64, album: f64, size: f64) -> Self {
        Self {
            name: clamp_component(name, NAME_MAX),
            artist: clamp_component(artist, ARTIST_MAX),
            album: clamp_component(album, ALBUM_MAX),
            size: clamp_component(size, SIZE_MAX),
        }
    }

    /// Sum of the components, always within 0..=100
    pub fn total(&self) -> f64 {
        self.name + self.artist + self.album + self.size
    }
}

fn clamp_component(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max)
    }
}

/// A candidate file scored against one track descriptor
///
/// Recomputed per match request; never reused across descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub file: AudioFileRef,
    pub score: f64,
    pub components: ComponentScores,
}

impl MatchCandidate {
    pub fn new(file: AudioFileRef, components: ComponentScores) -> Self {
        Self {
            file,
            score: components.total(),
            components,
        }
    }
}

/// Why a candidate was accepted without confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptReason {
    /// Best score reached the auto-accept threshold
    AboveThreshold,
    /// Only plausible candidate, above the single-candidate floor
    SingleCandidate,
}

/// Acceptance state of a match request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Acceptance {
    /// Best candidate may be used as-is
    AutoAccepted { reason: AcceptReason },
    /// Candidates exist but the caller has to decide
    NeedsReview,
    /// Nothing in the index resembled the track
    NoCandidates,
}

/// Ranked candidates (best first) plus the acceptance decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDecision {
    pub candidates: Vec<MatchCandidate>,
    pub acceptance: Acceptance,
    /// Number of candidates scored before truncation
    pub considered: usize,
}

impl MatchDecision {
    pub fn best(&self) -> Option<&MatchCandidate> {
        self.candidates.first()
    }

    /// Best candidate when auto-accepted
    pub fn accepted(&self) -> Option<&MatchCandidate> {
        match self.acceptance {
            Acceptance::AutoAccepted { .. } => self.candidates.first(),
            _ => None,
        }
    }

    pub fn is_auto_accepted(&self) -> bool {
        matches!(self.acceptance, Acceptance::AutoAccepted { .. })
    }
}
