//! Data model shared by the classifier, matcher and orchestrator

pub mod audio_file;
pub mod candidate;
pub mod checkpoint;
pub mod track;
pub mod verdict;

pub use audio_file::{AudioFileRef, FileFingerprint};
pub use candidate::{AcceptReason, Acceptance, ComponentScores, MatchCandidate, MatchDecision};
pub use checkpoint::{ScanCheckpoint, ScanMode, ScanStatistics};
pub use track::TrackDescriptor;
pub use verdict::{IntegrityCheck, IntegrityVerdict, QuarantineCategory};
