//! Integration tests for candidate indexing and track matching

mod helpers;

use helpers::{write_audio, write_library, PLAUSIBLE_SIZE};
use mfdr_core::models::{AcceptReason, Acceptance, AudioFileRef, ComponentScores, MatchCandidate, TrackDescriptor};
use mfdr_core::services::{CandidateIndexer, TrackMatcher};
use std::path::PathBuf;
use tempfile::TempDir;

fn candidate(name: &str, components: ComponentScores) -> MatchCandidate {
    let path = PathBuf::from(format!("/music/{}", name));
    let file = AudioFileRef {
        path,
        size: 1,
        modified: chrono::Utc::now(),
        extension: "mp3".to_string(),
    };
    MatchCandidate::new(file, components)
}

#[test]
fn test_hey_jude_in_backup_folder_scores_hundred() {
    let temp_dir = TempDir::new().unwrap();
    let expected = write_audio(
        temp_dir.path(),
        "Backup/The Beatles/1967-1970/01 Hey Jude.m4a",
        8_100_000,
    );
    write_library(
        temp_dir.path(),
        &["Backup/The Beatles/1967-1970/02 Revolution.m4a", "Other/Hey There.mp3"],
    );

    let index = CandidateIndexer::new().index(&[temp_dir.path().to_path_buf()]);
    let track = TrackDescriptor::new("Hey Jude", "The Beatles", "1967-1970").with_size(8_000_000);
    let decision = TrackMatcher::default().match_track(&track, &index, 10);

    let best = decision.best().unwrap();
    assert_eq!(best.file.path, expected);
    assert_eq!(best.score, 100.0);
    assert_eq!(
        decision.acceptance,
        Acceptance::AutoAccepted {
            reason: AcceptReason::AboveThreshold
        }
    );
}

#[test]
fn test_title_ending_in_one_is_an_exact_match() {
    let temp_dir = TempDir::new().unwrap();
    let expected = write_audio(
        temp_dir.path(),
        "Backup/Beethoven/Symphonies/Symphony No. 1.mp3",
        8_000_000,
    );
    write_library(temp_dir.path(), &["Backup/Beethoven/Symphonies/Symphony No. 2.mp3"]);

    let index = CandidateIndexer::new().index(&[temp_dir.path().to_path_buf()]);
    let track = TrackDescriptor::new("Symphony No. 1", "Beethoven", "Symphonies").with_size(8_000_000);
    let decision = TrackMatcher::default().match_track(&track, &index, 10);

    let best = decision.best().unwrap();
    assert_eq!(best.file.path, expected);
    assert_eq!(best.components, ComponentScores::new(40.0, 30.0, 20.0, 10.0));
    assert!(decision.is_auto_accepted());
}

#[test]
fn test_duplicate_suffix_loses_tie() {
    let temp_dir = TempDir::new().unwrap();
    write_library(temp_dir.path(), &["Songs/track1.mp3", "Songs/track.mp3"]);

    let index = CandidateIndexer::new().index(&[temp_dir.path().to_path_buf()]);
    let track = TrackDescriptor::new("Track", "", "").with_size(PLAUSIBLE_SIZE as u64);
    let ranked = TrackMatcher::default().rank(&track, index.candidates_for(&track));

    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].score, ranked[1].score);
    assert_eq!(ranked[0].file.file_name(), "track.mp3");
    assert_eq!(ranked[1].file.file_name(), "track1.mp3");
}

#[test]
fn test_acceptance_thresholds() {
    let matcher = TrackMatcher::default();

    // At or above 88: accepted regardless of competition
    let decision = matcher.decide(
        vec![
            candidate("a.mp3", ComponentScores::new(40.0, 30.0, 20.0, 0.0)),
            candidate("b.mp3", ComponentScores::new(40.0, 30.0, 10.0, 0.0)),
        ],
        10,
    );
    assert!(decision.is_auto_accepted());

    // The only candidate, in (70, 88): accepted
    let decision = matcher.decide(
        vec![candidate("a.mp3", ComponentScores::new(40.0, 30.0, 0.0, 5.0))],
        10,
    );
    assert_eq!(
        decision.acceptance,
        Acceptance::AutoAccepted {
            reason: AcceptReason::SingleCandidate
        }
    );

    // Same best score with a weak competitor: left for review
    let decision = matcher.decide(
        vec![
            candidate("a.mp3", ComponentScores::new(40.0, 30.0, 0.0, 5.0)),
            candidate("b.mp3", ComponentScores::new(20.0, 0.0, 0.0, 0.0)),
        ],
        10,
    );
    assert_eq!(decision.acceptance, Acceptance::NeedsReview);

    // Several candidates, none above 70: left for review
    let decision = matcher.decide(
        vec![
            candidate("a.mp3", ComponentScores::new(40.0, 30.0, 0.0, 0.0)),
            candidate("b.mp3", ComponentScores::new(36.0, 30.0, 0.0, 0.0)),
        ],
        10,
    );
    assert_eq!(decision.acceptance, Acceptance::NeedsReview);
    assert!(decision.accepted().is_none());
}

#[test]
fn test_component_scores_are_clamped() {
    let scores = ComponentScores::new(55.0, -3.0, 25.0, 12.0);
    assert_eq!(scores.total(), 40.0 + 0.0 + 20.0 + 10.0);

    let top = candidate("x.mp3", ComponentScores::new(40.0, 30.0, 20.0, 10.0));
    assert!(top.score <= 100.0);
}

#[test]
fn test_missing_roots_become_warnings() {
    let temp_dir = TempDir::new().unwrap();
    write_library(temp_dir.path(), &["a.mp3"]);

    let index = CandidateIndexer::new().index(&[
        temp_dir.path().to_path_buf(),
        temp_dir.path().join("does-not-exist"),
    ]);
    assert_eq!(index.len(), 1);
    assert_eq!(index.warnings().len(), 1);
}
