//! Integration tests for the integrity classifier and its cache

mod helpers;

use helpers::{write_audio, FakeProber, FakeReader, PLAUSIBLE_SIZE};
use mfdr_core::error::ScanError;
use mfdr_core::models::{IntegrityCheck, QuarantineCategory};
use mfdr_core::services::{ClassifierOptions, ClassifyMode, IntegrityClassifier};
use std::sync::Arc;
use tempfile::TempDir;

fn classifier(reader: FakeReader, mode: ClassifyMode) -> (IntegrityClassifier, Arc<FakeProber>, Arc<FakeReader>) {
    let prober = Arc::new(FakeProber::new());
    let reader = Arc::new(reader);
    let options = ClassifierOptions {
        mode,
        ..Default::default()
    };
    let classifier = IntegrityClassifier::new(prober.clone(), reader.clone(), options);
    (classifier, prober, reader)
}

#[tokio::test]
async fn test_small_file_is_corrupted_without_probing() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_audio(temp_dir.path(), "small.mp3", 30 * 1024);
    let (classifier, prober, reader) = classifier(FakeReader::tagged(200.0), ClassifyMode::Full);

    let verdict = classifier.classify_path(&path).await.unwrap();

    assert!(!verdict.is_good());
    assert_eq!(verdict.category(), QuarantineCategory::Corrupted);
    assert!(verdict.failed(IntegrityCheck::SizeGate));
    assert_eq!(prober.calls(), 0);
    assert_eq!(reader.calls(), 0);
}

#[tokio::test]
async fn test_unchanged_file_is_classified_once() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_audio(temp_dir.path(), "song.mp3", PLAUSIBLE_SIZE);
    let (classifier, prober, reader) = classifier(FakeReader::tagged(200.0), ClassifyMode::Full);

    let first = classifier.classify_path(&path).await.unwrap();
    let second = classifier.classify_path(&path).await.unwrap();

    assert!(first.is_good());
    assert_eq!(first, second);
    assert_eq!(prober.calls(), 1);
    assert_eq!(reader.calls(), 1);
    assert_eq!(classifier.cache().stats().hits, 1);
}

#[tokio::test]
async fn test_changed_file_is_classified_again() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_audio(temp_dir.path(), "song.mp3", PLAUSIBLE_SIZE);
    let (classifier, prober, _reader) = classifier(FakeReader::tagged(200.0), ClassifyMode::Full);

    classifier.classify_path(&path).await.unwrap();
    write_audio(temp_dir.path(), "song.mp3", PLAUSIBLE_SIZE + 1);
    classifier.classify_path(&path).await.unwrap();

    assert_eq!(prober.calls(), 2);
}

#[tokio::test]
async fn test_m4p_is_drm_even_when_decodable() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_audio(temp_dir.path(), "protected.m4p", PLAUSIBLE_SIZE);
    let (classifier, prober, _reader) = classifier(FakeReader::tagged(200.0), ClassifyMode::Full);

    let verdict = classifier.classify_path(&path).await.unwrap();

    assert!(!verdict.is_good());
    assert_eq!(verdict.category(), QuarantineCategory::Drm);
    assert_eq!(prober.calls(), 0);
}

#[tokio::test]
async fn test_drm_codec_tag_is_drm() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_audio(temp_dir.path(), "drmcodec.m4a", PLAUSIBLE_SIZE);
    let (classifier, _prober, _reader) = classifier(FakeReader::tagged(200.0), ClassifyMode::Full);

    let verdict = classifier.classify_path(&path).await.unwrap();
    assert_eq!(verdict.category(), QuarantineCategory::Drm);
}

#[tokio::test]
async fn test_missing_metadata_depends_on_mode() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_audio(temp_dir.path(), "song.mp3", PLAUSIBLE_SIZE);

    let (full, _, _) = classifier(FakeReader::untagged(), ClassifyMode::Full);
    let verdict = full.classify_path(&path).await.unwrap();
    assert_eq!(verdict.category(), QuarantineCategory::NoMetadata);

    let (fast, _, _) = classifier(FakeReader::untagged(), ClassifyMode::Fast);
    let verdict = fast.classify_path(&path).await.unwrap();
    assert!(verdict.is_good());
    assert!(verdict.failed(IntegrityCheck::MetadataPresent));
    assert!(verdict.passed(IntegrityCheck::EndOfStreamSeek));
}

#[tokio::test]
async fn test_short_stream_is_truncated() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_audio(temp_dir.path(), "song.mp3", PLAUSIBLE_SIZE);
    // Declared 300 s, stream holds 200 s
    let (classifier, _, _) = classifier(FakeReader::tagged(300.0), ClassifyMode::Full);

    let verdict = classifier.classify_path(&path).await.unwrap();
    assert_eq!(verdict.category(), QuarantineCategory::Truncated);
}

#[tokio::test]
async fn test_undecodable_tail_and_timeout_are_corrupted() {
    let temp_dir = TempDir::new().unwrap();
    let broken = write_audio(temp_dir.path(), "broken.mp3", PLAUSIBLE_SIZE);
    let slow = write_audio(temp_dir.path(), "slow.mp3", PLAUSIBLE_SIZE);
    let (classifier, _, _) = classifier(FakeReader::tagged(200.0), ClassifyMode::Full);

    let verdict = classifier.classify_path(&broken).await.unwrap();
    assert_eq!(verdict.category(), QuarantineCategory::Corrupted);
    assert!(verdict.failed(IntegrityCheck::EndOfStreamDecode));

    let verdict = classifier.classify_path(&slow).await.unwrap();
    assert_eq!(verdict.category(), QuarantineCategory::Corrupted);
}

#[tokio::test]
async fn test_unparseable_tags_fail_the_metadata_check() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_audio(temp_dir.path(), "garbled.mp3", PLAUSIBLE_SIZE);
    let (classifier, _, _) = classifier(FakeReader::tagged(200.0), ClassifyMode::Full);

    let verdict = classifier.classify_path(&path).await.unwrap();
    assert_eq!(verdict.category(), QuarantineCategory::NoMetadata);
    assert!(verdict.failed(IntegrityCheck::MetadataPresent));
    assert!(verdict
        .warnings()
        .iter()
        .any(|w| w.starts_with("Metadata unreadable") && w.contains("invalid ID3 frame")));
}

#[tokio::test]
async fn test_file_vanishing_during_classification_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_audio(temp_dir.path(), "vanished.mp3", PLAUSIBLE_SIZE);
    let (classifier, _, reader) = classifier(FakeReader::tagged(200.0), ClassifyMode::Full);

    let err = classifier.classify_path(&path).await.unwrap_err();
    assert!(matches!(err, ScanError::IoUnavailable { .. }));
    assert!(!err.is_fatal());

    // Failures are not cached
    assert!(classifier.classify_path(&path).await.is_err());
    assert_eq!(reader.calls(), 2);
}

#[tokio::test]
async fn test_missing_file_is_io_unavailable() {
    let temp_dir = TempDir::new().unwrap();
    let (classifier, _, _) = classifier(FakeReader::tagged(200.0), ClassifyMode::Full);

    let err = classifier
        .classify_path(&temp_dir.path().join("gone.mp3"))
        .await
        .unwrap_err();
    assert!(!err.is_fatal());
    assert!(err.path().is_some());
}
