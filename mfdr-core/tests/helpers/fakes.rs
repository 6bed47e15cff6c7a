//! Scripted collaborators with call counters

use async_trait::async_trait;
use mfdr_core::error::{CheckpointError, MetadataError, ProbeError, ScanError};
use mfdr_core::models::ScanCheckpoint;
use mfdr_core::services::{
    CheckpointStore, InMemoryCheckpointStore, MediaProber, MetadataReader, MetadataReport, Mutator, ProbeDepth,
    ProbeReport, ScanDecision,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Prober answering from the file name
///
/// - names containing "broken" do not decode
/// - names containing "slow" time out
/// - names containing "drmcodec" report a DRM codec tag
/// - everything else decodes with a 200 s duration
#[derive(Default)]
pub struct FakeProber {
    calls: AtomicUsize,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel `token` during the `n`th probe
    pub fn cancelling_after(n: usize, token: CancellationToken) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            cancel_after: Some((n, token)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaProber for FakeProber {
    async fn probe(&self, path: &Path, _depth: ProbeDepth, timeout: Duration) -> Result<ProbeReport, ProbeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, token)) = &self.cancel_after {
            if call == *n {
                token.cancel();
            }
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.contains("slow") {
            return Err(ProbeError::Timeout(timeout));
        }
        let codecs = if name.contains("drmcodec") {
            vec!["aac".to_string(), "drms".to_string()]
        } else {
            vec!["mp3".to_string()]
        };
        let decodable = !name.contains("broken");
        Ok(ProbeReport {
            decodable,
            duration: Some(200.0),
            codecs,
            detail: (!decodable).then(|| "error decoding final frames".to_string()),
        })
    }
}

/// Metadata reader returning one fixed report
///
/// - names containing "vanished" fail as if the file was deleted
/// - names containing "garbled" have unparseable tags
pub struct FakeReader {
    report: MetadataReport,
    calls: AtomicUsize,
}

impl FakeReader {
    pub fn tagged(declared_duration: f64) -> Self {
        Self {
            report: MetadataReport {
                has_tags: true,
                title: Some("Song".to_string()),
                declared_duration: Some(declared_duration),
                codec: Some("mp3".to_string()),
            },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn untagged() -> Self {
        Self {
            report: MetadataReport::default(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataReader for FakeReader {
    async fn read(&self, path: &Path) -> Result<MetadataReport, MetadataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.contains("vanished") {
            return Err(MetadataError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file",
            )));
        }
        if name.contains("garbled") {
            return Err(MetadataError::Parse("invalid ID3 frame".to_string()));
        }
        Ok(self.report.clone())
    }
}

/// Mutator that only records what it was asked to do
#[derive(Default)]
pub struct RecordingMutator {
    applied: Mutex<Vec<ScanDecision>>,
}

impl RecordingMutator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> Vec<ScanDecision> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mutator for RecordingMutator {
    async fn apply(&self, decision: &ScanDecision) -> Result<(), ScanError> {
        self.applied.lock().unwrap().push(decision.clone());
        Ok(())
    }
}

/// Mutator whose every move or copy fails
#[derive(Default)]
pub struct FailingMutator {
    attempts: AtomicUsize,
}

impl FailingMutator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mutator for FailingMutator {
    async fn apply(&self, decision: &ScanDecision) -> Result<(), ScanError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let path = match decision {
            ScanDecision::Quarantine { destination, .. } | ScanDecision::Replace { destination, .. } => {
                destination.clone()
            }
            _ => Default::default(),
        };
        Err(ScanError::Mutation {
            path,
            reason: "read-only file system".to_string(),
        })
    }
}

/// In-memory store whose loads or saves fail with an I/O error
#[derive(Default)]
pub struct FailingStore {
    inner: InMemoryCheckpointStore,
    fail_loads: bool,
    fail_saves: bool,
    failed_saves: AtomicUsize,
}

impl FailingStore {
    pub fn failing_saves() -> Self {
        Self {
            fail_saves: true,
            ..Default::default()
        }
    }

    pub fn failing_loads() -> Self {
        Self {
            fail_loads: true,
            ..Default::default()
        }
    }

    pub fn failed_saves(&self) -> usize {
        self.failed_saves.load(Ordering::SeqCst)
    }
}

fn disk_full() -> CheckpointError {
    CheckpointError::Io(std::io::Error::new(std::io::ErrorKind::Other, "no space left on device"))
}

#[async_trait]
impl CheckpointStore for FailingStore {
    async fn load(&self, scan_key: &str) -> Result<Option<ScanCheckpoint>, CheckpointError> {
        if self.fail_loads {
            return Err(disk_full());
        }
        self.inner.load(scan_key).await
    }

    async fn save(&self, scan_key: &str, checkpoint: &ScanCheckpoint) -> Result<(), CheckpointError> {
        if self.fail_saves {
            self.failed_saves.fetch_add(1, Ordering::SeqCst);
            return Err(disk_full());
        }
        self.inner.save(scan_key, checkpoint).await
    }

    async fn clear(&self, scan_key: &str) -> Result<(), CheckpointError> {
        self.inner.clear(scan_key).await
    }
}
