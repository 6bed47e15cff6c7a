//! Error types for mfdr-core
//!
//! File-level failures are recorded and the scan moves on. Only checkpoint
//! store and configuration failures abort a scan (see [`ScanError::is_fatal`]).

use crate::models::IntegrityCheck;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced while scanning one item or driving a scan
#[derive(Debug, Error)]
pub enum ScanError {
    /// File vanished or cannot be read
    #[error("File unavailable {path}: {source}")]
    IoUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Prober did not answer within its time budget
    #[error("Probe timed out after {}s at {stage} for {path}", .timeout.as_secs())]
    ProbeTimeout {
        path: PathBuf,
        stage: IntegrityCheck,
        timeout: Duration,
    },

    /// External probe tool missing or not executable
    #[error("Prober unavailable at {stage} for {path}: {reason}")]
    ProbeUnavailable {
        path: PathBuf,
        stage: IntegrityCheck,
        reason: String,
    },

    /// Embedded metadata could not be parsed
    #[error("Metadata unreadable for {path}: {reason}")]
    MetadataUnreadable { path: PathBuf, reason: String },

    /// Periodic checkpoint could not be persisted
    #[error("Checkpoint write failed for scan {scan_key}: {source}")]
    CheckpointWriteFailure {
        scan_key: String,
        #[source]
        source: CheckpointError,
    },

    /// Search root or subtree could not be listed
    #[error("Index path unreadable {path}: {reason}")]
    IndexPathUnreadable { path: PathBuf, reason: String },

    /// Planned destination would leave its root folder
    #[error("Unsafe destination outside {root}: {path}")]
    UnsafeDestination { root: PathBuf, path: PathBuf },

    /// Mutator could not carry out a decision
    #[error("Mutation failed for {path}: {reason}")]
    Mutation { path: PathBuf, reason: String },

    /// Checkpoint store failed while loading or finalizing
    #[error("Checkpoint store error: {0}")]
    Store(#[from] CheckpointError),

    /// Invalid scan configuration or targets
    #[error("Configuration error: {0}")]
    Config(String),

    /// Work item source (manifest reader) failed
    #[error("Manifest error: {0}")]
    Manifest(String),
}

impl ScanError {
    /// Whether this error aborts the whole scan
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Config(_) | Self::Manifest(_))
    }

    /// File the error refers to, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::IoUnavailable { path, .. }
            | Self::ProbeTimeout { path, .. }
            | Self::ProbeUnavailable { path, .. }
            | Self::MetadataUnreadable { path, .. }
            | Self::IndexPathUnreadable { path, .. }
            | Self::UnsafeDestination { path, .. }
            | Self::Mutation { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Classifier stage the error occurred in, if any
    pub fn stage(&self) -> Option<IntegrityCheck> {
        match self {
            Self::ProbeTimeout { stage, .. } | Self::ProbeUnavailable { stage, .. } => Some(*stage),
            Self::MetadataUnreadable { .. } => Some(IntegrityCheck::MetadataPresent),
            _ => None,
        }
    }

    /// Attach file and stage context to a prober failure
    pub fn from_probe(error: ProbeError, path: PathBuf, stage: IntegrityCheck) -> Self {
        match error {
            ProbeError::Timeout(timeout) => Self::ProbeTimeout { path, stage, timeout },
            ProbeError::ToolNotFound(tool) => Self::ProbeUnavailable {
                path,
                stage,
                reason: format!("{} not found", tool),
            },
            ProbeError::Io(source) => Self::IoUnavailable { path, source },
            other => Self::ProbeUnavailable {
                path,
                stage,
                reason: other.to_string(),
            },
        }
    }
}

/// Media prober errors
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Probe binary not on PATH
    #[error("Probe tool not found: {0}")]
    ToolNotFound(String),

    /// Subprocess exceeded the timeout and was killed
    #[error("Probe timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Subprocess ran but its output made no sense
    #[error("Unexpected probe output: {0}")]
    InvalidOutput(String),

    /// Spawning or talking to the subprocess failed
    #[error("Probe I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata reader errors
#[derive(Debug, Error)]
pub enum MetadataError {
    /// File cannot be opened
    #[error("Failed to open file: {0}")]
    Io(#[from] std::io::Error),

    /// Container or tags could not be parsed
    #[error("Failed to parse metadata: {0}")]
    Parse(String),
}

/// Checkpoint store errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored record belongs to a different target set
    #[error("Checkpoint key mismatch: expected {expected}, found {found}")]
    KeyMismatch { expected: String, found: String },
}

/// Non-fatal problems met while walking search roots
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexWarning {
    #[error("Unreadable path {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Search root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Symlink loop at {0}")]
    SymlinkLoop(PathBuf),
}

impl IndexWarning {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Unreadable { path, .. } => path,
            Self::RootNotFound(path) | Self::SymlinkLoop(path) => path,
        }
    }
}

impl From<IndexWarning> for ScanError {
    fn from(warning: IndexWarning) -> Self {
        let path = warning.path().clone();
        Self::IndexPathUnreadable {
            path,
            reason: warning.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_and_config_errors_are_fatal() {
        let io = ScanError::IoUnavailable {
            path: PathBuf::from("/a.mp3"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(!io.is_fatal());
        assert!(ScanError::Config("bad".into()).is_fatal());
        assert!(ScanError::Store(CheckpointError::KeyMismatch {
            expected: "a".into(),
            found: "b".into()
        })
        .is_fatal());
    }

    #[test]
    fn test_probe_error_carries_file_and_stage() {
        let err = ScanError::from_probe(
            ProbeError::Timeout(Duration::from_secs(7)),
            PathBuf::from("/b.flac"),
            IntegrityCheck::EndOfStreamDecode,
        );
        assert_eq!(err.stage(), Some(IntegrityCheck::EndOfStreamDecode));
        assert_eq!(err.path(), Some(&PathBuf::from("/b.flac")));
        assert!(err.to_string().contains("7s"));
    }

    #[test]
    fn test_index_warning_becomes_non_fatal_error() {
        let err = ScanError::from(IndexWarning::SymlinkLoop(PathBuf::from("/lib/loop")));
        assert!(matches!(err, ScanError::IndexPathUnreadable { .. }));
        assert_eq!(err.path(), Some(&PathBuf::from("/lib/loop")));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_metadata_error_is_attributed_to_metadata_check() {
        let err = ScanError::MetadataUnreadable {
            path: PathBuf::from("/c.mp3"),
            reason: "bad frame".into(),
        };
        assert_eq!(err.stage(), Some(IntegrityCheck::MetadataPresent));
        assert!(!err.is_fatal());
    }
}
