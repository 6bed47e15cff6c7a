//! Audio file snapshots and fingerprints

use chrono::{DateTime, Utc};
use mfdr_common::time::modified_or_epoch;
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::{Path, PathBuf};

/// Extensions considered audio by the indexer and the scanners
pub const SUPPORTED_EXTENSIONS: [&str; 8] = ["mp3", "m4a", "m4p", "aac", "flac", "wav", "ogg", "opus"];

/// Containers that only ever hold DRM-protected audio
pub const DRM_ONLY_EXTENSIONS: [&str; 1] = ["m4p"];

/// Lower-cased extension of a path without the dot ("" when absent)
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Check if extension (lower-case, no dot) is in the supported set
pub fn is_supported_extension(ext: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&ext)
}

/// Check if extension (lower-case, no dot) is a DRM-only container
pub fn is_drm_extension(ext: &str) -> bool {
    DRM_ONLY_EXTENSIONS.contains(&ext)
}

/// Size + modification time pair identifying one state of a file
///
/// Two fingerprints of the same path being equal means the file is treated
/// as unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileFingerprint {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl FileFingerprint {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            size: metadata.len(),
            modified: modified_or_epoch(metadata),
        }
    }
}

/// Immutable snapshot of an audio file taken when it was indexed or scanned
///
/// Identity is the path. Staleness is detected by comparing the stored
/// fingerprint with the file's current size/mtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFileRef {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub extension: String,
}

impl AudioFileRef {
    /// Snapshot a file by reading its metadata (follows symlinks)
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self::from_metadata(path, &metadata))
    }

    /// Build a snapshot from already-fetched metadata
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        let fingerprint = FileFingerprint::from_metadata(metadata);
        Self {
            path: path.to_path_buf(),
            size: fingerprint.size,
            modified: fingerprint.modified,
            extension: extension_of(path),
        }
    }

    pub fn fingerprint(&self) -> FileFingerprint {
        FileFingerprint {
            size: self.size,
            modified: self.modified,
        }
    }

    /// Compare the snapshot against the file's current state
    ///
    /// Returns `Err` when the file can no longer be read.
    pub fn is_stale(&self) -> std::io::Result<bool> {
        let metadata = std::fs::metadata(&self.path)?;
        Ok(FileFingerprint::from_metadata(&metadata) != self.fingerprint())
    }

    /// File name including extension
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// File name without extension
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn is_drm_container(&self) -> bool {
        is_drm_extension(&self.extension)
    }
}
