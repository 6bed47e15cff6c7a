//! Track manifest sources
//!
//! A manifest is an ordered list of [`TrackDescriptor`]s plus an identity
//! string that feeds the scan key. Parsing library exports is left to
//! callers; the JSON reader accepts either a JSON array or one descriptor
//! per line.

use crate::error::ScanError;
use crate::models::TrackDescriptor;
use async_trait::async_trait;
use std::path::PathBuf;

#[async_trait]
pub trait ManifestReader: Send + Sync {
    /// Stable identity of the manifest (path, export id, ...)
    fn identity(&self) -> String;

    /// Tracks in manifest order
    async fn read(&self) -> Result<Vec<TrackDescriptor>, ScanError>;
}

/// Manifest already held in memory
#[derive(Debug, Clone)]
pub struct StaticManifest {
    identity: String,
    tracks: Vec<TrackDescriptor>,
}

impl StaticManifest {
    pub fn new(identity: impl Into<String>, tracks: Vec<TrackDescriptor>) -> Self {
        Self {
            identity: identity.into(),
            tracks,
        }
    }
}

#[async_trait]
impl ManifestReader for StaticManifest {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    async fn read(&self) -> Result<Vec<TrackDescriptor>, ScanError> {
        Ok(self.tracks.clone())
    }
}

/// JSON manifest file: an array of descriptors or JSON lines
#[derive(Debug, Clone)]
pub struct JsonManifestReader {
    path: PathBuf,
}

impl JsonManifestReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parse(&self, content: &str) -> Result<Vec<TrackDescriptor>, ScanError> {
        if content.trim_start().starts_with('[') {
            return serde_json::from_str(content).map_err(|e| {
                ScanError::Manifest(format!("{}: {}", self.path.display(), e))
            });
        }

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).map_err(|e| {
                    ScanError::Manifest(format!("{} line {}: {}", self.path.display(), n + 1, e))
                })
            })
            .collect()
    }
}

#[async_trait]
impl ManifestReader for JsonManifestReader {
    fn identity(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn read(&self) -> Result<Vec<TrackDescriptor>, ScanError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ScanError::Manifest(format!("{}: {}", self.path.display(), e)))?;
        let tracks = self.parse(&content)?;
        tracing::info!(manifest = %self.path.display(), tracks = tracks.len(), "Read manifest");
        Ok(tracks)
    }
}
