//! Embedded metadata reader
//!
//! Reads tag presence, declared duration and container format using lofty.
//! Parsing is blocking, so the default reader runs it on the blocking pool.

use crate::error::MetadataError;
use async_trait::async_trait;
use lofty::file::{FileType, TaggedFileExt};
use lofty::prelude::*;
use lofty::probe::Probe;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// What the metadata reader found in a file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataReport {
    /// At least one tag block with content was present
    pub has_tags: bool,
    pub title: Option<String>,
    /// Duration declared by the container headers, in seconds
    pub declared_duration: Option<f64>,
    /// Container/codec family ("mp3", "flac", "mp4", ...)
    pub codec: Option<String>,
}

impl MetadataReport {
    /// Whether anything usable (title or duration) was parsed
    pub fn is_present(&self) -> bool {
        self.has_tags || self.title.is_some() || self.declared_duration.is_some()
    }
}

/// Source of embedded metadata for the classifier
#[async_trait]
pub trait MetadataReader: Send + Sync {
    async fn read(&self, path: &Path) -> Result<MetadataReport, MetadataError>;
}

/// Default reader backed by lofty
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyMetadataReader;

impl LoftyMetadataReader {
    pub fn new() -> Self {
        Self
    }

    /// Blocking read of one file
    pub fn read_blocking(path: &Path) -> Result<MetadataReport, MetadataError> {
        let file = File::open(path)?;
        let tagged_file = Probe::new(BufReader::new(file))
            .guess_file_type()?
            .read()
            .map_err(|e| MetadataError::Parse(e.to_string()))?;

        let duration = tagged_file.properties().duration().as_secs_f64();
        let declared_duration = (duration > 0.0).then_some(duration);

        let codec = match tagged_file.file_type() {
            FileType::Mpeg => Some("mp3"),
            FileType::Mp4 => Some("mp4"),
            FileType::Aac => Some("aac"),
            FileType::Flac => Some("flac"),
            FileType::Wav => Some("wav"),
            FileType::Vorbis => Some("vorbis"),
            FileType::Opus => Some("opus"),
            FileType::Aiff => Some("aiff"),
            _ => None,
        }
        .map(str::to_string);

        let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());
        let title = tag.and_then(|t| t.title().map(|s| s.to_string()));
        let has_tags = tagged_file.tags().iter().any(|t| !t.is_empty());

        tracing::debug!(
            file = %path.display(),
            has_tags,
            title = ?title,
            duration_s = ?declared_duration,
            codec = ?codec,
            "Read metadata"
        );

        Ok(MetadataReport {
            has_tags,
            title,
            declared_duration,
            codec,
        })
    }
}

#[async_trait]
impl MetadataReader for LoftyMetadataReader {
    async fn read(&self, path: &Path) -> Result<MetadataReport, MetadataError> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::read_blocking(&path))
            .await
            .map_err(|e| MetadataError::Parse(format!("metadata task failed: {}", e)))?
    }
}
