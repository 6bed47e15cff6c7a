//! Manifest track descriptors

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One manifest entry needing verification or replacement
///
/// Read-only input to matching. Durations are in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    #[serde(default)]
    pub persistent_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub expected_size: Option<u64>,
    #[serde(default)]
    pub expected_duration: Option<f64>,
    #[serde(default)]
    pub original_path: Option<PathBuf>,
}

impl TrackDescriptor {
    pub fn new(name: impl Into<String>, artist: impl Into<String>, album: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artist: artist.into(),
            album: album.into(),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.original_path = Some(path.into());
        self
    }

    pub fn with_persistent_id(mut self, id: impl Into<String>) -> Self {
        self.persistent_id = Some(id.into());
        self
    }

    /// Stable identifier used in checkpoints
    ///
    /// Persistent id when known, else the original path, else "artist - name".
    pub fn identifier(&self) -> String {
        if let Some(id) = &self.persistent_id {
            return format!("pid:{}", id);
        }
        if let Some(path) = &self.original_path {
            return format!("path:{}", path.display());
        }
        format!("track:{}", self)
    }

    /// Whether the manifest's recorded location is currently absent
    pub fn is_missing(&self) -> bool {
        match &self.original_path {
            Some(path) => !path.exists(),
            None => true,
        }
    }
}

impl fmt::Display for TrackDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.artist.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} - {}", self.artist, self.name)
        }
    }
}
