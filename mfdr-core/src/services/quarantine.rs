//! Scan decisions, destination planning and the mutator seam
//!
//! The scan only emits [`ScanDecision`]s. Moving, copying and removing tracks
//! from the media library is the job of a [`Mutator`].
//!
//! Destinations:
//! - quarantine: `<quarantine root>/<category bucket>/<file name>`
//! - replacement copy: `<auto-add folder>/<file name>`
//!
//! Name collisions get `_1`, `_2`, ... before the extension, also against
//! destinations already planned in the same scan. A destination that would
//! leave its root is rejected.

use crate::error::ScanError;
use crate::models::{MatchCandidate, QuarantineCategory, TrackDescriptor};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// Action the scan wants performed on one item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScanDecision {
    /// Move a bad file into its quarantine bucket
    Quarantine {
        source: PathBuf,
        category: QuarantineCategory,
        destination: PathBuf,
        /// Source size when classified
        size: u64,
    },
    /// Copy an accepted candidate in place of a missing track
    Replace {
        track: TrackDescriptor,
        source: PathBuf,
        destination: PathBuf,
        score: f64,
    },
    /// Candidates exist but none was accepted automatically
    Review {
        track: TrackDescriptor,
        candidates: Vec<MatchCandidate>,
    },
    /// Nothing resembling the track was found
    Unmatched { track: TrackDescriptor },
}

impl ScanDecision {
    /// Whether a mutator has anything to do for this decision
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Quarantine { .. } | Self::Replace { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Quarantine {
                source,
                category,
                destination,
                ..
            } => format!(
                "quarantine [{}] {} -> {}",
                category,
                source.display(),
                destination.display()
            ),
            Self::Replace {
                track,
                source,
                score,
                ..
            } => format!("replace '{}' with {} (score {:.1})", track, source.display(), score),
            Self::Review { track, candidates } => {
                format!("review '{}': {} candidates", track, candidates.len())
            }
            Self::Unmatched { track } => format!("no match for '{}'", track),
        }
    }
}

/// Performs decided actions outside the core
#[async_trait]
pub trait Mutator: Send + Sync {
    async fn apply(&self, decision: &ScanDecision) -> Result<(), ScanError>;
}

// ============================================================================
// Destination planning
// ============================================================================

/// Collision-free destination paths below one root
struct DestinationPlanner {
    root: PathBuf,
    reserved: Mutex<HashSet<PathBuf>>,
}

impl DestinationPlanner {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            reserved: Mutex::new(HashSet::new()),
        }
    }

    fn plan(&self, subdir: Option<&str>, source: &Path) -> Result<PathBuf, ScanError> {
        let unsafe_destination = || ScanError::UnsafeDestination {
            root: self.root.clone(),
            path: source.to_path_buf(),
        };
        let file_name = source.file_name().ok_or_else(unsafe_destination)?;

        let mut dir = self.root.clone();
        if let Some(subdir) = subdir {
            dir.push(subdir);
        }
        let candidate = dir.join(file_name);
        if !stays_within(&self.root, &candidate) {
            return Err(unsafe_destination());
        }

        let mut reserved = self.reserved.lock().unwrap_or_else(|p| p.into_inner());
        let destination = unique_path(&candidate, |p| p.exists() || reserved.contains(p));
        reserved.insert(destination.clone());
        Ok(destination)
    }
}

/// Lexical containment check: only normal components below `root`
fn stays_within(root: &Path, path: &Path) -> bool {
    match path.strip_prefix(root) {
        Ok(rel) => {
            rel.components().next().is_some()
                && rel.components().all(|c| matches!(c, Component::Normal(_)))
        }
        Err(_) => false,
    }
}

/// First of `path`, `stem_1.ext`, `stem_2.ext`, ... that is not taken
pub fn unique_path(path: &Path, taken: impl Fn(&Path) -> bool) -> PathBuf {
    if !taken(path) {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());
    let mut n = 1u32;
    loop {
        let name = match &ext {
            Some(ext) => format!("{}_{}.{}", stem, n, ext),
            None => format!("{}_{}", stem, n),
        };
        let next = path.with_file_name(name);
        if !taken(&next) {
            return next;
        }
        n += 1;
    }
}

/// Plans `<root>/<bucket>/<file name>` for bad files
pub struct QuarantinePlanner {
    inner: DestinationPlanner,
}

impl QuarantinePlanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: DestinationPlanner::new(root.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Destination for `source`, or `None` for good files
    pub fn plan(&self, source: &Path, category: QuarantineCategory) -> Result<Option<PathBuf>, ScanError> {
        match category.bucket() {
            Some(bucket) => self.inner.plan(Some(bucket), source).map(Some),
            None => Ok(None),
        }
    }
}

/// Plans copies of accepted candidates into the auto-add folder
pub struct ReplacementPlanner {
    inner: DestinationPlanner,
}

impl ReplacementPlanner {
    pub fn new(auto_add_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: DestinationPlanner::new(auto_add_dir.into()),
        }
    }

    pub fn plan(&self, source: &Path) -> Result<PathBuf, ScanError> {
        self.inner.plan(None, source)
    }
}

// ============================================================================
// Filesystem mutator
// ============================================================================

/// Mutator that moves and copies files; it does not touch any media library
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemMutator;

impl FileSystemMutator {
    pub fn new() -> Self {
        Self
    }
}

fn mutation_error(path: &Path, error: std::io::Error) -> ScanError {
    ScanError::Mutation {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}

async fn ensure_parent(path: &Path) -> Result<(), ScanError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| mutation_error(parent, e))?;
    }
    Ok(())
}

#[async_trait]
impl Mutator for FileSystemMutator {
    async fn apply(&self, decision: &ScanDecision) -> Result<(), ScanError> {
        match decision {
            ScanDecision::Quarantine {
                source, destination, ..
            } => {
                ensure_parent(destination).await?;
                if tokio::fs::rename(source, destination).await.is_err() {
                    // Different filesystem: copy then remove
                    tokio::fs::copy(source, destination)
                        .await
                        .map_err(|e| mutation_error(source, e))?;
                    tokio::fs::remove_file(source)
                        .await
                        .map_err(|e| mutation_error(source, e))?;
                }
                tracing::info!(
                    from = %source.display(),
                    to = %destination.display(),
                    "Quarantined file"
                );
            }
            ScanDecision::Replace {
                source, destination, ..
            } => {
                ensure_parent(destination).await?;
                tokio::fs::copy(source, destination)
                    .await
                    .map_err(|e| mutation_error(source, e))?;
                tracing::info!(
                    from = %source.display(),
                    to = %destination.display(),
                    "Copied replacement"
                );
            }
            ScanDecision::Review { .. } | ScanDecision::Unmatched { .. } => {}
        }
        Ok(())
    }
}
