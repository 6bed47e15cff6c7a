//! Fingerprint-keyed verdict cache
//!
//! Verdicts are memoized per path together with the (size, mtime)
//! fingerprint they were computed for. A lookup with a different fingerprint
//! replaces the slot, so a changed file is re-classified without any
//! invalidation events.
//!
//! Each slot holds a `tokio::sync::OnceCell`: concurrent requests for the same
//! unchanged file wait on one in-flight classification instead of starting
//! their own. Failed classifications are not cached.

use crate::error::ScanError;
use crate::models::{FileFingerprint, IntegrityVerdict};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;

struct Slot {
    fingerprint: FileFingerprint,
    cell: Arc<OnceCell<IntegrityVerdict>>,
}

/// Hit/miss counters for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Per-scan verdict cache, safe to share between workers
#[derive(Default)]
pub struct FingerprintCache {
    slots: Mutex<HashMap<PathBuf, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Slot for (path, fingerprint), replacing a stale one
    fn cell_for(&self, path: &Path, fingerprint: FileFingerprint) -> Arc<OnceCell<IntegrityVerdict>> {
        let mut slots = self.lock();
        let stale = match slots.get(path) {
            Some(slot) if slot.fingerprint == fingerprint => return Arc::clone(&slot.cell),
            Some(_) => true,
            None => false,
        };
        if stale {
            tracing::debug!(file = %path.display(), "File changed, dropping cached verdict");
        }
        let cell = Arc::new(OnceCell::new());
        slots.insert(
            path.to_path_buf(),
            Slot {
                fingerprint,
                cell: Arc::clone(&cell),
            },
        );
        cell
    }

    /// Return the cached verdict or run `classify` once to produce it
    pub async fn get_or_classify<F, Fut>(
        &self,
        path: &Path,
        fingerprint: FileFingerprint,
        classify: F,
    ) -> Result<IntegrityVerdict, ScanError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IntegrityVerdict, ScanError>>,
    {
        let cell = self.cell_for(path, fingerprint);
        if let Some(verdict) = cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(verdict.clone());
        }

        let mut ran = false;
        let verdict = cell
            .get_or_try_init(|| {
                ran = true;
                classify()
            })
            .await?;

        if ran {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(verdict.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
