//! Scan checkpoints and cumulative statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of scan a checkpoint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Classify every audio file under a set of roots
    Corruption,
    /// Verify manifest tracks and find replacements for missing ones
    MissingTracks,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Corruption => "corruption",
            Self::MissingTracks => "missing_tracks",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative scan counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatistics {
    /// Items classified or matched
    pub checked: u64,
    /// Files judged good
    pub good: u64,
    /// Files judged bad
    pub bad: u64,
    /// Replacement decisions emitted
    pub replaced: u64,
    /// Quarantine decisions emitted
    pub quarantined: u64,
    /// Items that failed unexpectedly
    pub errors: u64,
    /// Manifest tracks whose file was absent
    #[serde(default)]
    pub missing: u64,
    /// Missing tracks left without an accepted replacement
    #[serde(default)]
    pub unmatched: u64,
}

impl ScanStatistics {
    pub fn display_string(&self) -> String {
        format!(
            "{} checked, {} good, {} bad, {} missing, {} replaced, {} unmatched, {} quarantined, {} errors",
            self.checked,
            self.good,
            self.bad,
            self.missing,
            self.replaced,
            self.unmatched,
            self.quarantined,
            self.errors
        )
    }

    /// Add another set of counters into this one
    pub fn merge(&mut self, other: &ScanStatistics) {
        self.checked += other.checked;
        self.good += other.good;
        self.bad += other.bad;
        self.replaced += other.replaced;
        self.quarantined += other.quarantined;
        self.errors += other.errors;
        self.missing += other.missing;
        self.unmatched += other.unmatched;
    }
}

/// Persisted snapshot of scan progress
///
/// The processed set only ever grows within a session; there is no removal
/// API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanCheckpoint {
    pub scan_key: String,
    pub mode: ScanMode,
    processed: BTreeSet<String>,
    pub statistics: ScanStatistics,
    pub last_saved: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
}

impl ScanCheckpoint {
    pub fn new(scan_key: impl Into<String>, mode: ScanMode) -> Self {
        Self {
            scan_key: scan_key.into(),
            mode,
            processed: BTreeSet::new(),
            statistics: ScanStatistics::default(),
            last_saved: None,
            completed: false,
        }
    }

    /// Record an identifier; returns false if it was already present
    pub fn mark_processed(&mut self, identifier: impl Into<String>) -> bool {
        self.processed.insert(identifier.into())
    }

    pub fn is_processed(&self, identifier: &str) -> bool {
        self.processed.contains(identifier)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn processed(&self) -> impl Iterator<Item = &str> {
        self.processed.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_processed_is_idempotent() {
        let mut checkpoint = ScanCheckpoint::new("key", ScanMode::Corruption);
        assert!(checkpoint.mark_processed("/a.mp3"));
        assert!(!checkpoint.mark_processed("/a.mp3"));
        assert!(checkpoint.is_processed("/a.mp3"));
        assert_eq!(checkpoint.processed_count(), 1);
    }

    #[test]
    fn test_json_round_trip_is_lossless() {
        let mut checkpoint = ScanCheckpoint::new("abc", ScanMode::MissingTracks);
        checkpoint.mark_processed("pid:1");
        checkpoint.mark_processed("pid:2");
        checkpoint.statistics.checked = 2;
        checkpoint.statistics.missing = 1;
        checkpoint.last_saved = Some(Utc::now());

        let json = serde_json::to_string(&checkpoint).unwrap();
        let restored: ScanCheckpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, checkpoint);
    }

    #[test]
    fn test_merge_adds_every_counter() {
        let mut total = ScanStatistics {
            checked: 1,
            good: 1,
            ..Default::default()
        };
        total.merge(&ScanStatistics {
            checked: 1,
            bad: 1,
            quarantined: 1,
            ..Default::default()
        });
        assert_eq!(total.checked, 2);
        assert_eq!(total.good, 1);
        assert_eq!(total.bad, 1);
        assert_eq!(total.quarantined, 1);
    }

    #[test]
    fn test_older_statistics_without_extra_counters_load() {
        let json = r#"{"checked":3,"good":2,"bad":1,"replaced":0,"quarantined":1,"errors":0}"#;
        let stats: ScanStatistics = serde_json::from_str(json).unwrap();
        assert_eq!(stats.checked, 3);
        assert_eq!(stats.missing, 0);
    }
}
