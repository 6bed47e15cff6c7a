//! Scan configuration
//!
//! Extends the shared bootstrap TOML with a `[scan]` table:
//!
//! ```toml
//! state_folder = "/var/lib/mfdr"
//!
//! [logging]
//! level = "debug"
//!
//! [scan]
//! auto_accept_threshold = 90.0
//! checkpoint_interval = 50
//! fast = true
//! ```

use mfdr_common::config::{load_or_default, load_toml, TomlConfig};
use mfdr_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full configuration file: bootstrap settings plus the `[scan]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MfdrConfig {
    #[serde(flatten)]
    pub base: TomlConfig,

    #[serde(default)]
    pub scan: ScanConfig,
}

impl MfdrConfig {
    /// Load a discovered config file (defaults when absent or unreadable), then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = load_or_default(path);
        config.scan.validate()?;
        Ok(config)
    }

    /// Load a file the user named; missing or malformed files are errors
    pub fn load_required(path: &Path) -> Result<Self> {
        let config: Self = load_toml(path)?;
        config.scan.validate()?;
        Ok(config)
    }
}

/// Tunables for classification, matching and the scan loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Best score at or above which a candidate is accepted outright
    pub auto_accept_threshold: f64,
    /// Lone candidate scoring above this is accepted
    pub single_candidate_floor: f64,
    /// Items between checkpoint saves
    pub checkpoint_interval: usize,
    /// Upper bound on candidates returned per track
    pub max_results: usize,
    /// Files smaller than this (bytes) are corrupt without probing
    pub min_file_size: u64,
    /// Allowed relative deviation between declared and probed duration
    pub duration_tolerance: f64,
    /// Relative size deviation still earning full size credit
    pub size_tolerance: f64,
    pub probe_timeout_min_secs: u64,
    pub probe_timeout_max_secs: u64,
    /// Concurrent classifications (1 = sequential)
    pub workers: usize,
    /// Maximum directory depth below a search root
    pub max_depth: usize,
    /// Report decisions without invoking the mutator
    pub dry_run: bool,
    /// Skip full decode and treat metadata as advisory
    pub fast: bool,
    /// In missing-track scans, skip tracks whose file still exists
    pub missing_only: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            auto_accept_threshold: 88.0,
            single_candidate_floor: 70.0,
            checkpoint_interval: 100,
            max_results: 10,
            min_file_size: 51_200,
            duration_tolerance: 0.10,
            size_tolerance: 0.10,
            probe_timeout_min_secs: 5,
            probe_timeout_max_secs: 30,
            workers: 1,
            max_depth: 20,
            dry_run: false,
            fast: false,
            missing_only: false,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(self.auto_accept_threshold) {
            return Err(Error::Config(format!(
                "auto_accept_threshold must be within 0-100, got {}",
                self.auto_accept_threshold
            )));
        }
        if !in_range(self.single_candidate_floor) {
            return Err(Error::Config(format!(
                "single_candidate_floor must be within 0-100, got {}",
                self.single_candidate_floor
            )));
        }
        if self.single_candidate_floor > self.auto_accept_threshold {
            return Err(Error::Config(format!(
                "single_candidate_floor ({}) above auto_accept_threshold ({})",
                self.single_candidate_floor, self.auto_accept_threshold
            )));
        }
        if self.checkpoint_interval == 0 {
            return Err(Error::Config("checkpoint_interval must be positive".into()));
        }
        if self.max_results == 0 {
            return Err(Error::Config("max_results must be positive".into()));
        }
        if self.workers == 0 {
            return Err(Error::Config("workers must be positive".into()));
        }
        if self.duration_tolerance < 0.0 || self.size_tolerance < 0.0 {
            return Err(Error::Config("tolerances must not be negative".into()));
        }
        if self.probe_timeout_min_secs > self.probe_timeout_max_secs {
            return Err(Error::Config(format!(
                "probe_timeout_min_secs ({}) above probe_timeout_max_secs ({})",
                self.probe_timeout_min_secs, self.probe_timeout_max_secs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.auto_accept_threshold, 88.0);
        assert_eq!(config.single_candidate_floor, 70.0);
        assert_eq!(config.checkpoint_interval, 100);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ScanConfig {
            auto_accept_threshold: 120.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.auto_accept_threshold = 60.0;
        assert!(config.validate().is_err(), "floor above threshold");

        config = ScanConfig {
            checkpoint_interval: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config = ScanConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scan_table_loads_with_partial_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "state_folder = \"/tmp/mfdr\"\n\n[scan]\nauto_accept_threshold = 90.0\nfast = true\n",
        )
        .unwrap();

        let config = MfdrConfig::load(Some(&path)).unwrap();
        assert_eq!(config.base.state_folder.as_deref(), Some(Path::new("/tmp/mfdr")));
        assert_eq!(config.scan.auto_accept_threshold, 90.0);
        assert!(config.scan.fast);
        assert_eq!(config.scan.max_results, 10);
    }

    #[test]
    fn test_named_config_with_typo_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[scan]\ndry_run = true\nfast = yes\n").unwrap();

        assert!(matches!(MfdrConfig::load_required(&path), Err(Error::Config(_))));
        assert!(MfdrConfig::load_required(&temp_dir.path().join("missing.toml")).is_err());

        // A discovered file falls back to defaults
        let config = MfdrConfig::load(Some(&path)).unwrap();
        assert!(!config.scan.dry_run);
    }

    #[test]
    fn test_invalid_scan_table_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[scan]\nmax_results = 0\n").unwrap();
        assert!(MfdrConfig::load(Some(&path)).is_err());
    }
}
