//! Integrity verdicts produced by the classifier

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a file was judged bad; doubles as the quarantine bucket selector
///
/// Declaration order is the classifier's stage priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineCategory {
    None,
    Drm,
    NoMetadata,
    Truncated,
    Corrupted,
}

impl QuarantineCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Drm => "drm",
            Self::NoMetadata => "no_metadata",
            Self::Truncated => "truncated",
            Self::Corrupted => "corrupted",
        }
    }

    /// Quarantine sub-folder for this category (`None` has no bucket)
    pub fn bucket(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            other => Some(other.as_str()),
        }
    }
}

impl fmt::Display for QuarantineCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Individual classifier checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityCheck {
    /// File is at least the minimum plausible audio size
    SizeGate,
    /// Neither a DRM-only container nor a DRM codec
    DrmGate,
    /// Embedded metadata could be parsed
    MetadataPresent,
    /// Declared and probed durations agree
    DurationConsistent,
    /// Final segment decodes (full mode)
    EndOfStreamDecode,
    /// Final segment can be seeked to (fast mode)
    EndOfStreamSeek,
}

impl IntegrityCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SizeGate => "size_gate",
            Self::DrmGate => "drm_gate",
            Self::MetadataPresent => "metadata_present",
            Self::DurationConsistent => "duration_consistent",
            Self::EndOfStreamDecode => "end_of_stream_decode",
            Self::EndOfStreamSeek => "end_of_stream_seek",
        }
    }
}

impl fmt::Display for IntegrityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one file
///
/// Never mutated after creation: a changed file gets a new verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityVerdict {
    is_good: bool,
    checks_passed: Vec<IntegrityCheck>,
    checks_failed: Vec<IntegrityCheck>,
    warnings: Vec<String>,
    category: QuarantineCategory,
}

impl IntegrityVerdict {
    pub(crate) fn builder() -> VerdictBuilder {
        VerdictBuilder::default()
    }

    pub fn is_good(&self) -> bool {
        self.is_good
    }

    pub fn checks_passed(&self) -> &[IntegrityCheck] {
        &self.checks_passed
    }

    pub fn checks_failed(&self) -> &[IntegrityCheck] {
        &self.checks_failed
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn category(&self) -> QuarantineCategory {
        self.category
    }

    pub fn passed(&self, check: IntegrityCheck) -> bool {
        self.checks_passed.contains(&check)
    }

    pub fn failed(&self, check: IntegrityCheck) -> bool {
        self.checks_failed.contains(&check)
    }

    /// One-line description for logs and reports
    pub fn summary(&self) -> String {
        if self.is_good {
            return format!("good ({} checks passed)", self.checks_passed.len());
        }
        let failed: Vec<&str> = self.checks_failed.iter().map(|c| c.as_str()).collect();
        format!("bad [{}]: {}", self.category, failed.join(", "))
    }
}

/// Accumulating result used while the classifier stages run
#[derive(Debug, Default)]
pub(crate) struct VerdictBuilder {
    checks_passed: Vec<IntegrityCheck>,
    checks_failed: Vec<IntegrityCheck>,
    warnings: Vec<String>,
    category: Option<QuarantineCategory>,
}

impl VerdictBuilder {
    pub(crate) fn pass(&mut self, check: IntegrityCheck) {
        if !self.checks_passed.contains(&check) && !self.checks_failed.contains(&check) {
            self.checks_passed.push(check);
        }
    }

    /// Record a failed check; the first category reported sticks
    pub(crate) fn fail(&mut self, check: IntegrityCheck, category: Option<QuarantineCategory>) {
        self.checks_passed.retain(|c| *c != check);
        if !self.checks_failed.contains(&check) {
            self.checks_failed.push(check);
        }
        if self.category.is_none() {
            self.category = category;
        }
    }

    pub(crate) fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    pub(crate) fn category(&self) -> Option<QuarantineCategory> {
        self.category
    }

    pub(crate) fn finish(self) -> IntegrityVerdict {
        let category = self.category.unwrap_or(QuarantineCategory::None);
        IntegrityVerdict {
            is_good: category == QuarantineCategory::None,
            checks_passed: self.checks_passed,
            checks_failed: self.checks_failed,
            warnings: self.warnings,
            category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_category_wins() {
        let mut builder = IntegrityVerdict::builder();
        builder.pass(IntegrityCheck::SizeGate);
        builder.fail(IntegrityCheck::DrmGate, Some(QuarantineCategory::Drm));
        builder.fail(IntegrityCheck::EndOfStreamDecode, Some(QuarantineCategory::Corrupted));
        let verdict = builder.finish();

        assert!(!verdict.is_good());
        assert_eq!(verdict.category(), QuarantineCategory::Drm);
        assert_eq!(
            verdict.checks_failed(),
            &[IntegrityCheck::DrmGate, IntegrityCheck::EndOfStreamDecode]
        );
        assert_eq!(verdict.checks_passed(), &[IntegrityCheck::SizeGate]);
    }

    #[test]
    fn test_advisory_failure_keeps_file_good() {
        let mut builder = IntegrityVerdict::builder();
        builder.fail(IntegrityCheck::MetadataPresent, None);
        builder.warn("no tags");
        builder.warn("no tags");
        let verdict = builder.finish();

        assert!(verdict.is_good());
        assert!(verdict.failed(IntegrityCheck::MetadataPresent));
        assert_eq!(verdict.warnings().len(), 1);
        assert_eq!(verdict.category(), QuarantineCategory::None);
    }

    #[test]
    fn test_category_buckets() {
        assert_eq!(QuarantineCategory::None.bucket(), None);
        assert_eq!(QuarantineCategory::NoMetadata.bucket(), Some("no_metadata"));
        assert_eq!(
            serde_json::to_string(&QuarantineCategory::Truncated).unwrap(),
            "\"truncated\""
        );
    }
}
