//! Integrity classifier
//!
//! Decides whether an audio file is usable. Cheap checks run first and the
//! first failing stage decides the quarantine category.
//!
//! **Algorithm:**
//! 1. Size gate: below the minimum size the file is `corrupted`, nothing is probed
//! 2. DRM gate: DRM-only container extension, then DRM codec tags from the probe
//! 3. Metadata presence: `no_metadata` in full mode, advisory in fast mode
//! 4. Duration consistency (full mode): declared vs probed, beyond tolerance is `truncated`
//! 5. End of stream: tail decode (full) or tail seek (fast); failure or timeout is `corrupted`
//!
//! A missing or broken prober only produces warnings; the verdict then rests
//! on the remaining stages. Verdicts are cached per file fingerprint.

use crate::config::ScanConfig;
use crate::error::{MetadataError, ProbeError, ScanError};
use crate::models::verdict::VerdictBuilder;
use crate::models::{AudioFileRef, FileFingerprint, IntegrityCheck, IntegrityVerdict, QuarantineCategory};
use crate::services::fingerprint_cache::FingerprintCache;
use crate::services::media_prober::{MediaProber, ProbeDepth, ProbeReport};
use crate::services::metadata_reader::{MetadataReader, MetadataReport};
use mfdr_common::human_size::format_size;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Codec tags of DRM-protected streams
pub const DRM_CODEC_TAGS: &[&str] = &["drms", "drmi", "drac"];

/// Bytes of file per extra second of probe timeout
const TIMEOUT_BYTES_PER_SECOND: u64 = 5 * 1024 * 1024;

/// Classification depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifyMode {
    /// All stages, metadata mandatory
    #[default]
    Full,
    /// Size and DRM gates plus a tail seek; metadata advisory
    Fast,
}

/// Classifier tunables
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierOptions {
    pub mode: ClassifyMode,
    pub min_file_size: u64,
    pub duration_tolerance: f64,
    pub probe_timeout_min: Duration,
    pub probe_timeout_max: Duration,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

impl ClassifierOptions {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            mode: if config.fast {
                ClassifyMode::Fast
            } else {
                ClassifyMode::Full
            },
            min_file_size: config.min_file_size,
            duration_tolerance: config.duration_tolerance,
            probe_timeout_min: Duration::from_secs(config.probe_timeout_min_secs),
            probe_timeout_max: Duration::from_secs(config.probe_timeout_max_secs),
        }
    }

    /// Probe timeout for a file: minimum plus 1 s per 5 MB, capped at the maximum
    pub fn probe_timeout(&self, size: u64) -> Duration {
        let scaled = self.probe_timeout_min + Duration::from_secs(size / TIMEOUT_BYTES_PER_SECOND);
        scaled.min(self.probe_timeout_max)
    }
}

// ============================================================================
// Stage plumbing
// ============================================================================

enum Flow {
    Continue,
    Stop,
}

/// What the prober said, with failures already sorted by severity
enum ProbeOutcome {
    Report(ProbeReport),
    TimedOut(Duration),
    Unavailable(String),
}

struct StageContext<'a> {
    file: &'a AudioFileRef,
    options: &'a ClassifierOptions,
}

fn size_gate(ctx: &StageContext<'_>, verdict: &mut VerdictBuilder) -> Flow {
    if ctx.file.size < ctx.options.min_file_size {
        verdict.fail(IntegrityCheck::SizeGate, Some(QuarantineCategory::Corrupted));
        verdict.warn(format!(
            "file is {}, below the {} minimum",
            format_size(ctx.file.size),
            format_size(ctx.options.min_file_size)
        ));
        return Flow::Stop;
    }
    verdict.pass(IntegrityCheck::SizeGate);
    Flow::Continue
}

fn drm_extension_gate(ctx: &StageContext<'_>, verdict: &mut VerdictBuilder) -> Flow {
    if ctx.file.is_drm_container() {
        verdict.fail(IntegrityCheck::DrmGate, Some(QuarantineCategory::Drm));
        verdict.warn(format!(".{} files are DRM protected", ctx.file.extension));
        return Flow::Stop;
    }
    Flow::Continue
}

fn drm_codec_gate(probe: &ProbeOutcome, verdict: &mut VerdictBuilder) -> Flow {
    if let ProbeOutcome::Report(report) = probe {
        if let Some(tag) = report
            .codecs
            .iter()
            .find(|codec| DRM_CODEC_TAGS.contains(&codec.as_str()))
        {
            verdict.fail(IntegrityCheck::DrmGate, Some(QuarantineCategory::Drm));
            verdict.warn(format!("DRM codec '{}'", tag));
            return Flow::Stop;
        }
    }
    verdict.pass(IntegrityCheck::DrmGate);
    Flow::Continue
}

fn metadata_stage(
    ctx: &StageContext<'_>,
    metadata: &Result<MetadataReport, ScanError>,
    verdict: &mut VerdictBuilder,
) -> Flow {
    let problem = match metadata {
        Ok(report) if report.is_present() => None,
        Ok(_) => Some("no embedded metadata".to_string()),
        Err(error) => Some(error.to_string()),
    };
    let Some(problem) = problem else {
        verdict.pass(IntegrityCheck::MetadataPresent);
        return Flow::Continue;
    };

    verdict.warn(problem);
    match ctx.options.mode {
        ClassifyMode::Full => {
            verdict.fail(IntegrityCheck::MetadataPresent, Some(QuarantineCategory::NoMetadata));
            Flow::Stop
        }
        ClassifyMode::Fast => {
            verdict.fail(IntegrityCheck::MetadataPresent, None);
            Flow::Continue
        }
    }
}

fn duration_stage(
    ctx: &StageContext<'_>,
    metadata: &Result<MetadataReport, ScanError>,
    probe: &ProbeOutcome,
    verdict: &mut VerdictBuilder,
) -> Flow {
    let declared = metadata.as_ref().ok().and_then(|m| m.declared_duration);
    let probed = match probe {
        ProbeOutcome::Report(report) => report.duration,
        _ => None,
    };
    let (Some(declared), Some(probed)) = (declared, probed) else {
        verdict.warn("duration unavailable, consistency not checked");
        return Flow::Continue;
    };

    let deviation = relative_deviation(declared, probed);
    if deviation > ctx.options.duration_tolerance {
        verdict.fail(IntegrityCheck::DurationConsistent, Some(QuarantineCategory::Truncated));
        verdict.warn(format!(
            "declared duration {:.1}s but stream holds {:.1}s ({:.0}% off)",
            declared,
            probed,
            deviation * 100.0
        ));
        return Flow::Stop;
    }
    verdict.pass(IntegrityCheck::DurationConsistent);
    Flow::Continue
}

fn end_of_stream_stage(ctx: &StageContext<'_>, probe: &ProbeOutcome, verdict: &mut VerdictBuilder) {
    let check = match ctx.options.mode {
        ClassifyMode::Full => IntegrityCheck::EndOfStreamDecode,
        ClassifyMode::Fast => IntegrityCheck::EndOfStreamSeek,
    };
    match probe {
        ProbeOutcome::Report(report) if report.decodable => verdict.pass(check),
        ProbeOutcome::Report(report) => {
            verdict.fail(check, Some(QuarantineCategory::Corrupted));
            verdict.warn(
                report
                    .detail
                    .clone()
                    .unwrap_or_else(|| "end of stream not decodable".to_string()),
            );
        }
        ProbeOutcome::TimedOut(timeout) => {
            verdict.fail(check, Some(QuarantineCategory::Corrupted));
            verdict.warn(format!("end-of-stream probe timed out after {}s", timeout.as_secs()));
        }
        ProbeOutcome::Unavailable(reason) => {
            verdict.warn(format!("{} skipped: {}", check, reason));
        }
    }
}

/// |declared - probed| relative to the declared duration
fn relative_deviation(declared: f64, probed: f64) -> f64 {
    if declared <= 0.0 {
        return 0.0;
    }
    (declared - probed).abs() / declared
}

// ============================================================================
// Classifier
// ============================================================================

/// Staged file classifier with its own verdict cache
pub struct IntegrityClassifier {
    prober: Arc<dyn MediaProber>,
    reader: Arc<dyn MetadataReader>,
    cache: FingerprintCache,
    options: ClassifierOptions,
}

impl IntegrityClassifier {
    pub fn new(
        prober: Arc<dyn MediaProber>,
        reader: Arc<dyn MetadataReader>,
        options: ClassifierOptions,
    ) -> Self {
        Self {
            prober,
            reader,
            cache: FingerprintCache::new(),
            options,
        }
    }

    pub fn options(&self) -> &ClassifierOptions {
        &self.options
    }

    pub fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    /// Snapshot and classify a file by path
    pub async fn classify_path(&self, path: &Path) -> Result<IntegrityVerdict, ScanError> {
        let file = AudioFileRef::from_path(path).map_err(|source| ScanError::IoUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        self.classify(&file).await
    }

    /// Classify a file, reusing the cached verdict while it is unchanged
    ///
    /// The fingerprint is re-read at call time so a snapshot taken earlier
    /// never masks a later change.
    pub async fn classify(&self, file: &AudioFileRef) -> Result<IntegrityVerdict, ScanError> {
        let metadata = tokio::fs::metadata(&file.path)
            .await
            .map_err(|source| ScanError::IoUnavailable {
                path: file.path.clone(),
                source,
            })?;
        let current = FileFingerprint::from_metadata(&metadata);
        let file = if current == file.fingerprint() {
            file.clone()
        } else {
            tracing::debug!(file = %file.path.display(), "Snapshot is stale, using current state");
            AudioFileRef::from_metadata(&file.path, &metadata)
        };

        self.cache
            .get_or_classify(&file.path, current, || self.run_stages(&file))
            .await
    }

    async fn run_stages(&self, file: &AudioFileRef) -> Result<IntegrityVerdict, ScanError> {
        let ctx = StageContext {
            file,
            options: &self.options,
        };
        let mut verdict = IntegrityVerdict::builder();

        if let Flow::Stop = size_gate(&ctx, &mut verdict) {
            return Ok(self.finish(file, verdict));
        }
        if let Flow::Stop = drm_extension_gate(&ctx, &mut verdict) {
            return Ok(self.finish(file, verdict));
        }

        let probe = self.probe(file).await;
        if let Flow::Stop = drm_codec_gate(&probe, &mut verdict) {
            return Ok(self.finish(file, verdict));
        }

        let metadata = match self.reader.read(&file.path).await {
            Ok(report) => Ok(report),
            // Gone since the fingerprint was taken
            Err(MetadataError::Io(source)) if source.kind() == std::io::ErrorKind::NotFound => {
                return Err(ScanError::IoUnavailable {
                    path: file.path.clone(),
                    source,
                });
            }
            Err(e) => {
                let error = ScanError::MetadataUnreadable {
                    path: file.path.clone(),
                    reason: e.to_string(),
                };
                tracing::debug!(error = %error, "Metadata check failed");
                Err(error)
            }
        };
        if let Flow::Stop = metadata_stage(&ctx, &metadata, &mut verdict) {
            return Ok(self.finish(file, verdict));
        }

        if self.options.mode == ClassifyMode::Full {
            if let Flow::Stop = duration_stage(&ctx, &metadata, &probe, &mut verdict) {
                return Ok(self.finish(file, verdict));
            }
        }

        end_of_stream_stage(&ctx, &probe, &mut verdict);
        Ok(self.finish(file, verdict))
    }

    async fn probe(&self, file: &AudioFileRef) -> ProbeOutcome {
        let (depth, stage) = match self.options.mode {
            ClassifyMode::Full => (ProbeDepth::Decode, IntegrityCheck::EndOfStreamDecode),
            ClassifyMode::Fast => (ProbeDepth::Seek, IntegrityCheck::EndOfStreamSeek),
        };
        let timeout = self.options.probe_timeout(file.size);

        match self.prober.probe(&file.path, depth, timeout).await {
            Ok(report) => ProbeOutcome::Report(report),
            Err(ProbeError::Timeout(timeout)) => ProbeOutcome::TimedOut(timeout),
            Err(error) => {
                let error = ScanError::from_probe(error, file.path.clone(), stage);
                tracing::warn!(
                    file = %file.path.display(),
                    stage = %stage,
                    error = %error,
                    "Prober unavailable, continuing with metadata-only judgment"
                );
                ProbeOutcome::Unavailable(error.to_string())
            }
        }
    }

    fn finish(&self, file: &AudioFileRef, verdict: VerdictBuilder) -> IntegrityVerdict {
        let verdict = verdict.finish();
        if verdict.is_good() {
            tracing::debug!(file = %file.path.display(), "{}", verdict.summary());
        } else {
            tracing::info!(
                file = %file.path.display(),
                category = %verdict.category(),
                "{}",
                verdict.summary()
            );
        }
        verdict
    }
}
