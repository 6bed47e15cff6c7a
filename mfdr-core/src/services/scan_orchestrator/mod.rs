//! Resumable scan orchestrator
//!
//! Drives one scan from start to a terminal state:
//!
//! - **Corruption scan:** every audio file under a set of roots goes through
//!   the integrity classifier; bad files get a quarantine decision.
//! - **Missing-track scan:** every manifest track is checked. Tracks whose
//!   file exists are classified like above (unless `missing_only`); missing
//!   tracks are matched against a candidate index built from search roots.
//!
//! Progress lives in a [`ScanCheckpoint`] keyed by [`scan_key`]. Items already
//! in the checkpoint are skipped, so a cancelled scan picks up where it
//! stopped and a completed scan re-run processes nothing.
//!
//! Items may be processed by a bounded number of concurrent workers; results
//! are folded back in item order so statistics and checkpoints are the same
//! as a sequential run.

mod state;

pub use state::{scan_key, ScanSession, ScanState, StateTransition};

use crate::config::ScanConfig;
use crate::error::{CheckpointError, IndexWarning, ScanError};
use crate::models::{AudioFileRef, ScanCheckpoint, ScanMode, ScanStatistics, TrackDescriptor};
use crate::services::candidate_indexer::{CandidateIndex, CandidateIndexer};
use crate::services::checkpoint_store::CheckpointStore;
use crate::services::integrity_classifier::{ClassifierOptions, IntegrityClassifier};
use crate::services::manifest_reader::ManifestReader;
use crate::services::media_prober::MediaProber;
use crate::services::metadata_reader::MetadataReader;
use crate::services::quarantine::{Mutator, QuarantinePlanner, ReplacementPlanner, ScanDecision};
use crate::services::track_matcher::{MatcherOptions, TrackMatcher};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Scan loop tunables
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    /// Items between checkpoint saves
    pub checkpoint_interval: usize,
    /// Concurrent item workers (1 = sequential)
    pub workers: usize,
    pub max_results: usize,
    /// Emit decisions without calling the mutator
    pub dry_run: bool,
    pub missing_only: bool,
    /// Continue from a stored checkpoint instead of starting over
    pub resume: bool,
    /// Stop after this many items in one invocation
    pub limit: Option<usize>,
}

impl ScanOptions {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            checkpoint_interval: config.checkpoint_interval,
            workers: config.workers,
            max_results: config.max_results,
            dry_run: config.dry_run,
            missing_only: config.missing_only,
            resume: true,
            limit: None,
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

/// Result of one scan invocation
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub scan_key: String,
    pub mode: ScanMode,
    /// `Completed` or `Interrupted`
    pub state: ScanState,
    /// Cumulative over every invocation of this scan
    pub statistics: ScanStatistics,
    /// Items handled by this invocation
    pub processed: usize,
    /// Decisions carried out (or reported, in a dry run) by this invocation, in item order
    pub decisions: Vec<ScanDecision>,
    pub warnings: Vec<IndexWarning>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ScanReport {
    pub fn is_completed(&self) -> bool {
        self.state == ScanState::Completed
    }

    /// Bytes moved to quarantine by this invocation
    pub fn quarantined_bytes(&self) -> u64 {
        self.decisions
            .iter()
            .map(|d| match d {
                ScanDecision::Quarantine { size, .. } => *size,
                _ => 0,
            })
            .sum()
    }
}

/// One unit of scan work
enum ScanItem {
    File(AudioFileRef),
    Track(TrackDescriptor),
}

impl ScanItem {
    fn identifier(&self) -> String {
        match self {
            ScanItem::File(file) => file_identifier(&file.path),
            ScanItem::Track(track) => track.identifier(),
        }
    }
}

fn file_identifier(path: &Path) -> String {
    path.display().to_string()
}

/// What processing one item produced
struct ItemOutcome {
    identifier: String,
    delta: ScanStatistics,
    decision: Option<ScanDecision>,
    failure: Option<ScanError>,
}

/// Scan driver owning its collaborators for the duration of a scan
pub struct ScanOrchestrator {
    classifier: IntegrityClassifier,
    matcher: TrackMatcher,
    indexer: CandidateIndexer,
    store: Arc<dyn CheckpointStore>,
    mutator: Option<Arc<dyn Mutator>>,
    quarantine: Option<QuarantinePlanner>,
    replacement: Option<ReplacementPlanner>,
    options: ScanOptions,
}

impl ScanOrchestrator {
    pub fn new(classifier: IntegrityClassifier, store: Arc<dyn CheckpointStore>, options: ScanOptions) -> Self {
        Self {
            classifier,
            matcher: TrackMatcher::default(),
            indexer: CandidateIndexer::new(),
            store,
            mutator: None,
            quarantine: None,
            replacement: None,
            options,
        }
    }

    /// Wire every component from one scan configuration
    pub fn from_config(
        config: &ScanConfig,
        prober: Arc<dyn MediaProber>,
        reader: Arc<dyn MetadataReader>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        let classifier = IntegrityClassifier::new(prober, reader, ClassifierOptions::from_config(config));
        Self::new(classifier, store, ScanOptions::from_config(config))
            .with_matcher(TrackMatcher::new(MatcherOptions::from_config(config)))
            .with_indexer(CandidateIndexer::new().with_max_depth(config.max_depth))
    }

    pub fn with_matcher(mut self, matcher: TrackMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_indexer(mut self, indexer: CandidateIndexer) -> Self {
        self.indexer = indexer;
        self
    }

    pub fn with_mutator(mut self, mutator: Arc<dyn Mutator>) -> Self {
        self.mutator = Some(mutator);
        self
    }

    /// Plan quarantine destinations for bad files under `planner`'s root
    pub fn with_quarantine(mut self, planner: QuarantinePlanner) -> Self {
        self.quarantine = Some(planner);
        self
    }

    /// Copy accepted replacements into `planner`'s folder
    pub fn with_replacement(mut self, planner: ReplacementPlanner) -> Self {
        self.replacement = Some(planner);
        self
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn classifier(&self) -> &IntegrityClassifier {
        &self.classifier
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Classify every audio file under `roots`
    pub async fn scan_directories(
        &self,
        roots: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<ScanReport, ScanError> {
        if roots.is_empty() {
            return Err(ScanError::Config("no scan roots given".into()));
        }
        let targets: Vec<String> = roots.iter().map(|r| format!("root:{}", target_path(r))).collect();
        let session = self.open_session(ScanMode::Corruption, &targets).await?;
        if session.checkpoint.completed {
            return Ok(self.already_completed(session));
        }

        let done = processed_set(&session.checkpoint);
        let mut walk = self.indexer.walk(roots);
        let items = walk
            .by_ref()
            .filter(move |file| !done.contains(&file_identifier(&file.path)))
            .map(ScanItem::File);
        let empty = CandidateIndex::from_files(Vec::new());
        let mut report = self.drive(session, items, &empty, cancel).await;
        report.warnings = walk.into_warnings();
        Ok(report)
    }

    /// Verify manifest tracks and look for replacements of missing ones under `search_roots`
    pub async fn scan_manifest(
        &self,
        manifest: &dyn ManifestReader,
        search_roots: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<ScanReport, ScanError> {
        let mut targets = vec![format!("manifest:{}", manifest.identity())];
        targets.extend(search_roots.iter().map(|r| format!("root:{}", target_path(r))));
        let session = self.open_session(ScanMode::MissingTracks, &targets).await?;
        if session.checkpoint.completed {
            return Ok(self.already_completed(session));
        }

        let tracks = manifest.read().await?;
        let index = self.indexer.index(search_roots);
        let done = processed_set(&session.checkpoint);
        let items = tracks
            .into_iter()
            .filter(move |track| !done.contains(&track.identifier()))
            .map(ScanItem::Track);
        let mut report = self.drive(session, items, &index, cancel).await;
        report.warnings = index.warnings().to_vec();
        Ok(report)
    }

    // ========================================================================
    // Session handling
    // ========================================================================

    async fn open_session(&self, mode: ScanMode, targets: &[String]) -> Result<ScanSession, ScanError> {
        let key = scan_key(mode, targets);
        let stored = if self.options.resume {
            self.load_checkpoint(&key).await?
        } else {
            None
        };

        let checkpoint = match stored {
            Some(checkpoint) if checkpoint.mode == mode => {
                tracing::info!(
                    scan_key = %key,
                    processed = checkpoint.processed_count(),
                    completed = checkpoint.completed,
                    "Resuming scan from checkpoint"
                );
                checkpoint
            }
            _ => {
                tracing::info!(scan_key = %key, mode = %mode, "Starting new scan");
                ScanCheckpoint::new(key, mode)
            }
        };
        Ok(ScanSession::new(checkpoint))
    }

    /// Stored checkpoint; unusable records mean a fresh start, store I/O failure aborts
    async fn load_checkpoint(&self, key: &str) -> Result<Option<ScanCheckpoint>, ScanError> {
        match self.store.load(key).await {
            Ok(checkpoint) => Ok(checkpoint),
            Err(e @ (CheckpointError::KeyMismatch { .. } | CheckpointError::Serialization(_))) => {
                tracing::warn!(scan_key = %key, error = %e, "Ignoring unusable checkpoint");
                Ok(None)
            }
            Err(e) => Err(ScanError::Store(e)),
        }
    }

    fn already_completed(&self, mut session: ScanSession) -> ScanReport {
        tracing::info!(
            scan_key = %session.scan_key(),
            "Scan already completed: {}",
            session.checkpoint.statistics.display_string()
        );
        session.transition_to(ScanState::Completed);
        build_report(session, Vec::new())
    }

    async fn persist(&self, session: &mut ScanSession) {
        session.checkpoint.last_saved = Some(Utc::now());
        let key = session.scan_key().to_string();
        if let Err(source) = self.store.save(&key, &session.checkpoint).await {
            let error = ScanError::CheckpointWriteFailure { scan_key: key, source };
            tracing::error!(error = %error, "Checkpoint not saved, scan continues");
        }
    }

    // ========================================================================
    // Scan loop
    // ========================================================================

    async fn drive<I>(
        &self,
        mut session: ScanSession,
        items: I,
        index: &CandidateIndex,
        cancel: &CancellationToken,
    ) -> ScanReport
    where
        I: Iterator<Item = ScanItem>,
    {
        session.transition_to(ScanState::Scanning);
        let interval = self.options.checkpoint_interval.max(1);
        let limit = self.options.limit.unwrap_or(usize::MAX);
        let mut decisions = Vec::new();
        let mut interrupted = false;

        let outcomes = stream::iter(items.take(limit))
            .map(|item| self.process(item, index))
            .buffered(self.options.workers.max(1));
        futures::pin_mut!(outcomes);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    interrupted = true;
                    break;
                }
                next = outcomes.next() => next,
            };
            let Some(outcome) = next else { break };

            record(&mut session, outcome, &mut decisions);

            if session.processed_this_run % interval == 0 {
                session.transition_to(ScanState::Checkpointing);
                self.persist(&mut session).await;
                tracing::info!(
                    scan_key = %session.scan_key(),
                    processed = session.checkpoint.processed_count(),
                    "Checkpoint: {}",
                    session.checkpoint.statistics.display_string()
                );
                session.transition_to(ScanState::Scanning);
            }
        }

        // A run cut short by the item limit stays resumable
        let limit_reached = session.processed_this_run >= limit;
        if interrupted || limit_reached {
            self.persist(&mut session).await;
            session.transition_to(ScanState::Interrupted);
            tracing::info!(
                scan_key = %session.scan_key(),
                processed = session.processed_this_run,
                limit_reached,
                "Scan stopped, progress saved"
            );
        } else {
            session.checkpoint.completed = true;
            self.persist(&mut session).await;
            session.transition_to(ScanState::Completed);
            tracing::info!(
                scan_key = %session.scan_key(),
                processed = session.processed_this_run,
                "Scan completed: {}",
                session.checkpoint.statistics.display_string()
            );
        }

        build_report(session, decisions)
    }

    async fn process(&self, item: ScanItem, index: &CandidateIndex) -> ItemOutcome {
        let identifier = item.identifier();
        let mut delta = ScanStatistics::default();
        let result = match &item {
            ScanItem::File(file) => self.check_file(file, &mut delta).await,
            ScanItem::Track(track) => self.check_track(track, index, &mut delta).await,
        };

        match result {
            Ok(decision) => {
                let failure = match &decision {
                    Some(decision) => self.apply(decision).await.err(),
                    None => None,
                };
                // Moves and copies count once they went through
                match (&decision, &failure) {
                    (_, Some(_)) => delta.errors += 1,
                    (Some(ScanDecision::Quarantine { .. }), None) => delta.quarantined += 1,
                    (Some(ScanDecision::Replace { .. }), None) => delta.replaced += 1,
                    _ => {}
                }
                ItemOutcome {
                    identifier,
                    delta,
                    decision,
                    failure,
                }
            }
            Err(error) => ItemOutcome {
                identifier,
                delta: ScanStatistics {
                    errors: 1,
                    ..Default::default()
                },
                decision: None,
                failure: Some(error),
            },
        }
    }

    async fn check_file(
        &self,
        file: &AudioFileRef,
        delta: &mut ScanStatistics,
    ) -> Result<Option<ScanDecision>, ScanError> {
        let verdict = self.classifier.classify(file).await?;
        delta.checked += 1;
        if verdict.is_good() {
            delta.good += 1;
            return Ok(None);
        }
        delta.bad += 1;

        let Some(planner) = &self.quarantine else {
            return Ok(None);
        };
        let Some(destination) = planner.plan(&file.path, verdict.category())? else {
            return Ok(None);
        };
        Ok(Some(ScanDecision::Quarantine {
            source: file.path.clone(),
            category: verdict.category(),
            destination,
            size: file.size,
        }))
    }

    async fn check_track(
        &self,
        track: &TrackDescriptor,
        index: &CandidateIndex,
        delta: &mut ScanStatistics,
    ) -> Result<Option<ScanDecision>, ScanError> {
        if let Some(path) = track.original_path.as_ref().filter(|p| p.exists()) {
            if self.options.missing_only {
                return Ok(None);
            }
            let file = AudioFileRef::from_path(path).map_err(|source| ScanError::IoUnavailable {
                path: path.clone(),
                source,
            })?;
            return self.check_file(&file, delta).await;
        }

        delta.checked += 1;
        delta.missing += 1;
        let decision = self.matcher.match_track(track, index, self.options.max_results);

        if let Some(best) = decision.accepted() {
            let destination = match (&self.replacement, &track.original_path) {
                (Some(planner), _) => Some(planner.plan(&best.file.path)?),
                (None, Some(original)) => Some(original.clone()),
                (None, None) => None,
            };
            if let Some(destination) = destination {
                return Ok(Some(ScanDecision::Replace {
                    track: track.clone(),
                    source: best.file.path.clone(),
                    destination,
                    score: best.score,
                }));
            }
        }

        delta.unmatched += 1;
        if decision.candidates.is_empty() {
            Ok(Some(ScanDecision::Unmatched { track: track.clone() }))
        } else {
            Ok(Some(ScanDecision::Review {
                track: track.clone(),
                candidates: decision.candidates,
            }))
        }
    }

    async fn apply(&self, decision: &ScanDecision) -> Result<(), ScanError> {
        if !decision.is_actionable() {
            return Ok(());
        }
        if self.options.dry_run {
            tracing::info!("[dry run] {}", decision.describe());
            return Ok(());
        }
        match &self.mutator {
            Some(mutator) => mutator.apply(decision).await,
            None => Ok(()),
        }
    }
}

/// Fold one item's outcome into the session
fn record(session: &mut ScanSession, outcome: ItemOutcome, decisions: &mut Vec<ScanDecision>) {
    if let Some(error) = &outcome.failure {
        tracing::warn!(
            item = %outcome.identifier,
            stage = ?error.stage(),
            error = %error,
            "Item failed"
        );
    }
    session.checkpoint.statistics.merge(&outcome.delta);
    session.checkpoint.mark_processed(outcome.identifier);
    session.processed_this_run += 1;
    if let (Some(decision), None) = (outcome.decision, &outcome.failure) {
        decisions.push(decision);
    }
}

fn build_report(session: ScanSession, decisions: Vec<ScanDecision>) -> ScanReport {
    ScanReport {
        scan_key: session.checkpoint.scan_key,
        mode: session.checkpoint.mode,
        state: session.state,
        statistics: session.checkpoint.statistics,
        processed: session.processed_this_run,
        decisions,
        warnings: Vec::new(),
        started_at: session.started_at,
        ended_at: session.ended_at,
    }
}

fn processed_set(checkpoint: &ScanCheckpoint) -> HashSet<String> {
    checkpoint.processed().map(str::to_string).collect()
}

/// Canonical form of a target root when it exists
fn target_path(root: &Path) -> String {
    std::fs::canonicalize(root)
        .unwrap_or_else(|_| root.to_path_buf())
        .display()
        .to_string()
}
