//! Scan services
//!
//! Leaves first: prober and metadata reader, fingerprint cache, classifier,
//! indexer, matcher, checkpoint store, quarantine planning, orchestrator.

pub mod candidate_indexer;
pub mod checkpoint_store;
pub mod fingerprint_cache;
pub mod integrity_classifier;
pub mod manifest_reader;
pub mod media_prober;
pub mod metadata_reader;
pub mod quarantine;
pub mod scan_orchestrator;
pub mod track_matcher;

pub use candidate_indexer::{CandidateIndex, CandidateIndexer, IndexWalk};
pub use checkpoint_store::{CheckpointStore, InMemoryCheckpointStore, JsonCheckpointStore};
pub use fingerprint_cache::{CacheStats, FingerprintCache};
pub use integrity_classifier::{ClassifierOptions, ClassifyMode, IntegrityClassifier};
pub use manifest_reader::{JsonManifestReader, ManifestReader, StaticManifest};
pub use media_prober::{FfmpegProber, MediaProber, ProbeDepth, ProbeReport};
pub use metadata_reader::{LoftyMetadataReader, MetadataReader, MetadataReport};
pub use quarantine::{FileSystemMutator, Mutator, QuarantinePlanner, ReplacementPlanner, ScanDecision};
pub use scan_orchestrator::{ScanOptions, ScanOrchestrator, ScanReport, ScanState};
pub use track_matcher::{MatcherOptions, TrackMatcher};
