//! Scan state machine and scan identity
//!
//! INIT → SCANNING ⇄ CHECKPOINTING → COMPLETED, with INTERRUPTED reachable
//! from SCANNING on cancellation. A later run re-enters SCANNING from INIT by
//! loading the checkpoint.

use crate::models::{ScanCheckpoint, ScanMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanState {
    /// Checkpoint lookup, index building
    Init,
    /// Items being processed
    Scanning,
    /// Persisting progress
    Checkpointing,
    /// Cancelled at a checkpoint boundary
    Interrupted,
    /// Every item processed, final checkpoint written
    Completed,
}

impl ScanState {
    pub fn can_transition_to(self, next: ScanState) -> bool {
        use ScanState::*;
        matches!(
            (self, next),
            (Init, Scanning)
                | (Init, Completed)
                | (Scanning, Checkpointing)
                | (Checkpointing, Scanning)
                | (Scanning, Interrupted)
                | (Checkpointing, Interrupted)
                | (Scanning, Completed)
                | (Checkpointing, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ScanState::Interrupted | ScanState::Completed)
    }
}

/// State change record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub old_state: ScanState,
    pub new_state: ScanState,
    pub transitioned_at: DateTime<Utc>,
}

/// In-memory state of one scan invocation
#[derive(Debug, Clone)]
pub struct ScanSession {
    pub state: ScanState,
    pub checkpoint: ScanCheckpoint,
    /// Items completed by this invocation
    pub processed_this_run: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ScanSession {
    pub fn new(checkpoint: ScanCheckpoint) -> Self {
        Self {
            state: ScanState::Init,
            checkpoint,
            processed_this_run: 0,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to `new_state`; invalid transitions are logged and ignored
    pub fn transition_to(&mut self, new_state: ScanState) -> Option<StateTransition> {
        if !self.state.can_transition_to(new_state) {
            tracing::warn!(from = ?self.state, to = ?new_state, "Ignoring invalid scan state transition");
            return None;
        }
        let transition = StateTransition {
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        tracing::debug!(from = ?transition.old_state, to = ?new_state, "Scan state");
        self.state = new_state;
        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }
        Some(transition)
    }

    pub fn scan_key(&self) -> &str {
        &self.checkpoint.scan_key
    }
}

/// Scan identifier: SHA-256 hex over the mode and the sorted target identities
///
/// Target order does not matter; any added or removed target yields a new key.
pub fn scan_key(mode: ScanMode, targets: &[String]) -> String {
    let mut sorted: Vec<&str> = targets.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut hasher = Sha256::new();
    hasher.update(mode.as_str().as_bytes());
    for target in sorted {
        hasher.update([0u8]);
        hasher.update(target.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_key_ignores_target_order() {
        let a = scan_key(ScanMode::Corruption, &["/b".into(), "/a".into()]);
        let b = scan_key(ScanMode::Corruption, &["/a".into(), "/b".into()]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_scan_key_depends_on_targets_and_mode() {
        let base = scan_key(ScanMode::Corruption, &["/a".into()]);
        assert_ne!(base, scan_key(ScanMode::Corruption, &["/a".into(), "/b".into()]));
        assert_ne!(base, scan_key(ScanMode::MissingTracks, &["/a".into()]));
    }

    #[test]
    fn test_transitions() {
        let mut session = ScanSession::new(ScanCheckpoint::new("k", ScanMode::Corruption));
        assert!(session.transition_to(ScanState::Checkpointing).is_none());
        assert_eq!(session.state, ScanState::Init);

        session.transition_to(ScanState::Scanning).unwrap();
        session.transition_to(ScanState::Checkpointing).unwrap();
        session.transition_to(ScanState::Scanning).unwrap();
        session.transition_to(ScanState::Interrupted).unwrap();
        assert!(session.ended_at.is_some());
        assert!(session.transition_to(ScanState::Scanning).is_none());
    }
}
