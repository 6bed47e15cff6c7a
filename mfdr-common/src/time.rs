//! Timestamp utilities

use chrono::{DateTime, Utc};
use std::time::SystemTime;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a filesystem timestamp to UTC
pub fn from_system_time(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// Modification time of a file's metadata, or the Unix epoch when the
/// platform does not report one
pub fn modified_or_epoch(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(from_system_time)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
