//! mfdr-core: music library integrity classification and replacement matching
//!
//! Library interface used by the `mfdr` binary and integration tests.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::config::{MfdrConfig, ScanConfig};
pub use crate::error::ScanError;
