//! # mfdr Common Library
//!
//! Shared code for the mfdr workspace:
//! - Common error type
//! - Configuration loading and state folder resolution
//! - Logging initialisation
//! - Time and size formatting helpers

pub mod config;
pub mod error;
pub mod human_size;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
