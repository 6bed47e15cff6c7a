//! Test Helper Utilities
//!
//! Shared fakes and fixture builders for the mfdr-core integration tests

#![allow(dead_code)]

pub mod fakes;
pub mod fixtures;

pub use fakes::{FailingMutator, FailingStore, FakeProber, FakeReader, RecordingMutator};
pub use fixtures::{write_audio, write_library, PLAUSIBLE_SIZE};
