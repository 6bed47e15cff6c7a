//! Fixture file builders

use std::path::{Path, PathBuf};

/// Size comfortably above the minimum audio size gate
pub const PLAUSIBLE_SIZE: usize = 64 * 1024;

/// Write `size` filler bytes at `root/relative`, creating parent folders
pub fn write_audio(root: &Path, relative: &str, size: usize) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, vec![0u8; size]).unwrap();
    path
}

/// Write several plausible-size files below `root`
pub fn write_library(root: &Path, relatives: &[&str]) -> Vec<PathBuf> {
    relatives
        .iter()
        .map(|relative| write_audio(root, relative, PLAUSIBLE_SIZE))
        .collect()
}
