//! Shared test utilities for the gitstate workspace.
//!
//! Dev-dependency only, never published.
//!
//! - [`fake`]: in-memory repository implementing `VcsReader`
//! - [`git`]: real repositories built with `git2`
//! - [`write_config`]: drop a `.gitstate/config.toml` into a workspace

use std::fs;
use std::path::{Path, PathBuf};

pub mod fake;
pub mod git;

pub use fake::{FakeBranch, FakeRepository};
pub use git::GitFixture;

/// Write `.gitstate/config.toml` under `root` and return its path.
///
/// # Panics
/// Panics if the file cannot be written.
pub fn write_config(root: &Path, toml: &str) -> PathBuf {
    let dir = root.join(".gitstate");
    fs::create_dir_all(&dir).unwrap_or_else(|e| panic!("write_config: mkdir failed: {e}"));
    let path = dir.join("config.toml");
    fs::write(&path, toml).unwrap_or_else(|e| panic!("write_config: write failed: {e}"));
    path
}
