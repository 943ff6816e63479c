//! Fixed path helpers for the manifest, lock file, and binary snapshot.
//!
//! Spec §6 fixes each of these at a single relative path (no environment
//! variables are consulted), unlike the dual traditional/modern naming a
//! general-purpose package manager might support.

use std::path::{Path, PathBuf};

pub const MANIFEST_FILE_NAME: &str = "Gemfile";
pub const LOCK_FILE_NAME: &str = "Gemfile.lock";
pub const SNAPSHOT_FILE_NAME: &str = "Gemfile.lock.bin";

/// The manifest path inside `dir`.
#[must_use]
pub fn gemfile_in(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(MANIFEST_FILE_NAME)
}

/// The text lock-file path inside `dir`.
#[must_use]
pub fn lockfile_in(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(LOCK_FILE_NAME)
}

/// The binary snapshot path inside `dir`.
#[must_use]
pub fn snapshot_in(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(SNAPSHOT_FILE_NAME)
}
