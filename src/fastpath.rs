//! Fast-path gate — C7.
//!
//! Compares the current manifest's SHA-256 digest against the stored
//! snapshot's digest to short-circuit resolution when nothing has changed.
//! The gate never mutates on-disk state.

use crate::snapshot;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Whether the orchestrator should skip resolution or proceed with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip,
    Proceed,
}

/// Compute the SHA-256 digest of a manifest's raw bytes.
#[must_use]
pub fn digest_of(manifest_bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(manifest_bytes);
    hasher.finalize().into()
}

/// Decide whether to skip or proceed, given the manifest bytes already read
/// from disk and the path to a possibly-absent snapshot file.
#[must_use]
pub fn check(manifest_bytes: &[u8], snapshot_path: &Path) -> Decision {
    let current_digest = digest_of(manifest_bytes);

    let Ok(snap) = snapshot::read(snapshot_path) else {
        return Decision::Proceed;
    };

    if snap.format_version == snapshot::FORMAT_VERSION && snap.input_digest == current_digest {
        Decision::Skip
    } else {
        Decision::Proceed
    }
}
