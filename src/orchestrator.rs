//! Orchestrator — C8.
//!
//! Dispatch: fast-path gate -> parse -> resolve -> emit text -> emit
//! snapshot. Timings are captured for the user-visible summary but are not
//! part of the contract.

use crate::catalog::{CatalogCache, CatalogSource};
use crate::fastpath::{self, Decision};
use crate::lockfile;
use crate::manifest::{self, Manifest, ManifestError};
use crate::paths;
use crate::resolver::{self, ResolveError, Resolution};
use crate::snapshot::{self, SnapshotError};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that abort the whole run (spec §7 classes 1 and 3).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("could not write lock file at {path}: {source}")]
    WriteLock {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a single orchestrator run, used to build the user-visible
/// summary line (spec §7).
#[derive(Debug, Clone, Copy)]
pub struct Summary {
    pub fast_path_hit: bool,
    pub resolved_count: usize,
    pub elapsed: Duration,
}

/// Run the full pipeline rooted at `dir`, using `source` to populate the
/// catalog when a full resolution is required.
pub fn run(dir: &Path, source: &dyn CatalogSource) -> Result<Summary, OrchestratorError> {
    let start = Instant::now();
    let manifest_path = paths::gemfile_in(dir);
    let lock_path = paths::lockfile_in(dir);
    let snapshot_path = paths::snapshot_in(dir);

    let manifest_bytes = fs::read(&manifest_path).map_err(|source| ManifestError::Read {
        path: manifest_path.display().to_string(),
        source,
    })?;

    if fastpath::check(&manifest_bytes, &snapshot_path) == Decision::Skip {
        return Ok(Summary {
            fast_path_hit: true,
            resolved_count: 0,
            elapsed: start.elapsed(),
        });
    }

    let manifest = manifest::parse_str(&String::from_utf8_lossy(&manifest_bytes))?;
    let resolution = run_full_resolution(&manifest, source)?;

    write_outputs(&lock_path, &snapshot_path, &manifest, &resolution, &manifest_bytes)?;

    Ok(Summary {
        fast_path_hit: false,
        resolved_count: resolution.sequence.len(),
        elapsed: start.elapsed(),
    })
}

/// Parse the manifest, populate a fresh catalog, and resolve — ignoring
/// any existing snapshot. Used by `sgl update` and whenever the fast path
/// does not apply.
pub fn run_full(dir: &Path, source: &dyn CatalogSource) -> Result<Summary, OrchestratorError> {
    let start = Instant::now();
    let manifest_path = paths::gemfile_in(dir);
    let lock_path = paths::lockfile_in(dir);
    let snapshot_path = paths::snapshot_in(dir);

    let manifest_bytes = fs::read(&manifest_path).map_err(|source| ManifestError::Read {
        path: manifest_path.display().to_string(),
        source,
    })?;
    let manifest = manifest::parse_str(&String::from_utf8_lossy(&manifest_bytes))?;
    let resolution = run_full_resolution(&manifest, source)?;

    write_outputs(&lock_path, &snapshot_path, &manifest, &resolution, &manifest_bytes)?;

    Ok(Summary {
        fast_path_hit: false,
        resolved_count: resolution.sequence.len(),
        elapsed: start.elapsed(),
    })
}

fn run_full_resolution(
    manifest: &Manifest,
    source: &dyn CatalogSource,
) -> Result<Resolution, OrchestratorError> {
    let catalog = CatalogCache::new();
    catalog.populate(source);
    Ok(resolver::resolve(&manifest.requirements, &catalog)?)
}

fn write_outputs(
    lock_path: &Path,
    snapshot_path: &Path,
    manifest: &Manifest,
    resolution: &Resolution,
    manifest_bytes: &[u8],
) -> Result<(), OrchestratorError> {
    let text = lockfile::emit_text(resolution, manifest);
    fs::write(lock_path, text).map_err(|source| OrchestratorError::WriteLock {
        path: lock_path.display().to_string(),
        source,
    })?;

    let digest = fastpath::digest_of(manifest_bytes);
    snapshot::write(snapshot_path, resolution, digest)?;

    Ok(())
}

/// A one-line, user-facing summary (spec §7: "a single-line summary of `N`
/// gems resolved in `T`ms", or "a one-line indicator that cached resolution
/// was used" on the fast path).
#[must_use]
pub fn summary_line(summary: &Summary) -> String {
    if summary.fast_path_hit {
        "Using cached resolution (manifest unchanged)".to_owned()
    } else {
        format!(
            "Resolved {} gems in {:.1}ms",
            summary.resolved_count,
            summary.elapsed.as_secs_f64() * 1000.0
        )
    }
}
