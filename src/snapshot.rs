//! Binary snapshot — C6.
//!
//! A packed binary form of a [`Resolution`] plus a digest of the manifest
//! bytes it was computed from, used by the fast-path gate (C7) to
//! short-circuit resolution on an unchanged input.
//!
//! ```text
//! [0..4)   magic             = "GRLK"
//! [4..8)   format_version    = u32 LE = 1
//! [8..12)  library_count     = u32 LE
//! [12..44) input_digest      = 32-byte SHA-256 of the manifest bytes
//! [44..)   library records, concatenated
//! ```
//!
//! Each library record:
//!
//! ```text
//! u16 name_length
//! u64 packed_version
//! u16 dep_count
//! u8  source_tag     (0=registry, 1=github, 2=git, 3=path)
//! u8  reserved
//! name_length bytes of name
//! dep_count * u32    dependency indices (placeholder 0 in this version)
//! ```

use crate::manifest::Source;
use crate::resolver::{ResolvedLibrary, Resolution};
use crate::version::Version;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const MAGIC: [u8; 4] = *b"GRLK";
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 44;
pub const DIGEST_LEN: usize = 32;

/// Errors while writing or reading a snapshot file (spec §7 class 3,
/// emission errors).
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("could not write snapshot to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not read snapshot from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot is truncated or malformed")]
    Malformed,
}

/// A decoded binary snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub format_version: u32,
    pub input_digest: [u8; DIGEST_LEN],
    pub libraries: Vec<SnapshotLibrary>,
}

/// One decoded library record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotLibrary {
    pub name: String,
    pub version: Version,
    pub source_tag: u8,
}

fn source_tag(source: &Source) -> u8 {
    match source {
        Source::Registry => 0,
        Source::Vcs { from_github: true, .. } => 1,
        Source::Vcs { from_github: false, .. } => 2,
        Source::Path { .. } => 3,
    }
}

/// Serialize `resolution` into the binary snapshot form.
#[must_use]
pub fn encode(resolution: &Resolution, input_digest: [u8; DIGEST_LEN]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + resolution.sequence.len() * 32);

    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&(resolution.sequence.len() as u32).to_le_bytes());
    buf.extend_from_slice(&input_digest);

    for lib in &resolution.sequence {
        encode_library(&mut buf, lib);
    }

    buf
}

fn encode_library(buf: &mut Vec<u8>, lib: &ResolvedLibrary) {
    let name_bytes = lib.name.as_bytes();
    buf.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(&lib.version.pack().to_le_bytes());
    buf.extend_from_slice(&(lib.dependency_names.len() as u16).to_le_bytes());
    buf.push(source_tag(&lib.source));
    buf.push(0); // reserved
    buf.extend_from_slice(name_bytes);
    for _ in &lib.dependency_names {
        // Dependency indices into the record sequence; a placeholder zero
        // is permitted in this version (spec §4.6).
        buf.extend_from_slice(&0u32.to_le_bytes());
    }
}

/// Write `resolution` to `path` as a binary snapshot keyed on
/// `input_digest`.
pub fn write(path: &Path, resolution: &Resolution, input_digest: [u8; DIGEST_LEN]) -> Result<(), SnapshotError> {
    let bytes = encode(resolution, input_digest);
    fs::write(path, bytes).map_err(|source| SnapshotError::Write {
        path: path.display().to_string(),
        source,
    })
}

/// Read and decode a snapshot from `path`.
pub fn read(path: &Path) -> Result<Snapshot, SnapshotError> {
    let bytes = fs::read(path).map_err(|source| SnapshotError::Read {
        path: path.display().to_string(),
        source,
    })?;
    decode(&bytes).ok_or(SnapshotError::Malformed)
}

/// Decode a snapshot from an in-memory byte buffer.
#[must_use]
pub fn decode(bytes: &[u8]) -> Option<Snapshot> {
    if bytes.len() < HEADER_LEN {
        return None;
    }

    let magic: [u8; 4] = bytes.get(0..4)?.try_into().ok()?;
    if magic != MAGIC {
        return None;
    }
    let format_version = u32::from_le_bytes(bytes.get(4..8)?.try_into().ok()?);
    let library_count = u32::from_le_bytes(bytes.get(8..12)?.try_into().ok()?) as usize;
    let input_digest: [u8; DIGEST_LEN] = bytes.get(12..44)?.try_into().ok()?;

    let mut offset = HEADER_LEN;
    let mut libraries = Vec::with_capacity(library_count);

    for _ in 0..library_count {
        let name_length = u16::from_le_bytes(bytes.get(offset..offset + 2)?.try_into().ok()?) as usize;
        let packed_version = u64::from_le_bytes(bytes.get(offset + 2..offset + 10)?.try_into().ok()?);
        let dep_count = u16::from_le_bytes(bytes.get(offset + 10..offset + 12)?.try_into().ok()?) as usize;
        let source_tag = *bytes.get(offset + 12)?;
        // offset + 13 is the reserved byte.
        let name_start = offset + 14;
        let name_end = name_start + name_length;
        let name = std::str::from_utf8(bytes.get(name_start..name_end)?).ok()?.to_owned();

        let deps_end = name_end + dep_count * 4;

        libraries.push(SnapshotLibrary {
            name,
            version: unpack_version(packed_version),
            source_tag,
        });

        offset = deps_end;
    }

    Some(Snapshot {
        format_version,
        input_digest,
        libraries,
    })
}

fn unpack_version(packed: u64) -> Version {
    let major = ((packed >> 32) & 0xFFFF) as u16;
    let minor = ((packed >> 16) & 0xFFFF) as u16;
    let patch = (packed & 0xFFFF) as u16;
    Version::new(major, minor, patch)
}
