//! Catalog cache.
//!
//! Thread-safe mapping from library name to the set of known versions and
//! their transitive requirements. Populated once (by an external
//! `CatalogSource`) before the resolver starts, then read-mostly.

use crate::version::{Constraint, Version};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::RwLock;

/// Embedded seed data for [`SeededCatalogSource::default_catalog`] — a
/// small, fixed set of libraries standing in for a real registry.
const DEFAULT_CATALOG_JSON: &str = include_str!("../fixtures/catalog.json");

#[derive(Debug, Deserialize)]
struct RawDependency {
    name: String,
    constraints: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    version: String,
    dependencies: Vec<RawDependency>,
}

/// A `(name, constraints)` pair naming a transitive dependency of a
/// `CatalogEntry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub name: String,
    pub constraints: Vec<Constraint>,
}

/// One known, published version of a library and its direct dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub version: Version,
    pub dependencies: Vec<DependencySpec>,
}

/// Supplies catalog entries to populate a [`CatalogCache`].
///
/// Network retrieval of real catalog metadata is out of scope for this
/// crate; implementations of this trait are external collaborators.
pub trait CatalogSource {
    fn load(&self) -> Vec<CatalogEntry>;
}

/// A `CatalogSource` backed by an in-memory list, seeded ahead of time.
/// This is the reference implementation's stand-in for a network-backed
/// registry.
#[derive(Debug, Default)]
pub struct SeededCatalogSource {
    entries: Vec<CatalogEntry>,
}

impl SeededCatalogSource {
    #[must_use]
    pub const fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// The reference catalog shipped with the binary: a small, fixed set of
    /// well-known libraries, parsed from an embedded JSON fixture. Stands in
    /// for the network-backed registry this crate does not implement.
    #[must_use]
    pub fn default_catalog() -> Self {
        let raw: Vec<RawEntry> =
            serde_json::from_str(DEFAULT_CATALOG_JSON).expect("embedded catalog fixture is valid JSON");

        let entries = raw
            .into_iter()
            .map(|raw| CatalogEntry {
                name: raw.name,
                version: Version::parse(&raw.version).expect("embedded fixture version is valid"),
                dependencies: raw
                    .dependencies
                    .into_iter()
                    .map(|dep| DependencySpec {
                        name: dep.name,
                        constraints: dep
                            .constraints
                            .iter()
                            .filter_map(|text| crate::manifest::parse_single_constraint(text))
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Self::new(entries)
    }
}

impl CatalogSource for SeededCatalogSource {
    fn load(&self) -> Vec<CatalogEntry> {
        self.entries.clone()
    }
}

/// Thread-safe `name -> known versions` cache.
///
/// `versions_for` never blocks other readers; `add` is exclusive. Duplicate
/// `(name, version)` entries are permitted — the resolver's "already
/// resolved" check is what de-duplicates in practice.
#[derive(Debug, Default)]
pub struct CatalogCache {
    entries: RwLock<HashMap<String, Vec<CatalogEntry>>>,
}

impl CatalogCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Populate the cache from an external source. Intended to run once,
    /// before any resolver worker starts.
    pub fn populate(&self, source: &dyn CatalogSource) {
        for entry in source.load() {
            self.add(entry);
        }
    }

    /// Insert a single entry under its name.
    pub fn add(&self, entry: CatalogEntry) {
        let mut guard = self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.entry(entry.name.clone()).or_default().push(entry);
    }

    /// A read-only snapshot of the known entries for `name`, or an empty
    /// vector if the name is unknown to the catalog.
    #[must_use]
    pub fn versions_for(&self, name: &str) -> Vec<CatalogEntry> {
        let guard = self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.get(name).cloned().unwrap_or_default()
    }
}
