//! Resolver.
//!
//! A parallel worker-pool that computes the resolved set over the
//! transitive closure of a manifest's root requirements. This is
//! deliberately not a SAT solver: it performs a single greedy,
//! highest-satisfying-version selection per library name with no
//! backtracking. Conflicting constraint sets are not detected as such in
//! this version; a name with no satisfying version is silently dropped
//! (see spec §7, resolution soft failures).

use crate::catalog::CatalogCache;
use crate::debug;
use crate::manifest::{RootRequirement, Source};
use crate::version::{max_satisfying, Constraint, Version};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// A library selected by the resolver: its name, chosen version, where it
/// comes from, and the names of its direct dependencies (resolved to
/// versions at emission time via the resolution map, not stored here).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLibrary {
    pub name: String,
    pub version: Version,
    pub source: Source,
    pub dependency_names: Vec<String>,
}

/// The authoritative output of a resolver run: a `name -> version` map plus
/// an ordered sequence of `ResolvedLibrary`, which must agree on names and
/// versions.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub map: HashMap<String, Version>,
    pub sequence: Vec<ResolvedLibrary>,
}

/// Internal invariant violations (spec §7 class 2: "should never occur").
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("resolution mutex poisoned by a panicking worker")]
    PoisonedState,
}

struct SharedState {
    resolution: Mutex<Resolution>,
    queue: Mutex<VecDeque<String>>,
    pending: AtomicUsize,
}

/// Resolve `requirements` against `catalog`, returning the full transitive
/// resolution.
pub fn resolve(
    requirements: &[RootRequirement],
    catalog: &CatalogCache,
) -> Result<Resolution, ResolveError> {
    let roots: Vec<&RootRequirement> = requirements.iter().filter(|r| !r.in_group).collect();

    let mut seen = std::collections::HashSet::new();
    let mut seed_names = Vec::new();
    for root in &roots {
        if seen.insert(root.name.clone()) {
            seed_names.push(root.name.clone());
        }
    }

    let shared = Arc::new(SharedState {
        resolution: Mutex::new(Resolution::default()),
        queue: Mutex::new(seed_names.iter().cloned().collect()),
        pending: AtomicUsize::new(seed_names.len()),
    });

    let thread_count = thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
        .min(seed_names.len().max(1));

    if thread_count <= 1 {
        run_worker(&shared, &roots, catalog)?;
    } else {
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(thread_count);
            for _ in 0..thread_count {
                let shared = Arc::clone(&shared);
                handles.push(scope.spawn(move || run_worker(&shared, &roots, catalog)));
            }
            for handle in handles {
                handle.join().unwrap_or(Ok(()))?;
            }
            Ok::<(), ResolveError>(())
        })?;
    }

    let resolution = Arc::try_unwrap(shared)
        .unwrap_or_else(|_| unreachable!("all worker threads have joined"))
        .resolution
        .into_inner()
        .map_err(|_| ResolveError::PoisonedState)?;
    Ok(resolution)
}

/// A single worker's loop: pop a name, resolve it, enqueue its
/// dependencies, repeat until the queue has drained.
fn run_worker(
    shared: &SharedState,
    roots: &[&RootRequirement],
    catalog: &CatalogCache,
) -> Result<(), ResolveError> {
    const MAX_BACKOFF_SPINS: u32 = 8;

    loop {
        let popped = {
            let mut queue = shared
                .queue
                .lock()
                .map_err(|_| ResolveError::PoisonedState)?;
            queue.pop_back()
        };

        let Some(name) = popped else {
            if shared.pending.load(Ordering::Acquire) == 0 {
                return Ok(());
            }
            backoff(MAX_BACKOFF_SPINS);
            continue;
        };

        let newly_enqueued = resolve_one(&name, shared, roots, catalog)?;
        if !newly_enqueued.is_empty() {
            let mut queue = shared
                .queue
                .lock()
                .map_err(|_| ResolveError::PoisonedState)?;
            queue.extend(newly_enqueued.iter().cloned());
        }
        shared
            .pending
            .fetch_add(newly_enqueued.len(), Ordering::AcqRel);
        shared.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

fn backoff(max_spins: u32) {
    for _ in 0..max_spins {
        thread::yield_now();
    }
    thread::sleep(Duration::from_micros(200));
}

/// Resolve a single name, inserting it into the shared resolution if a
/// satisfying version is found. Returns the direct dependency names that
/// were newly enqueued as a result (empty if the name was already
/// resolved, unknown to the catalog, or had no satisfying version).
fn resolve_one(
    name: &str,
    shared: &SharedState,
    roots: &[&RootRequirement],
    catalog: &CatalogCache,
) -> Result<Vec<String>, ResolveError> {
    {
        let resolution = shared
            .resolution
            .lock()
            .map_err(|_| ResolveError::PoisonedState)?;
        if resolution.map.contains_key(name) {
            return Ok(Vec::new());
        }
    }

    let constraints: Vec<Constraint> = roots
        .iter()
        .filter(|r| r.name == name)
        .flat_map(|r| r.constraints.iter().copied())
        .collect();

    let source = roots
        .iter()
        .find(|r| r.name == name)
        .map(|r| r.source.clone())
        .unwrap_or(Source::Registry);

    // Only `registry` sources feed the catalog lookup; `vcs` and `path`
    // sources are passed through unchanged (spec §3) — their version comes
    // from an explicit `=` constraint if one was given, else a placeholder.
    let (chosen_version, dependency_names) = if source.is_registry() {
        let entries = catalog.versions_for(name);
        if entries.is_empty() {
            debug::debug_log(&format!("resolver: {name} has no known versions, dropping"));
            return Ok(Vec::new());
        }

        let versions: Vec<Version> = entries.iter().map(|e| e.version).collect();
        let Some(chosen_version) = max_satisfying(&versions, &constraints) else {
            debug::debug_log(&format!(
                "resolver: no version of {name} satisfies the merged constraints, dropping"
            ));
            return Ok(Vec::new());
        };

        let chosen_entry = entries
            .iter()
            .find(|e| e.version == chosen_version)
            .expect("chosen_version was selected from entries' own versions");

        let dependency_names: Vec<String> = chosen_entry
            .dependencies
            .iter()
            .map(|d| d.name.clone())
            .collect();

        (chosen_version, dependency_names)
    } else {
        let version = constraints
            .iter()
            .find(|c| c.op == crate::version::ConstraintOp::Equal)
            .map_or(Version::new(0, 0, 0), |c| c.version);
        (version, Vec::new())
    };

    let library = ResolvedLibrary {
        name: name.to_owned(),
        version: chosen_version,
        source,
        dependency_names: dependency_names.clone(),
    };

    let inserted = {
        let mut resolution = shared
            .resolution
            .lock()
            .map_err(|_| ResolveError::PoisonedState)?;
        if resolution.map.contains_key(name) {
            false
        } else {
            resolution.map.insert(name.to_owned(), chosen_version);
            resolution.sequence.push(library);
            true
        }
    };

    if inserted {
        Ok(dependency_names)
    } else {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogCache, CatalogEntry, DependencySpec};
    use crate::manifest::parse_str;
    use crate::version::ConstraintOp;

    fn seed(catalog: &CatalogCache, entries: Vec<CatalogEntry>) {
        for entry in entries {
            catalog.add(entry);
        }
    }

    mod selection {
        use super::*;

        #[test]
        fn picks_highest_satisfying_version() {
            let manifest = parse_str("gem 'rack', '~> 3.0'\n").unwrap();
            let catalog = CatalogCache::new();
            seed(
                &catalog,
                vec![
                    CatalogEntry {
                        name: "rack".into(),
                        version: Version::new(2, 2, 8),
                        dependencies: vec![],
                    },
                    CatalogEntry {
                        name: "rack".into(),
                        version: Version::new(3, 0, 0),
                        dependencies: vec![],
                    },
                    CatalogEntry {
                        name: "rack".into(),
                        version: Version::new(3, 0, 8),
                        dependencies: vec![],
                    },
                ],
            );

            let resolution = resolve(&manifest.requirements, &catalog).unwrap();
            assert_eq!(resolution.map.get("rack"), Some(&Version::new(3, 0, 8)));
            assert_eq!(resolution.sequence.len(), 1);
        }

        #[test]
        fn name_absent_from_catalog_is_dropped_not_fatal() {
            let manifest = parse_str("gem 'ghost'\n").unwrap();
            let catalog = CatalogCache::new();
            let resolution = resolve(&manifest.requirements, &catalog).unwrap();
            assert!(resolution.map.is_empty());
        }

        #[test]
        fn unsatisfiable_constraints_are_dropped_not_fatal() {
            let manifest = parse_str("gem 'rack', '>= 5.0'\n").unwrap();
            let catalog = CatalogCache::new();
            seed(
                &catalog,
                vec![CatalogEntry {
                    name: "rack".into(),
                    version: Version::new(3, 0, 0),
                    dependencies: vec![],
                }],
            );
            let resolution = resolve(&manifest.requirements, &catalog).unwrap();
            assert!(resolution.map.is_empty());
        }

        #[test]
        fn multi_constraint_merge_across_duplicate_root_requirements() {
            let manifest = parse_str("gem 'pg', '>= 1.0'\ngem 'pg', '< 2.0'\n").unwrap();
            let catalog = CatalogCache::new();
            seed(
                &catalog,
                vec![
                    CatalogEntry { name: "pg".into(), version: Version::new(0, 9, 0), dependencies: vec![] },
                    CatalogEntry { name: "pg".into(), version: Version::new(1, 0, 0), dependencies: vec![] },
                    CatalogEntry { name: "pg".into(), version: Version::new(1, 5, 4), dependencies: vec![] },
                    CatalogEntry { name: "pg".into(), version: Version::new(2, 0, 0), dependencies: vec![] },
                ],
            );
            let resolution = resolve(&manifest.requirements, &catalog).unwrap();
            assert_eq!(resolution.map.get("pg"), Some(&Version::new(1, 5, 4)));
        }
    }

    mod transitive {
        use super::*;

        #[test]
        fn transitive_dependencies_are_resolved() {
            let manifest = parse_str("gem 'rails', '= 7.0.0'\n").unwrap();
            let catalog = CatalogCache::new();
            seed(
                &catalog,
                vec![
                    CatalogEntry {
                        name: "rails".into(),
                        version: Version::new(7, 0, 0),
                        dependencies: vec![DependencySpec {
                            name: "activesupport".into(),
                            constraints: vec![Constraint::new(ConstraintOp::Equal, Version::new(7, 0, 0))],
                        }],
                    },
                    CatalogEntry {
                        name: "activesupport".into(),
                        version: Version::new(7, 0, 0),
                        dependencies: vec![],
                    },
                ],
            );
            let resolution = resolve(&manifest.requirements, &catalog).unwrap();
            assert_eq!(resolution.map.len(), 2);
            assert_eq!(resolution.map.get("activesupport"), Some(&Version::new(7, 0, 0)));
            let rails = resolution.sequence.iter().find(|l| l.name == "rails").unwrap();
            assert_eq!(rails.dependency_names, vec!["activesupport".to_owned()]);
        }
    }

    mod grouping {
        use super::*;

        #[test]
        fn grouped_requirements_are_excluded_from_the_work_set() {
            let manifest = parse_str("group :test do\n  gem 'rspec'\nend\n").unwrap();
            let catalog = CatalogCache::new();
            seed(
                &catalog,
                vec![CatalogEntry { name: "rspec".into(), version: Version::new(3, 0, 0), dependencies: vec![] }],
            );
            let resolution = resolve(&manifest.requirements, &catalog).unwrap();
            assert!(resolution.map.is_empty());
        }
    }

    mod determinism {
        use super::*;

        #[test]
        fn repeated_runs_agree() {
            let manifest = parse_str("gem 'rack', '~> 3.0'\n").unwrap();
            let catalog = CatalogCache::new();
            seed(
                &catalog,
                vec![
                    CatalogEntry { name: "rack".into(), version: Version::new(3, 0, 0), dependencies: vec![] },
                    CatalogEntry { name: "rack".into(), version: Version::new(3, 0, 8), dependencies: vec![] },
                ],
            );
            let first = resolve(&manifest.requirements, &catalog).unwrap();
            let second = resolve(&manifest.requirements, &catalog).unwrap();
            assert_eq!(first.map, second.map);
        }
    }
}
