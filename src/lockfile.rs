//! Manifest emitter (text) — C5.
//!
//! Serializes a [`Resolution`] into the canonical Bundler-compatible lock
//! text, byte-consumable by an existing third-party parser. Section order,
//! alphabetical ordering, and whitespace are exact (spec §4.5).

use crate::manifest::{Manifest, Source};
use crate::resolver::{ResolvedLibrary, Resolution};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Platforms this version always declares support for. There is no
/// platform directive in the manifest grammar, so this is a fixed list.
pub const DEFAULT_PLATFORMS: &[&str] = &["ruby"];

/// Fixed `RUBY VERSION` line, since the manifest grammar has no way to
/// declare one (the `ruby` directive is parsed and skipped, see C2 rule 1).
pub const RUBY_VERSION_LINE: &str = "ruby 3.3.0p0";

/// Fixed `BUNDLED WITH` marker, for downstream-parser compatibility.
pub const BUNDLED_WITH_VERSION: &str = "2.5.23";

/// Render `resolution` and `manifest`'s root requirements into the full
/// lock-file text.
#[must_use]
pub fn emit_text(resolution: &Resolution, manifest: &Manifest) -> String {
    let mut out = String::new();

    let registry: Vec<&ResolvedLibrary> = resolution
        .sequence
        .iter()
        .filter(|lib| lib.source.is_registry())
        .collect();
    let git: Vec<&ResolvedLibrary> = resolution
        .sequence
        .iter()
        .filter(|lib| matches!(lib.source, Source::Vcs { .. }))
        .collect();
    let path: Vec<&ResolvedLibrary> = resolution
        .sequence
        .iter()
        .filter(|lib| matches!(lib.source, Source::Path { .. }))
        .collect();

    if !registry.is_empty() {
        write_gem_section(&mut out, &registry, resolution, &manifest.registry_url);
    }
    if !git.is_empty() {
        write_git_section(&mut out, &git);
    }
    if !path.is_empty() {
        write_path_section(&mut out, &path);
    }

    writeln!(out, "PLATFORMS").unwrap();
    for platform in DEFAULT_PLATFORMS {
        writeln!(out, "  {platform}").unwrap();
    }
    out.push('\n');

    writeln!(out, "DEPENDENCIES").unwrap();
    write_dependencies_section(&mut out, manifest);
    out.push('\n');

    writeln!(out, "RUBY VERSION").unwrap();
    writeln!(out, "   {RUBY_VERSION_LINE}").unwrap();
    out.push('\n');

    writeln!(out, "BUNDLED WITH").unwrap();
    writeln!(out, "   {BUNDLED_WITH_VERSION}").unwrap();

    out
}

fn write_gem_section(
    out: &mut String,
    registry: &[&ResolvedLibrary],
    resolution: &Resolution,
    registry_url: &str,
) {
    let remote = if registry_url.ends_with('/') {
        registry_url.to_owned()
    } else {
        format!("{registry_url}/")
    };

    writeln!(out, "GEM").unwrap();
    writeln!(out, "  remote: {remote}").unwrap();
    writeln!(out, "  specs:").unwrap();

    let mut sorted: Vec<&&ResolvedLibrary> = registry.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    for lib in sorted {
        writeln!(out, "    {} ({})", lib.name, lib.version).unwrap();
        let mut deps: Vec<&String> = lib
            .dependency_names
            .iter()
            .filter(|dep| resolution.map.contains_key(*dep))
            .collect();
        deps.sort();
        for dep in deps {
            let version = resolution.map.get(dep).expect("filtered by contains_key above");
            writeln!(out, "      {dep} (= {version})").unwrap();
        }
    }
    out.push('\n');
}

fn write_git_section(out: &mut String, git: &[&ResolvedLibrary]) {
    let mut sorted: Vec<&&ResolvedLibrary> = git.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    for lib in sorted {
        let Source::Vcs { url, branch, tag, reference, .. } = &lib.source else {
            continue;
        };
        writeln!(out, "GIT").unwrap();
        writeln!(out, "  remote: {url}").unwrap();
        writeln!(out, "  revision: {}", synthesize_revision(&lib.name, lib.version)).unwrap();
        if let Some(branch) = branch {
            writeln!(out, "  branch: {branch}").unwrap();
        }
        if let Some(tag) = tag {
            writeln!(out, "  tag: {tag}").unwrap();
        }
        if let Some(reference) = reference {
            writeln!(out, "  ref: {reference}").unwrap();
        }
        writeln!(out, "  specs:").unwrap();
        writeln!(out, "    {} ({})", lib.name, lib.version).unwrap();
        out.push('\n');
    }
}

fn write_path_section(out: &mut String, path: &[&ResolvedLibrary]) {
    let mut sorted: Vec<&&ResolvedLibrary> = path.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    for lib in sorted {
        let Source::Path { local_path } = &lib.source else {
            continue;
        };
        writeln!(out, "PATH").unwrap();
        writeln!(out, "  remote: {local_path}").unwrap();
        writeln!(out, "  specs:").unwrap();
        writeln!(out, "    {} ({})", lib.name, lib.version).unwrap();
        out.push('\n');
    }
}

fn write_dependencies_section(out: &mut String, manifest: &Manifest) {
    let mut by_name: BTreeMap<String, (Vec<String>, bool)> = BTreeMap::new();
    for req in &manifest.requirements {
        let entry = by_name
            .entry(req.name.clone())
            .or_insert_with(|| (Vec::new(), false));
        entry.0.extend(req.constraint_strs.iter().cloned());
        if !req.source.is_registry() {
            entry.1 = true;
        }
    }

    for (name, (constraint_strs, non_registry)) in by_name {
        let bang = if non_registry { "!" } else { "" };
        if constraint_strs.is_empty() {
            writeln!(out, "  {name}{bang}").unwrap();
        } else {
            writeln!(out, "  {name} ({}){bang}", constraint_strs.join(", ")).unwrap();
        }
    }
}

/// Compute a deterministic, SHA-256-derived placeholder for the `revision:`
/// field. A complete implementation would obtain a real commit identifier
/// out-of-band (spec §9); this keeps output deterministic in the meantime.
fn synthesize_revision(name: &str, version: crate::version::Version) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{name}-{version}").as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(20).map(|b| format!("{b:02x}")).collect()
}
