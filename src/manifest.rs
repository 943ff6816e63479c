//! Manifest parser.
//!
//! Turns the textual input manifest (a line-oriented, Gemfile-like grammar)
//! into a list of [`RootRequirement`]s plus the declared registry URL.

use crate::debug;
use crate::version::{Constraint, ConstraintOp, Version};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Where a library's contents come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Registry,
    Vcs {
        url: String,
        branch: Option<String>,
        tag: Option<String>,
        reference: Option<String>,
        /// True when the source line used `github:` rather than `git:`,
        /// kept only to pick the right snapshot `source_tag` (see C6).
        from_github: bool,
    },
    Path {
        local_path: String,
    },
}

impl Source {
    #[must_use]
    pub const fn is_registry(&self) -> bool {
        matches!(self, Self::Registry)
    }
}

/// A single top-level requirement line, as produced by C2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootRequirement {
    pub name: String,
    /// Raw constraint text exactly as written (e.g. `"~> 3.0"`), used for
    /// faithful `DEPENDENCIES` emission. Excludes skipped `!=` constraints
    /// and anything that failed to parse.
    pub constraint_strs: Vec<String>,
    /// The parsed form of `constraint_strs`, used for resolution.
    pub constraints: Vec<Constraint>,
    pub source: Source,
    pub optional: bool,
    /// True if this requirement was declared inside a `group ... do ... end`
    /// block. Carried as metadata; not added to the resolver's work set.
    pub in_group: bool,
}

/// The parsed manifest: every root requirement plus the declared registry.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub requirements: Vec<RootRequirement>,
    pub registry_url: String,
}

impl Manifest {
    /// Root requirements that feed the resolver's work set (i.e. declared
    /// outside any `group` block).
    #[must_use]
    pub fn resolvable_requirements(&self) -> Vec<&RootRequirement> {
        self.requirements.iter().filter(|r| !r.in_group).collect()
    }
}

const DEFAULT_REGISTRY_URL: &str = "https://rubygems.org";

/// Errors surfaced for the whole run (spec's "Input errors" class).
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("could not read manifest at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Parse a manifest from disk.
pub fn parse_file(path: &Path) -> Result<Manifest, ManifestError> {
    let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_str(&text)
}

/// Parse manifest text already read into memory.
pub fn parse_str(text: &str) -> Result<Manifest, ManifestError> {
    let mut requirements = Vec::new();
    let mut registry_url = DEFAULT_REGISTRY_URL.to_owned();
    let mut group_depth: u32 = 0;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(rest) = line.strip_prefix("source") {
            if let Some(url) = extract_string_literal(rest.trim_start()) {
                registry_url = url;
            }
            continue;
        }

        if line.starts_with("gemspec") || line.starts_with("ruby ") || line == "ruby" {
            continue;
        }

        if line.starts_with("group") && line.ends_with("do") {
            group_depth += 1;
            continue;
        }

        if line == "end" {
            group_depth = group_depth.saturating_sub(1);
            continue;
        }

        if let Some(rest) = line.strip_prefix("gem") {
            let rest = rest.trim_start();
            match parse_gem_line(rest, group_depth > 0) {
                Ok(req) => requirements.push(req),
                Err(message) => {
                    return Err(ManifestError::Parse { line: line_no, message });
                }
            }
            continue;
        }

        // Unrecognized directive: ignored rather than fatal, matching the
        // parser's general tolerance for constructs outside the grammar.
        debug::debug_log(&format!("manifest: ignoring unrecognized line {line_no}: {line}"));
    }

    Ok(Manifest {
        requirements,
        registry_url,
    })
}

/// Parse the remainder of a `gem ...` line (after the `gem` keyword).
fn parse_gem_line(rest: &str, in_group: bool) -> Result<RootRequirement, String> {
    let tokens = split_top_level(rest);
    let mut tokens = tokens.into_iter();

    let name_token = tokens.next().ok_or("gem line missing a name")?;
    let name = extract_string_literal(&name_token)
        .ok_or_else(|| format!("gem line's leading form is not a quoted string: {name_token:?}"))?;

    let mut constraint_strs = Vec::new();
    let mut constraints = Vec::new();
    let mut optional = false;
    let mut git_url: Option<String> = None;
    let mut path_value: Option<String> = None;
    let mut from_github = false;
    let mut branch = None;
    let mut tag = None;
    let mut reference = None;

    for token in tokens {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        if is_option_token(token) {
            let (key, value) = split_option(token);
            match key {
                "require" => {
                    if value.trim() == "false" {
                        optional = true;
                    }
                }
                "github" => {
                    if let Some(repo) = extract_string_literal(value) {
                        git_url = Some(github_url(&repo));
                        from_github = true;
                    }
                }
                "git" => {
                    if let Some(url) = extract_string_literal(value) {
                        git_url = Some(url);
                    }
                }
                "path" => {
                    if let Some(p) = extract_string_literal(value) {
                        path_value = Some(p);
                    }
                }
                "branch" => branch = extract_string_literal(value),
                "tag" => tag = extract_string_literal(value),
                "ref" => reference = extract_string_literal(value),
                _ => {}
            }
            continue;
        }

        if let Some(text) = extract_string_literal(token) {
            if let Some(constraint) = parse_single_constraint(&text) {
                constraint_strs.push(text);
                constraints.push(constraint);
            }
            // Malformed or skipped (`!=`) constraints are dropped silently,
            // per the parser's per-line tolerance.
        }
    }

    let source = if let Some(url) = git_url {
        Source::Vcs {
            url,
            branch,
            tag,
            reference,
            from_github,
        }
    } else if let Some(local_path) = path_value {
        Source::Path { local_path }
    } else {
        Source::Registry
    };

    Ok(RootRequirement {
        name,
        constraint_strs,
        constraints,
        source,
        optional,
        in_group,
    })
}

/// Parse one constraint expression like `"~> 3.0"` or `">= 1.0"`.
/// Returns `None` for the recognized-but-skipped `!=` operator or any
/// unparseable constraint (caller treats `None` as "drop silently").
pub(crate) fn parse_single_constraint(text: &str) -> Option<Constraint> {
    let text = text.trim();
    let (op, rest) = if let Some(rest) = text.strip_prefix("~>") {
        (ConstraintOp::Compatible, rest)
    } else if let Some(rest) = text.strip_prefix(">=") {
        (ConstraintOp::GreaterOrEqual, rest)
    } else if let Some(rest) = text.strip_prefix("<=") {
        (ConstraintOp::LessOrEqual, rest)
    } else if text.strip_prefix("!=").is_some() {
        return None;
    } else if let Some(rest) = text.strip_prefix('>') {
        (ConstraintOp::Greater, rest)
    } else if let Some(rest) = text.strip_prefix('<') {
        (ConstraintOp::Less, rest)
    } else if let Some(rest) = text.strip_prefix('=') {
        (ConstraintOp::Equal, rest)
    } else {
        (ConstraintOp::Equal, text)
    };

    let version_text = rest.trim();
    let version = Version::parse(version_text).ok()?;

    if op == ConstraintOp::Compatible {
        let component_count = version_text.split('.').count();
        Some(Constraint::compatible(version, component_count >= 3))
    } else {
        Some(Constraint::new(op, version))
    }
}

/// Split a line's trailing argument list on top-level commas, respecting
/// single and double quotes so that commas inside string literals are not
/// treated as separators.
fn split_top_level(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in input.chars() {
        match quote {
            Some(q) if ch == q => {
                quote = None;
                current.push(ch);
            }
            Some(_) => current.push(ch),
            None if ch == '\'' || ch == '"' => {
                quote = Some(ch);
                current.push(ch);
            }
            None if ch == ',' => {
                tokens.push(std::mem::take(&mut current));
            }
            None => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        tokens.push(current);
    }
    tokens
}

/// A token is an option (`key: value`) rather than a constraint string if
/// it is not a bare quoted literal: it contains a top-level `:` before any
/// quote, or contains `/` outside quotes entirely.
fn is_option_token(token: &str) -> bool {
    let trimmed = token.trim();
    if extract_string_literal(trimmed).is_some() && !trimmed.contains(':') {
        return false;
    }
    true
}

/// Split `key: value` into its parts (value still possibly quoted).
fn split_option(token: &str) -> (&str, &str) {
    match token.split_once(':') {
        Some((key, value)) => (key.trim(), value.trim()),
        None => (token.trim(), ""),
    }
}

/// Extract the contents of a single- or double-quoted string literal.
fn extract_string_literal(input: &str) -> Option<String> {
    let input = input.trim();
    let mut chars = input.chars();
    let quote = chars.next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    let rest = &input[quote.len_utf8()..];
    let end = rest.rfind(quote)?;
    Some(rest[..end].to_owned())
}

fn github_url(repo: &str) -> String {
    format!("https://github.com/{repo}.git")
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry => write!(f, "registry"),
            Self::Vcs { url, .. } => write!(f, "vcs({url})"),
            Self::Path { local_path } => write!(f, "path({local_path})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod directives {
        use super::*;

        #[test]
        fn source_line_sets_registry_url() {
            let manifest = parse_str("source 'https://registry.example/'\n").unwrap();
            assert_eq!(manifest.registry_url, "https://registry.example/");
        }

        #[test]
        fn gemspec_and_ruby_lines_are_skipped() {
            let manifest = parse_str("gemspec\nruby '3.3.0'\n").unwrap();
            assert!(manifest.requirements.is_empty());
        }

        #[test]
        fn comments_and_blank_lines_are_ignored() {
            let manifest = parse_str("# a comment\n\n   \ngem 'rack'\n").unwrap();
            assert_eq!(manifest.requirements.len(), 1);
        }
    }

    mod groups {
        use super::*;

        #[test]
        fn requirements_in_group_are_marked_and_excluded_from_work_set() {
            let manifest = parse_str(
                "gem 'rack'\ngroup :test do\n  gem 'rspec'\nend\ngem 'rails'\n",
            )
            .unwrap();
            assert_eq!(manifest.requirements.len(), 3);
            assert!(!manifest.requirements[0].in_group);
            assert!(manifest.requirements[1].in_group);
            assert!(!manifest.requirements[2].in_group);
            assert_eq!(manifest.resolvable_requirements().len(), 2);
        }
    }

    mod requirement_parsing {
        use super::*;

        #[test]
        fn single_constraint() {
            let manifest = parse_str("gem 'rack', '~> 3.0'\n").unwrap();
            let req = &manifest.requirements[0];
            assert_eq!(req.name, "rack");
            assert_eq!(req.constraint_strs, vec!["~> 3.0".to_owned()]);
            assert_eq!(req.constraints.len(), 1);
            assert!(!req.constraints[0].patch_locked);
        }

        #[test]
        fn multiple_constraints() {
            let manifest = parse_str("gem 'pg', '>= 1.0', '< 2.0'\n").unwrap();
            let req = &manifest.requirements[0];
            assert_eq!(req.constraint_strs, vec![">= 1.0".to_owned(), "< 2.0".to_owned()]);
            assert_eq!(req.constraints.len(), 2);
        }

        #[test]
        fn no_constraint_is_implicit_any_version() {
            let manifest = parse_str("gem 'rack'\n").unwrap();
            let req = &manifest.requirements[0];
            assert!(req.constraints.is_empty());
        }

        #[test]
        fn not_equal_operator_is_recognized_but_skipped() {
            let manifest = parse_str("gem 'rack', '!= 3.0.0'\n").unwrap();
            let req = &manifest.requirements[0];
            assert!(req.constraints.is_empty());
            assert!(req.constraint_strs.is_empty());
        }

        #[test]
        fn malformed_constraint_is_skipped_not_fatal() {
            let manifest = parse_str("gem 'rack', 'not-a-version'\n").unwrap();
            assert!(manifest.requirements[0].constraints.is_empty());
        }

        #[test]
        fn leading_form_must_be_a_quoted_string() {
            let err = parse_str("gem rack\n").unwrap_err();
            assert!(matches!(err, ManifestError::Parse { .. }));
        }
    }

    mod options {
        use super::*;

        #[test]
        fn require_false_sets_optional_flag() {
            let manifest = parse_str("gem 'rack', require: false\n").unwrap();
            assert!(manifest.requirements[0].optional);
        }

        #[test]
        fn github_option_builds_vcs_source() {
            let manifest = parse_str("gem 'widget', github: 'acme/widget'\n").unwrap();
            match &manifest.requirements[0].source {
                Source::Vcs { url, from_github, .. } => {
                    assert_eq!(url, "https://github.com/acme/widget.git");
                    assert!(from_github);
                }
                other => panic!("expected vcs source, got {other:?}"),
            }
        }

        #[test]
        fn git_option_builds_vcs_source() {
            let manifest = parse_str("gem 'widget', git: 'https://example.com/widget.git'\n").unwrap();
            match &manifest.requirements[0].source {
                Source::Vcs { url, from_github, .. } => {
                    assert_eq!(url, "https://example.com/widget.git");
                    assert!(!from_github);
                }
                other => panic!("expected vcs source, got {other:?}"),
            }
        }

        #[test]
        fn path_option_builds_path_source() {
            let manifest = parse_str("gem 'widget', path: '../widget'\n").unwrap();
            match &manifest.requirements[0].source {
                Source::Path { local_path } => assert_eq!(local_path, "../widget"),
                other => panic!("expected path source, got {other:?}"),
            }
        }

        #[test]
        fn branch_attaches_to_vcs_source() {
            let manifest =
                parse_str("gem 'widget', github: 'acme/widget', branch: 'main'\n").unwrap();
            match &manifest.requirements[0].source {
                Source::Vcs { branch, .. } => assert_eq!(branch.as_deref(), Some("main")),
                other => panic!("expected vcs source, got {other:?}"),
            }
        }

        #[test]
        fn unknown_options_are_ignored() {
            let manifest = parse_str("gem 'rack', platforms: :ruby\n").unwrap();
            assert_eq!(manifest.requirements[0].name, "rack");
        }
    }
}
