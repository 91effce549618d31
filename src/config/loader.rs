//! Reading `class-rewriter.toml`.
//!
//! Validation issues that belong to a pattern are reported together with the
//! table the pattern was declared in, so a failing id can be found in a large
//! config without searching for it.

use crate::config::schema::{RewriterConfig, ValidationError, ValidationIssue};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml_edit::{ArrayOfTables, DocumentMut, Item};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read rewriter config from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse rewriter config TOML{}: {source}", in_file(.path))]
    Toml {
        path: Option<PathBuf>,
        #[source]
        source: toml_edit::de::Error,
    },
    #[error("invalid rewriter config{}:\n{}", in_file(.path), describe(.source, .declared))]
    Validation {
        path: Option<PathBuf>,
        #[source]
        source: ValidationError,
        /// Pattern id to the table it was declared in
        declared: BTreeMap<String, String>,
    },
}

impl ConfigError {
    /// The config file involved, once known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Io { path, .. } => Some(path),
            ConfigError::Toml { path, .. } | ConfigError::Validation { path, .. } => path.as_deref(),
        }
    }

    /// Where the pattern `id` was declared, if it failed validation.
    pub fn declared_at(&self, id: &str) -> Option<&str> {
        match self {
            ConfigError::Validation { declared, .. } => declared.get(id).map(String::as_str),
            _ => None,
        }
    }

    fn in_path(mut self, file: &Path) -> Self {
        if let ConfigError::Toml { path, .. } | ConfigError::Validation { path, .. } = &mut self {
            path.get_or_insert_with(|| file.to_path_buf());
        }
        self
    }
}

fn in_file(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|path| format!(" ({})", path.display()))
        .unwrap_or_default()
}

fn describe(error: &ValidationError, declared: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (idx, issue) in error.issues.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{issue}");
        if let Some(table) = issue_pattern_id(issue).and_then(|id| declared.get(id)) {
            let _ = write!(out, " (in {table})");
        }
    }
    out
}

fn issue_pattern_id(issue: &ValidationIssue) -> Option<&str> {
    match issue {
        ValidationIssue::MissingField { pattern_id, .. }
        | ValidationIssue::InvalidCombo { pattern_id, .. } => pattern_id.as_deref(),
        ValidationIssue::Pattern(error) => error.pattern_id.as_deref(),
        ValidationIssue::EmptyPatternList | ValidationIssue::InvalidOption { .. } => None,
    }
}

/// Map every failing pattern id to its `[[patterns]]` or `[[sets.patterns]]` entry.
fn locate_patterns(input: &str, error: &ValidationError) -> BTreeMap<String, String> {
    let mut declared = BTreeMap::new();
    let failing: Vec<&str> = error.issues.iter().filter_map(issue_pattern_id).collect();
    if failing.is_empty() {
        return declared;
    }
    // Deserialization already succeeded, so this parse does too.
    let Ok(doc) = input.parse::<DocumentMut>() else {
        return declared;
    };

    let mut record = |tables: &ArrayOfTables, table_name: &dyn Fn(usize) -> String| {
        for (index, table) in tables.iter().enumerate() {
            let Some(id) = table.get("id").and_then(Item::as_str) else {
                continue;
            };
            if failing.contains(&id) {
                declared
                    .entry(id.to_string())
                    .or_insert_with(|| table_name(index + 1));
            }
        }
    };

    if let Some(patterns) = doc.get("patterns").and_then(Item::as_array_of_tables) {
        record(patterns, &|n| format!("[[patterns]] #{n}"));
    }
    if let Some(sets) = doc.get("sets").and_then(Item::as_array_of_tables) {
        for (set_index, set) in sets.iter().enumerate() {
            let set_name = set
                .get("name")
                .and_then(Item::as_str)
                .map(|name| format!("set '{name}'"))
                .unwrap_or_else(|| format!("[[sets]] #{}", set_index + 1));
            if let Some(patterns) = set.get("patterns").and_then(Item::as_array_of_tables) {
                record(patterns, &|n| format!("{set_name} [[sets.patterns]] #{n}"));
            }
        }
    }
    declared
}

pub fn load_from_str(input: &str) -> Result<RewriterConfig, ConfigError> {
    let config: RewriterConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    if let Err(source) = config.validate() {
        return Err(ConfigError::Validation {
            path: None,
            declared: locate_patterns(input, &source),
            source,
        });
    }
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<RewriterConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.in_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_BAD_PATTERNS: &str = r#"
[[patterns]]
id = "ok"
selector = "div"
literal = "a"
replacement = "b"

[[patterns]]
id = "bad-regex"
selector = "div"
regex = "("
replacement = "y"

[[sets]]
name = "layout"

[[sets.patterns]]
id = "fine"
selector = "div"
literal = "c"
replacement = "d"

[[sets.patterns]]
id = "no-selector"
selector = ""
literal = "x"
replacement = "y"
"#;

    #[test]
    fn failing_patterns_name_their_table() {
        let err = load_from_str(TWO_BAD_PATTERNS).unwrap_err();
        assert_eq!(err.declared_at("bad-regex"), Some("[[patterns]] #2"));
        assert_eq!(
            err.declared_at("no-selector"),
            Some("set 'layout' [[sets.patterns]] #2")
        );
        assert_eq!(err.declared_at("ok"), None);

        let message = err.to_string();
        assert!(message.starts_with("invalid rewriter config:\n"), "{message}");
        assert!(message.contains("(in [[patterns]] #2)"), "{message}");
        assert!(
            message.contains("(in set 'layout' [[sets.patterns]] #2)"),
            "{message}"
        );
    }

    #[test]
    fn option_issues_carry_no_table() {
        let err = load_from_str(
            r#"
[options]
concurrency = 0

[[patterns]]
id = "p"
selector = "div"
literal = "a"
replacement = "b"
"#,
        )
        .unwrap_err();
        let ConfigError::Validation { declared, .. } = &err else {
            panic!("expected validation error, got {err}");
        };
        assert!(declared.is_empty());
        assert!(!err.to_string().contains("(in "));
    }

    #[test]
    fn path_is_added_once_known() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("class-rewriter.toml");
        fs::write(&path, TWO_BAD_PATTERNS).unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert_eq!(err.path(), Some(path.as_path()));
        assert!(err
            .to_string()
            .starts_with(&format!("invalid rewriter config ({}):", path.display())));
        assert_eq!(err.declared_at("bad-regex"), Some("[[patterns]] #2"));
    }

    #[test]
    fn syntax_errors_have_no_path_from_str() {
        let err = load_from_str("[[patterns]\nid = ").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { path: None, .. }));
        assert!(err.path().is_none());
        assert!(err.to_string().starts_with("failed to parse rewriter config TOML: "));
    }
}
