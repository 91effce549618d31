//! Integration tests for the rewriter config
//!
//! Loads TOML from disk, builds an engine and runs it over real files.

use class_rewriter::config::{load_from_path, load_from_str, ConfigError};
use class_rewriter::{BatchProcessor, FileRewriter};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const CONFIG: &str = r#"
[options]
create_backup = true
backup_suffix = ".orig"
concurrency = 2

[[sets]]
name = "buttons"
priority = 10

[[sets.patterns]]
id = "btn-primary"
selector = "button"
literal = "btn-primary"
replacement = "bp"

[[sets.patterns]]
id = "btn-any"
selector = "button"
regex = "btn-(\\w+)"
replacement = "b-$1"
priority = 1

[[patterns]]
id = "nav-link"
selector = "a"
literal = "nav-link"
replacement = "nl"
parent_include = ["nav"]

[[patterns]]
id = "external"
selector = "a"
literal = "link"
replacement = "ext"
conditions = [{ kind = "attribute", target = "href", operator = "starts-with", value = "http" }]

[[patterns]]
id = "disabled"
selector = "div"
literal = "card"
replacement = "c"
enabled = false

[mapping]
selector = "div"

[mapping.names]
"card-body" = "cb"
"#;

const PAGE: &str = r#"<html>
<body>
  <nav><a class="nav-link" href="/">Home</a></nav>
  <footer><a class="nav-link link" href="https://example.com">Out</a></footer>
  <button class="btn-primary">Save</button>
  <button class="btn-secondary">Cancel</button>
  <div class="card card-body">Body</div>
</body>
</html>
"#;

const EXPECTED: &str = r#"<html>
<body>
  <nav><a class="nl" href="/">Home</a></nav>
  <footer><a class="nav-link ext" href="https://example.com">Out</a></footer>
  <button class="b-primary">Save</button>
  <button class="b-secondary">Cancel</button>
  <div class="card cb">Body</div>
</body>
</html>
"#;

fn setup() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("class-rewriter.toml"), CONFIG).unwrap();
    fs::create_dir(dir.path().join("site")).unwrap();
    fs::write(dir.path().join("site/index.html"), PAGE).unwrap();
    dir
}

#[test]
fn load_and_list_patterns() {
    let dir = setup();
    let config = load_from_path(dir.path().join("class-rewriter.toml")).unwrap();
    assert_eq!(config.sets.len(), 1);
    assert_eq!(config.patterns.len(), 3);
    assert_eq!(config.options.backup_suffix, ".orig");

    let engine = config.build_engine().unwrap();
    let snapshot = engine.snapshot();
    let ids: Vec<&str> = snapshot
        .patterns
        .iter()
        .map(|entry| entry.pattern.id.as_str())
        .collect();
    assert_eq!(ids, vec!["btn-any", "btn-primary", "nav-link", "external", "map:card-body"]);
    assert!(!engine.get("disabled").unwrap().enabled);
}

#[tokio::test]
async fn config_drives_a_full_batch() {
    let dir = setup();
    let config = load_from_path(dir.path().join("class-rewriter.toml")).unwrap();
    let engine = Arc::new(config.build_engine().unwrap());
    let rewriter = Arc::new(FileRewriter::new(engine, config.file_options()));
    let page = dir.path().join("site/index.html");

    let result = BatchProcessor::new(rewriter, config.batch_options())
        .process_batch(vec![page.clone()])
        .await
        .unwrap();

    assert!(result.failed_files.is_empty());
    assert_eq!(fs::read_to_string(&page).unwrap(), EXPECTED);
    assert_eq!(
        fs::read_to_string(dir.path().join("site/index.html.orig")).unwrap(),
        PAGE
    );

    let outcome = &result.outcomes[0];
    // btn-any and btn-primary both match "btn-primary" exactly.
    assert_eq!(outcome.result.conflicts.len(), 1);
    assert_eq!(
        outcome.result.conflicts[0].outcome.chosen_pattern_ids,
        vec!["btn-any".to_string()]
    );
}

#[test]
fn toml_errors_carry_the_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[[patterns]\nid = ").unwrap();
    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Toml { path: Some(_), .. }));
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_from_path("/nonexistent/class-rewriter.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn validation_errors_list_every_pattern() {
    let err = load_from_str(
        r#"
[[patterns]]
id = ""
selector = ""
literal = "x"
replacement = "y"

[[patterns]]
id = "bad-regex"
selector = "div"
regex = "("
replacement = "y"
"#,
    )
    .unwrap_err();
    let ConfigError::Validation { source, .. } = &err else {
        panic!("expected validation error, got {err}");
    };
    assert_eq!(source.issues.len(), 2);
    let message = err.to_string();
    assert!(message.contains("'id'"), "{message}");
    assert!(message.contains("'selector'"), "{message}");
    assert!(message.contains("not a valid regex"), "{message}");
}
