//! Integration tests for the command-line interface
//!
//! Runs the built binary against a temporary site directory.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const CONFIG: &str = r#"
[options]
extensions = ["html"]

[[patterns]]
id = "btn"
selector = "[class]"
literal = "btn"
replacement = "b"

[[patterns]]
id = "btn-upper"
selector = "[class]"
literal = "btn"
replacement = "B"
priority = 3
enabled = false
"#;

const PAGE: &str = r#"<p><a class="btn">Go</a></p>"#;
const REWRITTEN: &str = r#"<p><a class="b">Go</a></p>"#;

fn setup_site() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("class-rewriter.toml"), CONFIG).unwrap();
    let site = dir.path().join("site");
    fs::create_dir_all(site.join("nested")).unwrap();
    fs::write(site.join("index.html"), PAGE).unwrap();
    fs::write(site.join("nested/about.html"), PAGE).unwrap();
    fs::write(site.join("notes.txt"), PAGE).unwrap();
    dir
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_class-rewriter"))
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn test_rewrite_help() {
    let dir = TempDir::new().unwrap();
    let output = run(dir.path(), &["rewrite", "--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--dry-run"));
    assert!(stdout.contains("--diff"));
}

#[test]
fn test_rewrite_walks_directories_by_extension() {
    let dir = setup_site();
    let output = run(dir.path(), &["rewrite", "site"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let site = dir.path().join("site");
    assert_eq!(fs::read_to_string(site.join("index.html")).unwrap(), REWRITTEN);
    assert_eq!(fs::read_to_string(site.join("nested/about.html")).unwrap(), REWRITTEN);
    assert_eq!(fs::read_to_string(site.join("notes.txt")).unwrap(), PAGE);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Summary:"));
}

#[test]
fn test_dry_run_with_diff_writes_nothing() {
    let dir = setup_site();
    let output = run(dir.path(), &["rewrite", "--dry-run", "--diff", "site/index.html"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("DRY RUN"));
    assert!(stdout.contains(r#"+<p><a class="b">Go</a></p>"#));
    assert_eq!(
        fs::read_to_string(dir.path().join("site/index.html")).unwrap(),
        PAGE
    );
}

#[test]
fn test_json_output() {
    let dir = setup_site();
    let output = run(dir.path(), &["rewrite", "--json", "--dry-run", "site"]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["processed_files"].as_array().unwrap().len(), 2);
    assert_eq!(json["statistics"]["total_replacements"], 2);
    assert_eq!(json["outcomes"][0]["result"]["applied"][0]["pattern_id"], "btn");
}

#[test]
fn test_backup_flag() {
    let dir = setup_site();
    let output = run(dir.path(), &["rewrite", "--backup", "site/index.html"]);
    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(dir.path().join("site/index.html.bak")).unwrap(),
        PAGE
    );

    let output = run(
        dir.path(),
        &["restore", "site/index.html.bak", "--target", "site/index.html"],
    );
    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(dir.path().join("site/index.html")).unwrap(),
        PAGE
    );
}

#[test]
fn test_missing_file_fails_the_run() {
    let dir = setup_site();
    let output = run(dir.path(), &["rewrite", "site/index.html", "site/missing.html"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing.html"));
    assert_eq!(
        fs::read_to_string(dir.path().join("site/index.html")).unwrap(),
        REWRITTEN
    );
}

#[test]
fn test_check_and_list() {
    let dir = setup_site();
    let output = run(dir.path(), &["check"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("2 patterns"));

    let output = run(dir.path(), &["list"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("btn"));
    assert!(stdout.contains("Disabled:"));
    assert!(stdout.contains("- btn-upper"));
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("class-rewriter.toml"),
        "[[patterns]]\nid = \"x\"\nselector = \"div\"\nreplacement = \"y\"\n",
    )
    .unwrap();
    let output = run(dir.path(), &["check"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid rewriter config"), "{stderr}");
}
