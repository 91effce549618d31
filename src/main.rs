use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use class_rewriter::config::{load_from_path, RewriterConfig};
use class_rewriter::fileio::{restore_backup, StdFileSystem};
use class_rewriter::{
    BatchOperationResult, BatchProcessor, FileOutcome, FileRewriter, ResolutionStrategy,
};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "class-rewriter")]
#[command(about = "Pattern-based rewriting of HTML class attributes", long_about = None)]
#[command(version)]
struct Cli {
    /// Rewriter config file
    #[arg(short, long, global = true, default_value = "class-rewriter.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite files or directories in place
    Rewrite {
        /// Files or directories to rewrite
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Print the batch result as JSON
        #[arg(long)]
        json: bool,

        /// Back up every file before replacing it
        #[arg(short, long)]
        backup: bool,

        /// Settle every conflict with this strategy
        /// (highest-priority, merge, split, manual-review)
        #[arg(long)]
        resolve: Option<ResolutionStrategy>,
    },

    /// Validate the config without touching any file
    Check,

    /// List registered patterns in application order
    List,

    /// Copy a backup back over its original
    Restore {
        /// Backup file to restore
        backup: PathBuf,

        /// Where to restore to (defaults to the path recorded in the backup metadata)
        #[arg(short, long)]
        target: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Rewrite {
            paths,
            dry_run,
            diff,
            json,
            backup,
            resolve,
        } => cmd_rewrite(&cli.config, paths, dry_run, diff, json, backup, resolve),

        Commands::Check => cmd_check(&cli.config),

        Commands::List => cmd_list(&cli.config),

        Commands::Restore { backup, target } => cmd_restore(&backup, target.as_deref()),
    }
}

/// Logs go to stderr so `--json` output stays clean. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Result<RewriterConfig> {
    load_from_path(path).with_context(|| format!("loading {}", path.display()))
}

/// Expand directories into the files whose extension the config accepts.
fn collect_files(paths: &[PathBuf], extensions: &[String]) -> Result<Vec<PathBuf>> {
    let accepts = |path: &Path| {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    };

    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            // Explicit files are taken as given; missing ones fail in the batch.
            files.push(path.clone());
            continue;
        }
        let mut found = Vec::new();
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = entry?;
            if entry.file_type().is_file() && accepts(entry.path()) {
                found.push(entry.path().to_path_buf());
            }
        }
        found.sort();
        files.extend(found);
    }
    files.dedup();
    Ok(files)
}

fn display_diff(file: &Path, original: &str, modified: &str) {
    println!("{}", format!("--- {} (original)", file.display()).dimmed());
    println!("{}", format!("+++ {} (rewritten)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let line = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => continue,
        };
        print!("{}", line);
    }
    println!();
}

fn cmd_rewrite(
    config_path: &Path,
    paths: Vec<PathBuf>,
    dry_run: bool,
    show_diff: bool,
    json: bool,
    backup: bool,
    resolve: Option<ResolutionStrategy>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let mut rewrite_options = config.rewrite_options();
    if resolve.is_some() {
        rewrite_options.resolution_override = resolve;
    }
    let engine = config.build_engine_with(rewrite_options)?;

    let mut batch_options = config.batch_options();
    batch_options.dry_run |= dry_run;
    batch_options.create_backups |= backup;

    let files = collect_files(&paths, &config.options.extensions)?;
    if files.is_empty() {
        if !json {
            println!("{}", "No matching files found".yellow());
        }
        return Ok(());
    }

    let rewriter = FileRewriter::new(Arc::new(engine), config.file_options());
    let processor = BatchProcessor::new(Arc::new(rewriter), batch_options.clone());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let result = runtime.block_on(processor.process_batch(files))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        if batch_options.dry_run {
            println!("{}", "[DRY RUN - no files were modified]".cyan());
        }
        for outcome in &result.outcomes {
            report_outcome(outcome, batch_options.dry_run, show_diff);
        }
        for failed in &result.failed_files {
            eprintln!("{} {}: {}", "✗".red(), failed.file.display(), failed.error);
        }
        print_summary(&result);
    }

    if !result.failed_files.is_empty() {
        anyhow::bail!("{} file(s) failed", result.failed_files.len());
    }
    Ok(())
}

fn report_outcome(outcome: &FileOutcome, dry_run: bool, show_diff: bool) {
    let result = &outcome.result;
    if !outcome.would_write {
        println!("{} {}: unchanged", "⊘".cyan(), outcome.path.display());
    } else {
        let verb = if dry_run { "would rewrite" } else { "rewritten" };
        println!(
            "{} {}: {} ({} replacements, {} conflicts)",
            "✓".green(),
            outcome.path.display(),
            verb,
            result.applied.len(),
            result.conflicts.len()
        );
    }
    if let Some(backup) = &outcome.backup {
        println!("  backup: {}", backup.path.display().to_string().dimmed());
    }

    for record in &result.conflicts {
        let line = format!(
            "  {} conflict on {} [{}]: {} -> {}",
            record.conflict.severity,
            record.conflict.element_selector,
            record.conflict.overlap_type,
            record.conflict.pattern_ids().join(", "),
            record.outcome.resolution
        );
        if record.outcome.success {
            println!("{}", line.yellow());
        } else {
            println!("{}", line.red());
            println!("    {}", record.outcome.reason);
        }
    }
    for warning in &result.warnings {
        println!("  {} {}", "warning:".yellow(), warning.message);
    }
    for error in &result.errors {
        eprintln!("  {} {}", "error:".red(), error.message);
    }

    if show_diff && outcome.would_write {
        display_diff(&outcome.path, &result.original_content, &result.modified_content);
    }
}

fn print_summary(result: &BatchOperationResult) {
    let stats = &result.statistics;
    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} files processed in {:.1} ms",
        result.processed_files.len(),
        result.total_time.as_secs_f64() * 1000.0
    );
    println!("  {} changed", format!("{}", stats.files_changed).green());
    println!("  {} replacements", format!("{}", stats.total_replacements).green());
    println!("  {} conflicts", format!("{}", stats.total_conflicts).yellow());
    println!("  {} skipped", format!("{}", stats.total_skipped).cyan());
    println!("  {} failed", format!("{}", result.failed_files.len()).red());
}

fn cmd_check(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = config.build_engine()?;
    let registry = engine.read_registry();
    println!(
        "{} {}: {} patterns ({} sets)",
        "✓".green(),
        config_path.display(),
        registry.len(),
        config.sets.len()
    );
    Ok(())
}

fn cmd_list(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = config.build_engine()?;
    let snapshot = engine.snapshot();

    println!("{}", "Patterns (application order):".bold());
    for entry in &snapshot.patterns {
        let pattern = &entry.pattern;
        println!(
            "  {} {} {}",
            format!("{:>4}", pattern.priority).cyan(),
            pattern.id.bold(),
            format!("{} [{}]", pattern.selector, pattern.attribute).dimmed()
        );
    }

    let disabled: Vec<_> = engine
        .list()
        .into_iter()
        .filter(|pattern| !pattern.enabled)
        .collect();
    if !disabled.is_empty() {
        println!();
        println!("{}", "Disabled:".bold());
        for pattern in disabled {
            println!("  - {}", pattern.id);
        }
    }
    Ok(())
}

fn cmd_restore(backup: &Path, target: Option<&Path>) -> Result<()> {
    let restored = restore_backup(&StdFileSystem, backup, target)?;
    println!(
        "{} restored {} from {}",
        "✓".green(),
        restored.display(),
        backup.display()
    );
    Ok(())
}
