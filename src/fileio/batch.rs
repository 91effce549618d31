//! Bounded-concurrency rewriting of many files.
//!
//! A semaphore hands out one slot per in-flight file. The slot travels into
//! the blocking task and is released only when the rewrite has really
//! stopped, so a file that overruns its deadline still occupies its slot.
//! On timeout the file's [`CommitGate`] is cancelled and the batch waits for
//! the rewrite to notice; the file is reported as timed out only when nothing
//! was committed. Statistics are merged by the orchestrating task only.

use crate::engine::PatternStats;
use crate::fileio::errors::{HtmlRewriteError, RewriteOperation};
use crate::fileio::transaction::{serialize_ms, CommitGate, FileOptions, FileOutcome, FileRewriter};
use crate::pattern::PatternSnapshot;
use crate::RewriteError;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// At most this many files are in flight
    pub concurrency: usize,
    pub continue_on_error: bool,
    pub dry_run: bool,
    pub create_backups: bool,
    /// Per-file deadline, counted from the moment the file gets a slot
    pub timeout: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            continue_on_error: true,
            dry_run: false,
            create_backups: false,
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FailedFile {
    pub file: PathBuf,
    #[serde(serialize_with = "serialize_display")]
    pub error: RewriteError,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStatistics {
    pub total_replacements: usize,
    pub total_conflicts: usize,
    pub total_skipped: usize,
    pub files_changed: usize,
    pub average_file_time_ms: f64,
    pub patterns: BTreeMap<String, PatternStats>,
}

#[derive(Debug, Serialize)]
pub struct BatchOperationResult {
    pub processed_files: Vec<PathBuf>,
    pub successful_files: Vec<PathBuf>,
    pub failed_files: Vec<FailedFile>,
    #[serde(rename = "total_time_ms", serialize_with = "serialize_ms")]
    pub total_time: Duration,
    pub statistics: BatchStatistics,
    pub outcomes: Vec<FileOutcome>,
}

pub struct BatchProcessor {
    rewriter: Arc<FileRewriter>,
    options: BatchOptions,
}

/// Everything one file's task needs, owned so it can cross into the pool.
struct FileJob {
    rewriter: Arc<FileRewriter>,
    snapshot: Arc<PatternSnapshot>,
    options: FileOptions,
    path: PathBuf,
    timeout: Option<Duration>,
    /// Set by the first failing file when the batch stops on error
    halted: Option<Arc<AtomicBool>>,
}

impl BatchProcessor {
    pub fn new(rewriter: Arc<FileRewriter>, options: BatchOptions) -> Self {
        Self { rewriter, options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Rewrite every file in `paths`.
    ///
    /// Patterns are snapshotted once; registry changes made while the batch
    /// runs do not affect it. Files are started in input order. With
    /// `continue_on_error` unset, files already running are allowed to
    /// finish, no further file starts, and the first failure (in input order)
    /// is returned.
    pub async fn process_batch(&self, paths: Vec<PathBuf>) -> Result<BatchOperationResult, RewriteError> {
        let started = Instant::now();
        let snapshot = Arc::new(self.rewriter.engine().snapshot());
        let file_options = FileOptions {
            dry_run: self.options.dry_run,
            create_backup: self.options.create_backups,
            ..self.rewriter.options().clone()
        };
        let slots = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let halted = Arc::new(AtomicBool::new(false));

        let mut running = Vec::with_capacity(paths.len());
        for path in paths {
            let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
                break;
            };
            if halted.load(Ordering::SeqCst) {
                break;
            }
            let job = FileJob {
                rewriter: Arc::clone(&self.rewriter),
                snapshot: Arc::clone(&snapshot),
                options: file_options.clone(),
                path: path.clone(),
                timeout: self.options.timeout,
                halted: (!self.options.continue_on_error).then(|| Arc::clone(&halted)),
            };
            running.push((path, tokio::spawn(job.run(permit))));
        }

        let mut result = BatchOperationResult {
            processed_files: Vec::with_capacity(running.len()),
            successful_files: Vec::new(),
            failed_files: Vec::new(),
            total_time: Duration::ZERO,
            statistics: BatchStatistics::default(),
            outcomes: Vec::new(),
        };
        let mut file_time = Duration::ZERO;
        let mut first_failure = None;

        for (path, task) in running {
            let outcome = task
                .await
                .unwrap_or_else(|join_error| Err(task_error(&path, join_error)));

            result.processed_files.push(path.clone());
            match outcome {
                Ok(outcome) => {
                    file_time += outcome.elapsed;
                    merge_statistics(&mut result.statistics, &outcome);
                    result.successful_files.push(path);
                    result.outcomes.push(outcome);
                }
                Err(error) => {
                    warn!(file = %path.display(), error = %error, "file failed");
                    if self.options.continue_on_error {
                        result.failed_files.push(FailedFile { file: path, error });
                    } else if first_failure.is_none() {
                        first_failure = Some(error);
                    }
                }
            }
        }

        if let Some(error) = first_failure {
            return Err(error);
        }

        if !result.successful_files.is_empty() {
            result.statistics.average_file_time_ms =
                file_time.as_secs_f64() * 1000.0 / result.successful_files.len() as f64;
        }
        result.total_time = started.elapsed();

        info!(
            processed = result.processed_files.len(),
            succeeded = result.successful_files.len(),
            failed = result.failed_files.len(),
            replacements = result.statistics.total_replacements,
            conflicts = result.statistics.total_conflicts,
            "batch finished"
        );
        Ok(result)
    }
}

impl FileJob {
    /// Run the rewrite on the blocking pool under the job's deadline.
    async fn run(self, permit: OwnedSemaphorePermit) -> Result<FileOutcome, RewriteError> {
        let FileJob {
            rewriter,
            snapshot,
            options,
            path,
            timeout,
            halted,
        } = self;
        let deadline = timeout.map(|limit| Instant::now() + limit);
        let gate = CommitGate::new(deadline);

        let mut worker = {
            let gate = gate.clone();
            let path = path.clone();
            tokio::task::spawn_blocking(move || {
                let outcome = rewriter.rewrite_file_with(&snapshot, &path, &options, &gate);
                if let (Err(_), Some(halted)) = (&outcome, &halted) {
                    halted.store(true, Ordering::SeqCst);
                }
                drop(permit);
                outcome
            })
        };

        let joined = match (deadline, timeout) {
            (Some(deadline), Some(limit)) => {
                let deadline = tokio::time::Instant::from_std(deadline);
                match tokio::time::timeout_at(deadline, &mut worker).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        gate.cancel();
                        warn!(
                            file = %path.display(),
                            limit_ms = limit.as_millis() as u64,
                            "deadline passed, waiting for the rewrite to stop"
                        );
                        worker.await
                    }
                }
            }
            _ => worker.await,
        };
        joined.unwrap_or_else(|join_error| Err(task_error(&path, join_error)))
    }
}

fn merge_statistics(statistics: &mut BatchStatistics, outcome: &FileOutcome) {
    let result = &outcome.result;
    statistics.total_replacements += result.applied.len();
    statistics.total_conflicts += result.conflicts.len();
    statistics.total_skipped += result.skipped.len();
    if outcome.would_write {
        statistics.files_changed += 1;
    }
    for (id, stats) in &result.stats.patterns {
        let total = statistics.patterns.entry(id.clone()).or_default();
        total.attempts += stats.attempts;
        total.successes += stats.successes;
        total.failures += stats.failures;
        total.conflicts += stats.conflicts;
        total.skipped += stats.skipped;
    }
}

fn task_error(path: &std::path::Path, join_error: tokio::task::JoinError) -> RewriteError {
    HtmlRewriteError::new(
        path.display().to_string(),
        RewriteOperation::Transform,
        join_error,
    )
    .into()
}

fn serialize_display<S: Serializer>(error: &RewriteError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RewriteEngine, RewriteOptions};
    use crate::pattern::Pattern;

    fn processor(options: BatchOptions) -> BatchProcessor {
        let engine = RewriteEngine::new(RewriteOptions::default());
        engine
            .add(Pattern::literal("btn", "[class]", "class", "btn", "b"))
            .unwrap();
        let rewriter = FileRewriter::new(Arc::new(engine), FileOptions::default());
        BatchProcessor::new(Arc::new(rewriter), options)
    }

    #[tokio::test]
    async fn processes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..5)
            .map(|i| {
                let path = dir.path().join(format!("{i}.html"));
                std::fs::write(&path, r#"<a class="btn">x</a>"#).unwrap();
                path
            })
            .collect();
        let result = processor(BatchOptions {
            concurrency: 2,
            ..BatchOptions::default()
        })
        .process_batch(paths.clone())
        .await
        .unwrap();
        assert_eq!(result.processed_files, paths);
        assert_eq!(result.successful_files.len(), 5);
        assert_eq!(result.statistics.total_replacements, 5);
        assert_eq!(result.statistics.files_changed, 5);
        assert_eq!(result.statistics.patterns["btn"].successes, 5);
        for path in &paths {
            assert_eq!(std::fs::read_to_string(path).unwrap(), r#"<a class="b">x</a>"#);
        }
    }

    #[tokio::test]
    async fn dry_run_batch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.html");
        std::fs::write(&path, r#"<a class="btn">x</a>"#).unwrap();
        let result = processor(BatchOptions {
            dry_run: true,
            ..BatchOptions::default()
        })
        .process_batch(vec![path.clone()])
        .await
        .unwrap();
        assert_eq!(result.statistics.files_changed, 1);
        assert!(!result.outcomes[0].written);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"<a class="btn">x</a>"#);
    }

    #[tokio::test]
    async fn failed_files_serialize_their_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.html");
        let result = processor(BatchOptions::default())
            .process_batch(vec![missing])
            .await
            .unwrap();
        let json = serde_json::to_value(&result).unwrap();
        let error = json["failed_files"][0]["error"].as_str().unwrap();
        assert!(error.contains("stat failed"));
    }
}
