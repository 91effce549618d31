//! Rewrite one file on disk: size check, read, transform, backup, atomic write.

use crate::engine::{RewriteEngine, RewriteResult};
use crate::fileio::backup::{create_backup, Backup, BackupOptions};
use crate::fileio::errors::{HtmlRewriteError, RewriteOperation};
use crate::fileio::fs::{atomic_write_guarded, FileSystem, StdFileSystem};
use crate::pattern::PatternSnapshot;
use crate::RewriteError;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default file-size ceiling: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOptions {
    pub max_file_size: u64,
    pub create_backup: bool,
    pub backup: BackupOptions,
    /// Compute everything, write nothing
    pub dry_run: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            create_backup: false,
            backup: BackupOptions::default(),
            dry_run: false,
        }
    }
}

/// What happened to one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: RewriteResult,
    /// The content changed, so a non-dry run writes (or wrote) the file
    pub would_write: bool,
    pub written: bool,
    pub backup: Option<Backup>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_ms")]
    pub elapsed: Duration,
}

/// Deadline and cancel flag consulted before every step that cannot be
/// undone: the transform, the backup and the final rename.
///
/// Clones share the flag, so a batch can cancel a rewrite that is still
/// running on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct CommitGate {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl CommitGate {
    pub fn new(deadline: Option<Instant>) -> Self {
        Self {
            deadline,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err` with the reason once the rewrite must not go further.
    pub fn check(&self) -> Result<(), &'static str> {
        if self.is_cancelled() {
            return Err("cancelled after its deadline passed");
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err("deadline passed before commit"),
            _ => Ok(()),
        }
    }
}

/// Applies the engine to files through a [`FileSystem`].
pub struct FileRewriter {
    engine: Arc<RewriteEngine>,
    fs: Arc<dyn FileSystem>,
    options: FileOptions,
}

impl FileRewriter {
    pub fn new(engine: Arc<RewriteEngine>, options: FileOptions) -> Self {
        Self::with_fs(engine, Arc::new(StdFileSystem), options)
    }

    pub fn with_fs(engine: Arc<RewriteEngine>, fs: Arc<dyn FileSystem>, options: FileOptions) -> Self {
        Self {
            engine,
            fs,
            options,
        }
    }

    pub fn engine(&self) -> &Arc<RewriteEngine> {
        &self.engine
    }

    pub fn options(&self) -> &FileOptions {
        &self.options
    }

    /// Rewrite `path` with the engine's current patterns and this rewriter's options.
    pub fn rewrite_file(&self, path: &Path) -> Result<FileOutcome, RewriteError> {
        let snapshot = self.engine.snapshot();
        self.rewrite_file_with(&snapshot, path, &self.options, &CommitGate::default())
    }

    /// Rewrite `path` with a fixed pattern snapshot.
    ///
    /// Nothing is backed up or written once `gate` is closed. With a backup
    /// requested, the target is only replaced after the backup has been
    /// verified.
    pub fn rewrite_file_with(
        &self,
        snapshot: &PatternSnapshot,
        path: &Path,
        options: &FileOptions,
        gate: &CommitGate,
    ) -> Result<FileOutcome, RewriteError> {
        let started = Instant::now();
        let file = path.display().to_string();
        let fail = |operation, cause: Box<dyn std::error::Error + Send + Sync>| {
            RewriteError::from(HtmlRewriteError {
                file: file.clone(),
                operation,
                cause,
            })
        };

        let size = self
            .fs
            .stat(path)
            .map_err(|e| fail(RewriteOperation::Stat, e.into()))?;
        if size > options.max_file_size {
            return Err(fail(
                RewriteOperation::SizeLimit,
                format!("{size} bytes exceeds the limit of {} bytes", options.max_file_size).into(),
            ));
        }

        let bytes = self
            .fs
            .read(path)
            .map_err(|e| fail(RewriteOperation::Read, e.into()))?;
        let content =
            std::str::from_utf8(&bytes).map_err(|e| fail(RewriteOperation::Decode, e.into()))?;

        gate.check()
            .map_err(|reason| fail(RewriteOperation::Timeout, reason.into()))?;
        let result = self.engine.rewrite_with(snapshot, &file, content)?;
        let would_write = result.changed();

        if options.dry_run || !would_write {
            debug!(file = %file, would_write, dry_run = options.dry_run, "file not written");
            return Ok(FileOutcome {
                path: path.to_path_buf(),
                result,
                would_write,
                written: false,
                backup: None,
                elapsed: started.elapsed(),
            });
        }

        gate.check()
            .map_err(|reason| fail(RewriteOperation::Timeout, reason.into()))?;

        let backup = if options.create_backup {
            Some(create_backup(self.fs.as_ref(), path, &bytes, &options.backup)?)
        } else {
            None
        };

        let mut stopped = None;
        let written = atomic_write_guarded(self.fs.as_ref(), path, result.modified_content.as_bytes(), || {
            gate.check().map_err(|reason| {
                stopped = Some(reason);
                io::Error::other(reason)
            })
        });
        if let Some(reason) = stopped {
            debug!(file = %file, reason, "write abandoned before rename");
            return Err(fail(RewriteOperation::Timeout, reason.into()));
        }
        written.map_err(|e| fail(RewriteOperation::Write, e.into()))?;

        info!(
            file = %file,
            replacements = result.applied.len(),
            conflicts = result.conflicts.len(),
            "file rewritten"
        );
        Ok(FileOutcome {
            path: path.to_path_buf(),
            result,
            would_write,
            written: true,
            backup,
            elapsed: started.elapsed(),
        })
    }
}

pub(crate) fn serialize_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}
