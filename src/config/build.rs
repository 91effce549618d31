//! Turning a loaded config into engine, file and batch settings.

use crate::config::schema::RewriterConfig;
use crate::engine::{RewriteEngine, RewriteOptions};
use crate::fileio::{BackupOptions, BatchOptions, FileOptions};
use crate::RewriteError;
use std::time::Duration;
use tracing::debug;

impl RewriterConfig {
    pub fn rewrite_options(&self) -> RewriteOptions {
        RewriteOptions {
            validate_output: self.options.validate_output,
            resolution_override: self.options.resolution,
        }
    }

    pub fn file_options(&self) -> FileOptions {
        FileOptions {
            max_file_size: self.options.max_file_size,
            create_backup: self.options.create_backup,
            backup: BackupOptions {
                mode: self.options.backup_mode,
                suffix: self.options.backup_suffix.clone(),
            },
            dry_run: self.options.dry_run,
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.options.concurrency,
            continue_on_error: self.options.continue_on_error,
            dry_run: self.options.dry_run,
            create_backups: self.options.create_backup,
            timeout: Some(Duration::from_millis(self.options.timeout_ms)),
        }
    }

    /// Register every set, standalone pattern and mapping entry with a new engine.
    ///
    /// Sets are registered first, in file order, so their patterns win
    /// priority ties against standalone ones.
    pub fn build_engine(&self) -> Result<RewriteEngine, RewriteError> {
        self.build_engine_with(self.rewrite_options())
    }

    pub fn build_engine_with(&self, options: RewriteOptions) -> Result<RewriteEngine, RewriteError> {
        let engine = RewriteEngine::new(options);
        for set in self.pattern_sets() {
            engine.add_set(set)?;
        }
        let loose = self.loose_patterns();
        if !loose.is_empty() {
            engine.add_many(loose)?;
        }
        debug!(patterns = engine.read_registry().len(), "engine built from config");
        Ok(engine)
    }
}
