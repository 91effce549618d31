//! File-level rewriting: filesystem seam, backups, transactional writes and batches.

pub mod backup;
pub mod batch;
pub mod errors;
pub mod fs;
pub mod transaction;

pub use backup::{
    backup_path, create_backup, read_metadata, restore_backup, Backup, BackupMetadata, BackupMode,
    BackupOptions,
};
pub use batch::{BatchOperationResult, BatchOptions, BatchProcessor, BatchStatistics, FailedFile};
pub use errors::{BackupError, HtmlRewriteError, RewriteOperation};
pub use fs::{atomic_write, atomic_write_guarded, FileSystem, StdFileSystem};
pub use transaction::{CommitGate, FileOptions, FileOutcome, FileRewriter, DEFAULT_MAX_FILE_SIZE};
