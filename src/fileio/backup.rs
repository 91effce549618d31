//! Backups taken before a file is overwritten.
//!
//! Simple backups live at `<path><suffix>` and are replaced on every run.
//! Advanced backups are timestamped (`<path><suffix>.<UTC timestamp>`) and
//! carry a `<backup>.metadata.json` sidecar. Either way the copy is read back
//! and checksummed before the caller may touch the original.

use crate::fileio::errors::BackupError;
use crate::fileio::fs::{atomic_write, FileSystem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

const METADATA_EXTENSION: &str = ".metadata.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    #[default]
    Simple,
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
    pub mode: BackupMode,
    pub suffix: String,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            mode: BackupMode::Simple,
            suffix: ".bak".to_string(),
        }
    }
}

/// Sidecar written next to advanced backups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub original_path: PathBuf,
    pub size: u64,
    /// xxh3 of the backed-up bytes, lowercase hex
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// A verified backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Backup {
    pub path: PathBuf,
    pub metadata_path: Option<PathBuf>,
    pub size: u64,
    pub checksum: u64,
}

/// Where the backup of `path` goes.
pub fn backup_path(path: &Path, options: &BackupOptions, now: DateTime<Utc>) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(&options.suffix);
    if options.mode == BackupMode::Advanced {
        name.push(".");
        name.push(now.format("%Y%m%dT%H%M%S%.3fZ").to_string());
    }
    PathBuf::from(name)
}

pub fn metadata_path(backup: &Path) -> PathBuf {
    let mut name = OsString::from(backup.as_os_str());
    name.push(METADATA_EXTENSION);
    PathBuf::from(name)
}

/// Copy `path` to its backup location and verify the copy matches `original`.
///
/// `original` is the content the caller read and is about to transform.
pub fn create_backup(
    fs: &dyn FileSystem,
    path: &Path,
    original: &[u8],
    options: &BackupOptions,
) -> Result<Backup, BackupError> {
    let now = Utc::now();
    let backup = backup_path(path, options, now);
    let fail = |cause: io::Error| BackupError {
        path: path.to_path_buf(),
        backup_path: backup.clone(),
        cause,
    };

    fs.copy(path, &backup).map_err(fail)?;

    let checksum = xxh3_64(original);
    let copied = fs.read(&backup).map_err(fail)?;
    if xxh3_64(&copied) != checksum || copied.len() != original.len() {
        return Err(fail(io::Error::new(
            io::ErrorKind::InvalidData,
            "backup content does not match the file being rewritten",
        )));
    }

    let metadata_path = if options.mode == BackupMode::Advanced {
        let sidecar = metadata_path(&backup);
        let metadata = BackupMetadata {
            original_path: path.to_path_buf(),
            size: original.len() as u64,
            checksum: format!("{checksum:016x}"),
            created_at: now,
        };
        let json = serde_json::to_vec_pretty(&metadata).map_err(|e| fail(io::Error::other(e)))?;
        fs.write(&sidecar, &json).map_err(fail)?;
        Some(sidecar)
    } else {
        None
    };

    debug!(path = %path.display(), backup = %backup.display(), "backup verified");
    Ok(Backup {
        path: backup,
        metadata_path,
        size: original.len() as u64,
        checksum,
    })
}

/// Read the sidecar of an advanced backup.
pub fn read_metadata(fs: &dyn FileSystem, backup: &Path) -> io::Result<BackupMetadata> {
    let bytes = fs.read(&metadata_path(backup))?;
    serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Copy a backup back over its original.
///
/// The target defaults to the original path recorded in the sidecar. When a
/// sidecar exists its checksum is verified first.
pub fn restore_backup(
    fs: &dyn FileSystem,
    backup: &Path,
    target: Option<&Path>,
) -> Result<PathBuf, BackupError> {
    let metadata = if fs.exists(&metadata_path(backup)) {
        Some(read_metadata(fs, backup).map_err(|cause| BackupError {
            path: target.map(Path::to_path_buf).unwrap_or_default(),
            backup_path: backup.to_path_buf(),
            cause,
        })?)
    } else {
        None
    };

    let target = match (target, &metadata) {
        (Some(target), _) => target.to_path_buf(),
        (None, Some(metadata)) => metadata.original_path.clone(),
        (None, None) => {
            return Err(BackupError {
                path: PathBuf::new(),
                backup_path: backup.to_path_buf(),
                cause: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "no restore target given and no metadata to find the original",
                ),
            })
        }
    };
    let fail = |cause: io::Error| BackupError {
        path: target.clone(),
        backup_path: backup.to_path_buf(),
        cause,
    };

    let content = fs.read(backup).map_err(fail)?;
    if let Some(metadata) = &metadata {
        if format!("{:016x}", xxh3_64(&content)) != metadata.checksum {
            return Err(fail(io::Error::new(
                io::ErrorKind::InvalidData,
                "backup checksum does not match its metadata",
            )));
        }
    }
    atomic_write(fs, &target, &content).map_err(fail)?;

    info!(backup = %backup.display(), target = %target.display(), "backup restored");
    Ok(target)
}
