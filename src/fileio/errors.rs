use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Which step of a file rewrite failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewriteOperation {
    Stat,
    Read,
    Decode,
    Parse,
    Transform,
    Write,
    Timeout,
    SizeLimit,
}

/// A file could not be rewritten.
#[derive(Error, Debug)]
#[error("{operation} failed for {file}: {cause}")]
pub struct HtmlRewriteError {
    /// File path, or `<memory>`
    pub file: String,
    pub operation: RewriteOperation,
    #[source]
    pub cause: Box<dyn std::error::Error + Send + Sync>,
}

/// A requested backup could not be created or verified; the target was not touched.
#[derive(Error, Debug)]
#[error("backup of {} to {} failed: {cause}", path.display(), backup_path.display())]
pub struct BackupError {
    pub path: PathBuf,
    pub backup_path: PathBuf,
    #[source]
    pub cause: io::Error,
}

impl HtmlRewriteError {
    pub fn new(
        file: impl Into<String>,
        operation: RewriteOperation,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            file: file.into(),
            operation,
            cause: cause.into(),
        }
    }
}

impl fmt::Display for RewriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RewriteOperation::Stat => "stat",
            RewriteOperation::Read => "read",
            RewriteOperation::Decode => "decode",
            RewriteOperation::Parse => "parse",
            RewriteOperation::Transform => "transform",
            RewriteOperation::Write => "write",
            RewriteOperation::Timeout => "timeout",
            RewriteOperation::SizeLimit => "size check",
        };
        f.write_str(name)
    }
}
