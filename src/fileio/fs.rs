//! Filesystem seam used by file rewrites and backups.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// The filesystem operations a rewrite needs. Implemented for the real
/// filesystem by [`StdFileSystem`]; tests substitute failing variants.
pub trait FileSystem: Send + Sync {
    /// Size of the file in bytes.
    fn stat(&self, path: &Path) -> io::Result<u64>;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate `path`, write `content` and flush it to disk.
    fn write(&self, path: &Path, content: &[u8]) -> io::Result<()>;

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn unlink(&self, path: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn stat(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        let mut file = fs::File::create(path)?;
        file.write_all(content)?;
        file.sync_all()
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Write `content` to a uniquely named sibling temp file, then rename it over
/// `path`. On failure the temp file is removed and `path` is left untouched.
pub fn atomic_write(fs: &dyn FileSystem, path: &Path, content: &[u8]) -> io::Result<()> {
    atomic_write_guarded(fs, path, content, || Ok(()))
}

/// [`atomic_write`] with a last check between writing the temp file and the
/// rename. An error from `before_rename` abandons the write like any other
/// failure.
pub fn atomic_write_guarded<F>(
    fs: &dyn FileSystem,
    path: &Path,
    content: &[u8],
    before_rename: F,
) -> io::Result<()>
where
    F: FnOnce() -> io::Result<()>,
{
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot determine parent directory",
            ))
        }
    };
    let temp_path = parent.join(temp_name(path));

    let result = fs
        .write(&temp_path, content)
        .and_then(|()| before_rename())
        .and_then(|()| fs.rename(&temp_path, path));
    if result.is_err() && fs.exists(&temp_path) {
        let _ = fs.unlink(&temp_path);
    }
    result
}

fn temp_name(path: &Path) -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    format!(
        ".{}.{}.{}.{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        std::process::id(),
        nanos,
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}
