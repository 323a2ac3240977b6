//! Size-based rotation of archive files
//!
//! Files are never renamed or truncated. When the file for an archive key is
//! at or above the ceiling, the next suffixed name (`2024-01-01.txt(1)`,
//! `(2)`, ...) is tried until one below the ceiling is found. The check runs
//! once when a capture opens its file, so a file may grow past the ceiling
//! while that capture is alive.

use logkeep_core::{constants, validate_workload_name, ArchiveKey, Error, Result};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Log rotation configuration
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Maximum archive file size in bytes
    pub max_size_bytes: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: constants::DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl RotationConfig {
    pub fn new(max_size_bytes: u64) -> Self {
        Self { max_size_bytes }
    }
}

/// An archive file opened for append, shared by the writers of one capture
#[derive(Debug)]
pub struct ArchiveFile {
    path: PathBuf,
    suffix: u32,
    file: Mutex<File>,
}

impl ArchiveFile {
    /// Resolve `key` to the first file below the ceiling and open it for append
    pub fn open(root: &Path, key: &ArchiveKey, config: &RotationConfig) -> Result<Self> {
        if !validate_workload_name(&key.workload) {
            return Err(Error::InvalidWorkload(key.workload.clone()));
        }
        ensure_private_dir(&key.dir(root))?;

        let mut suffix = 0;
        loop {
            let path = key.path(root, suffix);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let size = file.metadata()?.len();

            if size < config.max_size_bytes {
                debug!("Opened archive file {} ({} bytes)", path.display(), size);
                return Ok(Self {
                    path,
                    suffix,
                    file: Mutex::new(file),
                });
            }

            debug!(
                "Archive file {} is full ({} >= {} bytes)",
                path.display(),
                size,
                config.max_size_bytes
            );
            drop(file);
            suffix += 1;
        }
    }

    /// Append one line with a single write so concurrent writers never interleave
    pub fn append_line(&self, line: &str) -> Result<()> {
        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line);
        record.push('\n');

        self.file.lock().write_all(record.as_bytes())?;
        Ok(())
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rotation suffix of this file (0 = unsuffixed)
    pub fn suffix(&self) -> u32 {
        self.suffix
    }

    /// Current size on disk
    pub fn size(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }
}

/// Create a directory (and parents) with owner-only access
pub(crate) fn ensure_private_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new()
            .recursive(true)
            .mode(constants::ARCHIVE_DIR_MODE)
            .create(dir)?;
    }
    #[cfg(not(unix))]
    fs::create_dir_all(dir)?;

    Ok(())
}
