//! logkeep Logs - Deduplicating capture writers, size-based rotation and range queries

mod reader;
mod rotation;
mod writer;

pub use reader::{line_timestamp, ArchiveReader, WorkloadSummary};
pub use rotation::{ArchiveFile, RotationConfig};
pub use writer::{strip_ansi, DedupWriter};

use logkeep_core::Result;
use std::path::Path;

/// Ensure the archive root exists, restricted to the owning user
pub fn ensure_logs_root(root: &Path) -> Result<()> {
    rotation::ensure_private_dir(root)
}
