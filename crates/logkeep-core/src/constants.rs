//! Constants and default values for logkeep

use std::path::PathBuf;

/// Default archive root inside the service container
pub const DEFAULT_LOGS_DIR: &str = "/app/logs";

/// Archive root used when `LOGKEEP_DEBUG` is set
pub const DEBUG_LOGS_DIR: &str = "./logs";

/// Environment variable switching to the local debug archive root
pub const DEBUG_ENV: &str = "LOGKEEP_DEBUG";

/// Default max archive file size in bytes (10MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default HTTP bind address
pub const DEFAULT_BIND: &str = "0.0.0.0:8889";

/// Support image that must never be captured
pub const HELPER_IMAGE: &str = "ghcr.io/coollabsio/coolify-helper:latest";

/// Reserved name of the capture service's own container
pub const SELF_NAME: &str = "coolify-logs";

/// Label carrying the workload's display name
pub const NAME_LABEL: &str = "coolify.name";

/// Label carrying the preview (pull request) number, "0" for none
pub const PREVIEW_LABEL: &str = "coolify.pullRequestId";

/// Longest line kept in memory while waiting for its newline (64KB)
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Extension of archive files
pub const ARCHIVE_EXT: &str = "txt";

/// chrono format of the date part of archive file names
pub const ARCHIVE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Directory mode for per-workload archive directories
pub const ARCHIVE_DIR_MODE: u32 = 0o700;

/// Service version reported by the HTTP API and CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the default archive root, honouring the debug switch
pub fn default_logs_dir() -> PathBuf {
    if std::env::var_os(DEBUG_ENV).is_some() {
        PathBuf::from(DEBUG_LOGS_DIR)
    } else {
        PathBuf::from(DEFAULT_LOGS_DIR)
    }
}

/// Get the archive directory of a workload
pub fn workload_dir(root: &std::path::Path, display_name: &str) -> PathBuf {
    root.join(display_name)
}
