//! Command implementations

pub mod list;
pub mod logs;
pub mod ping;

use logkeep_core::constants;
use logkeep_logs::ArchiveReader;
use std::time::Duration;

use crate::cli::ArchiveArgs;

/// Seconds before a request to the daemon gives up
const HTTP_TIMEOUT_SECS: u64 = 10;

/// Get a reader over the archive root
pub fn get_reader(args: &ArchiveArgs) -> ArchiveReader {
    let root = args
        .logs_dir
        .clone()
        .unwrap_or_else(constants::default_logs_dir);
    ArchiveReader::new(root)
}

/// Get an HTTP client for talking to the daemon
pub fn get_client() -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()?;
    Ok(client)
}

/// Join the daemon base URL and an API path
pub fn api_url(base: &str, path: &str) -> String {
    format!("{}/api/{}", base.trim_end_matches('/'), path)
}
