//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Where a running daemon's API is expected by default
pub const DEFAULT_URL: &str = "http://127.0.0.1:8889";

#[derive(Parser)]
#[command(name = "logkeep")]
#[command(version, about = "Query and inspect the container log archive")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output in JSON format instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print archived lines of a workload within a time range
    Logs(LogsArgs),

    /// List archived workloads
    List(ArchiveArgs),

    /// Check that a daemon is up and print its version
    Ping(RemoteArgs),
}

#[derive(Args, Clone)]
pub struct ArchiveArgs {
    /// Archive root (default: /app/logs, ./logs with LOGKEEP_DEBUG)
    #[arg(long, env = "LOGKEEP_LOGS_DIR")]
    pub logs_dir: Option<PathBuf>,
}

#[derive(Args, Clone)]
pub struct RemoteArgs {
    /// Base URL of the daemon API
    #[arg(long, env = "LOGKEEP_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// Bearer token for log queries
    #[arg(long, env = "LOGKEEP_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Args)]
pub struct LogsArgs {
    /// Workload display name
    pub workload: String,

    /// Earliest timestamp to include (RFC 3339)
    #[arg(long)]
    pub since: Option<String>,

    /// Latest timestamp to include (RFC 3339)
    #[arg(long)]
    pub until: Option<String>,

    /// Only print lines matching this regex
    #[arg(long)]
    pub grep: Option<String>,

    /// Ask a running daemon instead of reading the archive directly
    #[arg(long)]
    pub remote: bool,

    #[command(flatten)]
    pub archive: ArchiveArgs,

    #[command(flatten)]
    pub daemon: RemoteArgs,
}
