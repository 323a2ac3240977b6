//! logkeep Daemon - Container log capture and archive API

use anyhow::{Context, Result};
use clap::Parser;
use logkeep_core::Config;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod capture;
mod daemon;
mod discovery;

use daemon::Daemon;

/// How long running captures get to flush on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "logkeepd")]
#[command(author, version, about = "Capture container logs into a queryable archive")]
struct Args {
    /// Config file (toml, yaml or json)
    #[arg(short, long, env = "LOGKEEP_CONFIG")]
    config: Option<PathBuf>,

    /// Archive root directory
    #[arg(long, env = "LOGKEEP_LOGS_DIR")]
    logs_dir: Option<PathBuf>,

    /// Address the API listens on
    #[arg(short, long, env = "LOGKEEP_BIND")]
    bind: Option<String>,

    /// Bearer token required for log queries
    #[arg(long, env = "LOGKEEP_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Size in bytes at which an archive file is rotated
    #[arg(long, env = "LOGKEEP_MAX_FILE_SIZE")]
    max_file_size: Option<u64>,

    /// Docker daemon URL (default: DOCKER_HOST or the local socket)
    #[arg(long, env = "LOGKEEP_DOCKER_HOST")]
    docker_host: Option<String>,
}

impl Args {
    /// Load the config file if given and apply flag overrides
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(logs_dir) = self.logs_dir {
            config.logs_dir = logs_dir;
        }
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(token) = self.token {
            config.token = Some(token);
        }
        if let Some(size) = self.max_file_size {
            config.max_file_size = size;
        }
        if let Some(host) = self.docker_host {
            config.docker_host = Some(host);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logkeepd=info,logkeep_logs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Args::parse().into_config()?;
    info!("logkeep daemon {} starting...", logkeep_core::VERSION);

    let daemon = Daemon::new(config).await.context("failed to start daemon")?;

    // Set up signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    let result = tokio::select! {
        result = daemon.run() => result,
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
            Ok(())
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
            Ok(())
        }
    };

    daemon.shutdown(SHUTDOWN_GRACE).await;

    if let Err(e) = result {
        error!("Daemon error: {}", e);
        return Err(e.into());
    }

    info!("Daemon shutdown complete");
    Ok(())
}
