//! Main daemon orchestration

use logkeep_core::{Config, Result};
use logkeep_logs::{ensure_logs_root, ArchiveReader};
use logkeep_runtime::{DockerRuntime, WorkloadRuntime};
use logkeep_web::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::discovery::Discovery;

/// Main daemon struct
pub struct Daemon {
    config: Arc<Config>,
    discovery: Arc<Discovery>,
}

impl Daemon {
    /// Create the logs root and connect to Docker
    pub async fn new(config: Config) -> Result<Self> {
        ensure_logs_root(&config.logs_dir)?;
        info!("Archiving logs under {}", config.logs_dir.display());

        let runtime = DockerRuntime::from_host(config.docker_host.as_deref())?;
        runtime.ping().await?;

        Ok(Self::with_runtime(config, Arc::new(runtime)))
    }

    /// Create a daemon over any workload runtime
    pub fn with_runtime(config: Config, runtime: Arc<dyn WorkloadRuntime>) -> Self {
        let config = Arc::new(config);
        let discovery = Arc::new(Discovery::new(runtime, Arc::clone(&config)));
        Self { config, discovery }
    }

    pub fn discovery(&self) -> &Arc<Discovery> {
        &self.discovery
    }

    /// Subscribe to lifecycle events and attach to everything already running.
    ///
    /// The listener is spawned before enumeration so that workloads created
    /// in between are not missed. A failed enumeration is fatal. Waiting for
    /// the started captures to end happens in a background task.
    pub async fn start_capture(&self) -> Result<usize> {
        let listener = Arc::clone(&self.discovery);
        tokio::spawn(async move {
            match listener.listen().await {
                Ok(()) => info!("Event listener stopped"),
                Err(e) => error!("Event listener ended, no new workloads will be attached: {}", e),
            }
        });

        let attached = self.discovery.attach_running().await?;
        info!("Attached to {} workloads", attached);
        self.discovery.spawn_drain();
        Ok(attached)
    }

    /// Run capture and serve the API until the server fails
    pub async fn run(&self) -> Result<()> {
        self.start_capture().await?;

        let state = AppState::new(
            ArchiveReader::new(&self.config.logs_dir),
            self.config.token.clone(),
        );
        if self.config.token.is_none() {
            warn!("No API token configured, log queries are unauthenticated");
        }

        logkeep_web::start_server(&self.config.bind, state).await?;
        Ok(())
    }

    /// Stop every capture and wait up to `grace` for them to finish
    pub async fn shutdown(&self, grace: Duration) {
        self.discovery.shutdown();

        match tokio::time::timeout(grace, self.discovery.drain()).await {
            Ok(()) => info!("All captures stopped"),
            Err(_) => warn!(
                "{} captures still running after {:?}, exiting anyway",
                self.discovery.active(),
                grace
            ),
        }
    }
}
