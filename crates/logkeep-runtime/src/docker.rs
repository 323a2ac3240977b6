//! Docker runtime implementation using bollard.
//!
//! bollard decodes the Engine API's multiplexed log framing (8-byte header
//! carrying the stream type and frame length) into per-channel frames, which
//! are mapped onto [`LogChunk`] here.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{ListContainersOptions, LogOutput, LogsOptions};
use bollard::models::{ContainerSummary, EventMessage, EventMessageTypeEnum};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures::StreamExt;
use logkeep_core::{Error, LifecycleEvent, Result, Workload};
use tracing::{debug, info};

use crate::traits::{EventStream, LogChunk, LogStream, LogStreamOptions, WorkloadRuntime};

/// Seconds before a request to the Docker daemon times out
const DOCKER_TIMEOUT_SECS: u64 = 120;

/// Docker Engine runtime
#[derive(Clone)]
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect using DOCKER_HOST or the local socket
    pub fn connect() -> Result<Self> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| Error::runtime(format!("failed to connect to Docker: {e}")))?;
        Ok(Self { client })
    }

    /// Connect to a Docker daemon at a specific URL
    pub fn connect_with_url(url: &str) -> Result<Self> {
        let client = Docker::connect_with_http(url, DOCKER_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            .map_err(|e| Error::runtime(format!("failed to connect to Docker at {url}: {e}")))?;
        Ok(Self { client })
    }

    /// Connect to `host` if given, local defaults otherwise
    pub fn from_host(host: Option<&str>) -> Result<Self> {
        match host {
            Some(url) => Self::connect_with_url(url),
            None => Self::connect(),
        }
    }

    /// Check that the daemon answers
    pub async fn ping(&self) -> Result<()> {
        self.client
            .ping()
            .await
            .map_err(|e| Error::runtime(format!("Docker ping failed: {e}")))?;
        info!("Connected to Docker daemon");
        Ok(())
    }
}

#[async_trait]
impl WorkloadRuntime for DockerRuntime {
    async fn list_running(&self) -> Result<Vec<Workload>> {
        let containers = self
            .client
            .list_containers(Some(ListContainersOptions::<String>::default()))
            .await
            .map_err(|e| Error::runtime(format!("failed to list containers: {e}")))?;

        Ok(containers.into_iter().filter_map(workload_from_summary).collect())
    }

    async fn open_log_stream(
        &self,
        workload_id: &str,
        options: &LogStreamOptions,
    ) -> Result<LogStream> {
        let log_options = LogsOptions::<String> {
            follow: options.follow,
            stdout: true,
            stderr: true,
            timestamps: options.timestamps,
            tail: options
                .tail
                .map(|n| n.to_string())
                .unwrap_or_else(|| "all".to_string()),
            ..Default::default()
        };

        debug!(id = %workload_id, "opening log stream");
        let id = workload_id.to_string();
        let stream = self
            .client
            .logs(workload_id, Some(log_options))
            .filter_map(move |item| {
                let item = match item {
                    Ok(output) => chunk_from_output(output).map(Ok),
                    Err(e) => Some(Err(Error::stream(format!("log stream of {id}: {e}")))),
                };
                futures::future::ready(item)
            });

        Ok(stream.boxed())
    }

    async fn lifecycle_events(&self) -> Result<EventStream> {
        let filters = HashMap::from([("type".to_string(), vec!["container".to_string()])]);
        let options = EventsOptions::<String> {
            filters,
            ..Default::default()
        };

        let stream = self.client.events(Some(options)).map(|item| match item {
            Ok(message) => Ok(event_from_message(message)),
            Err(e) => Err(Error::runtime(format!("event feed failed: {e}"))),
        });

        Ok(stream.boxed())
    }

    fn runtime_name(&self) -> &'static str {
        "docker"
    }
}

/// Convert a container list entry; entries without an ID are skipped
fn workload_from_summary(summary: ContainerSummary) -> Option<Workload> {
    Some(Workload {
        id: summary.id?,
        names: summary.names.unwrap_or_default(),
        image: summary.image.unwrap_or_default(),
        labels: summary.labels.unwrap_or_default(),
    })
}

fn event_from_message(message: EventMessage) -> LifecycleEvent {
    let kind = match message.typ {
        Some(EventMessageTypeEnum::CONTAINER) => "container".to_string(),
        Some(other) => format!("{:?}", other).to_lowercase(),
        None => String::new(),
    };

    LifecycleEvent {
        kind,
        action: message.action.unwrap_or_default(),
        subject_id: message.actor.and_then(|a| a.id).unwrap_or_default(),
    }
}

/// stdin frames never carry workload output
fn chunk_from_output(output: LogOutput) -> Option<LogChunk> {
    match output {
        LogOutput::StdOut { message } | LogOutput::Console { message } => {
            Some(LogChunk::Primary(message))
        }
        LogOutput::StdErr { message } => Some(LogChunk::Secondary(message)),
        LogOutput::StdIn { .. } => None,
    }
}
