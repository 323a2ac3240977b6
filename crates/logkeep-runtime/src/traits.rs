//! Runtime trait and common types

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use logkeep_core::{LifecycleEvent, Result, Workload};

/// One demultiplexed frame of a workload's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogChunk {
    /// stdout (or the console of a TTY container)
    Primary(Bytes),
    /// stderr
    Secondary(Bytes),
}

impl LogChunk {
    pub fn primary(data: impl Into<Bytes>) -> Self {
        LogChunk::Primary(data.into())
    }

    pub fn secondary(data: impl Into<Bytes>) -> Self {
        LogChunk::Secondary(data.into())
    }
}

/// Frames of a workload's combined output, in arrival order
pub type LogStream = BoxStream<'static, Result<LogChunk>>;

/// Lifecycle events as the runtime reports them
pub type EventStream = BoxStream<'static, Result<LifecycleEvent>>;

/// How a log stream is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStreamOptions {
    /// Keep the stream open and wait for new output
    pub follow: bool,
    /// Prefix each line with the runtime's RFC 3339 timestamp
    pub timestamps: bool,
    /// Number of history lines to replay (None = all)
    pub tail: Option<usize>,
}

impl LogStreamOptions {
    /// Settings used by captures: full history, then follow, timestamped
    pub fn capture() -> Self {
        Self {
            follow: true,
            timestamps: true,
            tail: None,
        }
    }
}

impl Default for LogStreamOptions {
    fn default() -> Self {
        Self::capture()
    }
}

/// Access to the system that runs the workloads (Docker, ...)
#[async_trait]
pub trait WorkloadRuntime: Send + Sync {
    /// Currently running workloads
    async fn list_running(&self) -> Result<Vec<Workload>>;

    /// Open the combined stdout/stderr stream of a workload
    async fn open_log_stream(
        &self,
        workload_id: &str,
        options: &LogStreamOptions,
    ) -> Result<LogStream>;

    /// Subscribe to lifecycle events
    async fn lifecycle_events(&self) -> Result<EventStream>;

    /// Get the runtime name
    fn runtime_name(&self) -> &'static str;
}
