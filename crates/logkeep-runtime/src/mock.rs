//! In-memory runtime for testing

use crate::traits::{EventStream, LogChunk, LogStream, LogStreamOptions, WorkloadRuntime};
use async_trait::async_trait;
use futures::StreamExt;
use logkeep_core::{Error, LifecycleEvent, Result, Workload};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

type Feed<T> = mpsc::UnboundedReceiver<Result<T>>;

/// A runtime whose workloads, log output and events are driven by the test.
///
/// Log streams of workloads without a feed stay open and silent, like a
/// followed container that prints nothing.
#[derive(Default)]
pub struct MockRuntime {
    workloads: Mutex<Vec<Workload>>,
    log_feeds: Mutex<HashMap<String, Feed<LogChunk>>>,
    event_feed: Mutex<Option<Feed<LifecycleEvent>>>,
    /// IDs in the order their log streams were opened
    opened: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
    fail_listing: AtomicBool,
}

impl MockRuntime {
    /// Create an empty mock runtime
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a running workload
    pub fn add_workload(&self, workload: Workload) {
        self.workloads.lock().push(workload);
    }

    /// Make the log stream of `id` yield whatever is sent on the returned
    /// sender; the stream ends when the sender is dropped
    pub fn log_feed(&self, id: &str) -> mpsc::UnboundedSender<Result<LogChunk>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.log_feeds.lock().insert(id.to_string(), rx);
        tx
    }

    /// Control the lifecycle event feed
    pub fn event_feed(&self) -> mpsc::UnboundedSender<Result<LifecycleEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.event_feed.lock() = Some(rx);
        tx
    }

    /// Make `list_running` fail
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// IDs whose log stream was opened, in order
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    /// Number of times the running workloads were listed
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

fn feed_stream<T: Send + 'static>(rx: Feed<T>) -> futures::stream::BoxStream<'static, Result<T>> {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed()
}

#[async_trait]
impl WorkloadRuntime for MockRuntime {
    async fn list_running(&self) -> Result<Vec<Workload>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::runtime("Mock listing failure"));
        }
        Ok(self.workloads.lock().clone())
    }

    async fn open_log_stream(
        &self,
        workload_id: &str,
        _options: &LogStreamOptions,
    ) -> Result<LogStream> {
        self.opened.lock().push(workload_id.to_string());

        match self.log_feeds.lock().remove(workload_id) {
            Some(rx) => Ok(feed_stream(rx)),
            None => Ok(futures::stream::pending().boxed()),
        }
    }

    async fn lifecycle_events(&self) -> Result<EventStream> {
        match self.event_feed.lock().take() {
            Some(rx) => Ok(feed_stream(rx)),
            None => Err(Error::runtime("Mock event feed not configured")),
        }
    }

    fn runtime_name(&self) -> &'static str {
        "mock"
    }
}
