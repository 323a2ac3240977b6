//! Workload discovery - attaches exactly one capture to every running workload

use futures::StreamExt;
use logkeep_core::{Config, Error, LifecycleEvent, Result, Workload};
use logkeep_runtime::WorkloadRuntime;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::capture::{capture_workload, CaptureSettings};

/// IDs of workloads with a live capture
#[derive(Debug, Default)]
pub struct AttachmentRegistry {
    attached: Mutex<HashSet<String>>,
}

impl AttachmentRegistry {
    /// Claim a workload; false if it already has a capture
    pub fn claim(&self, id: &str) -> bool {
        self.attached.lock().insert(id.to_string())
    }

    pub fn release(&self, id: &str) {
        self.attached.lock().remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.attached.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.attached.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases a registry entry when its capture task ends, however it ends
struct Attachment {
    registry: Arc<AttachmentRegistry>,
    id: String,
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.registry.release(&self.id);
    }
}

/// Short form of a container ID for log output
fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// Discovery and lifecycle manager
pub struct Discovery {
    runtime: Arc<dyn WorkloadRuntime>,
    config: Arc<Config>,
    settings: Arc<CaptureSettings>,
    registry: Arc<AttachmentRegistry>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl Discovery {
    pub fn new(runtime: Arc<dyn WorkloadRuntime>, config: Arc<Config>) -> Self {
        let settings = Arc::new(CaptureSettings::from_config(&config));
        Self {
            runtime,
            config,
            settings,
            registry: Arc::new(AttachmentRegistry::default()),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<AttachmentRegistry> {
        &self.registry
    }

    /// Whether a workload belongs to the service itself
    pub fn is_excluded(&self, workload: &Workload) -> bool {
        self.config.is_excluded(&workload.image, &workload.names)
    }

    /// Start a capture for `workload` unless it already has one.
    /// Returns whether a new capture was spawned.
    pub fn attach(&self, workload: Workload) -> bool {
        let name = workload.display_name(&self.settings.naming);
        if !self.registry.claim(&workload.id) {
            debug!(id = %short_id(&workload.id), name = %name, "already attached");
            return false;
        }

        let attachment = Attachment {
            registry: Arc::clone(&self.registry),
            id: workload.id.clone(),
        };
        let runtime = Arc::clone(&self.runtime);
        let settings = Arc::clone(&self.settings);
        let cancel = self.cancel.child_token();

        self.tracker.spawn(async move {
            let _attachment = attachment;
            let id = short_id(&workload.id);
            info!(id = %id, name = %name, "Attaching to workload");

            match capture_workload(runtime.as_ref(), &workload, &settings, &cancel).await {
                Ok(stats) => info!(
                    id = %id,
                    name = %name,
                    "Capture ended ({:?}): {} lines written, {} duplicates dropped, file {}",
                    stats.end,
                    stats.written,
                    stats.suppressed,
                    stats.path.display()
                ),
                Err(e) => error!(id = %id, name = %name, "Capture failed: {}", e),
            }
        });

        true
    }

    /// Attach to every running workload. Returns the number of new captures.
    pub async fn attach_running(&self) -> Result<usize> {
        let workloads = self.runtime.list_running().await?;
        info!("Found {} running workloads", workloads.len());

        let mut attached = 0;
        for workload in workloads {
            if self.is_excluded(&workload) {
                debug!(id = %short_id(&workload.id), "skipping own workload");
                continue;
            }
            if self.attach(workload) {
                attached += 1;
            }
        }
        Ok(attached)
    }

    /// Follow the lifecycle feed and attach to created or started workloads.
    ///
    /// Docker reports `create` before the container runs, so a workload that
    /// is not running yet on `create` is picked up by its `start` event.
    ///
    /// Returns when the feed fails or closes (no reconnect), or with Ok on
    /// shutdown. Running captures are not affected either way.
    pub async fn listen(&self) -> Result<()> {
        let mut events = self.runtime.lifecycle_events().await?;
        info!("Listening for {} lifecycle events", self.runtime.runtime_name());

        loop {
            let item = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                item = events.next() => item,
            };

            match item {
                Some(Ok(event)) if event.triggers_attach() => {
                    self.handle_event(&event).await;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => return Err(Error::runtime("lifecycle event feed closed")),
            }
        }
    }

    /// Attach to the subject of a create or start event. A failed listing drops the event.
    async fn handle_event(&self, event: &LifecycleEvent) -> bool {
        let id = short_id(&event.subject_id);
        let workloads = match self.runtime.list_running().await {
            Ok(workloads) => workloads,
            Err(e) => {
                error!(id = %id, "Dropping {} event, listing workloads failed: {}", event.action, e);
                return false;
            }
        };

        let Some(workload) = workloads.into_iter().find(|w| w.id == event.subject_id) else {
            debug!(id = %id, "{} workload is not running yet", event.action);
            return false;
        };

        if self.is_excluded(&workload) {
            debug!(id = %id, "skipping own workload");
            return false;
        }

        self.attach(workload)
    }

    /// Wait until every capture spawned so far (and any spawned while waiting) has ended
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Drain in a background task, logging once every capture has ended
    pub fn spawn_drain(self: &Arc<Self>) -> JoinHandle<()> {
        let discovery = Arc::clone(self);
        tokio::spawn(async move {
            discovery.drain().await;
            info!("All captures have ended");
        })
    }

    /// Ask every capture and the listener to stop
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Number of captures still running
    pub fn active(&self) -> usize {
        self.tracker.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logkeep_core::{ArchiveKey, HELPER_IMAGE, SELF_NAME};
    use std::fs;
    use logkeep_runtime::{LogChunk, MockRuntime};
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Arc<Config> {
        Arc::new(Config {
            logs_dir: dir.path().to_path_buf(),
            ..Config::default()
        })
    }

    fn discovery(runtime: &Arc<MockRuntime>, dir: &TempDir) -> Arc<Discovery> {
        let runtime: Arc<dyn WorkloadRuntime> = Arc::clone(runtime) as Arc<dyn WorkloadRuntime>;
        Arc::new(Discovery::new(runtime, config(dir)))
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_registry_claim_release() {
        let registry = AttachmentRegistry::default();
        assert!(registry.claim("a"));
        assert!(!registry.claim("a"));
        assert!(registry.contains("a"));

        registry.release("a");
        assert!(registry.is_empty());
        assert!(registry.claim("a"));
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }

    #[tokio::test]
    async fn test_attach_running_skips_own_workloads() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(MockRuntime::new());
        runtime.add_workload(Workload::new("a", "web", "nginx"));
        runtime.add_workload(Workload::new("b", "db", "postgres"));
        runtime.add_workload(Workload::new("c", "helper", HELPER_IMAGE));
        runtime.add_workload(Workload::new("d", SELF_NAME, "logkeep:latest"));

        let discovery = discovery(&runtime, &dir);
        assert_eq!(discovery.attach_running().await.unwrap(), 2);

        wait_until(|| runtime.opened().len() == 2).await;
        let mut opened = runtime.opened();
        opened.sort();
        assert_eq!(opened, vec!["a", "b"]);
        assert_eq!(discovery.registry().len(), 2);

        discovery.shutdown();
        discovery.drain().await;
    }

    #[tokio::test]
    async fn test_attach_running_listing_failure() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(MockRuntime::new());
        runtime.fail_listing(true);

        let discovery = discovery(&runtime, &dir);
        assert!(discovery.attach_running().await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_attach_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(MockRuntime::new());
        let discovery = discovery(&runtime, &dir);

        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let discovery = Arc::clone(&discovery);
                tokio::spawn(async move { discovery.attach(Workload::new("a", "web", "nginx")) })
            })
            .collect();

        let mut spawned = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                spawned += 1;
            }
        }
        assert_eq!(spawned, 1);

        wait_until(|| runtime.opened().len() == 1).await;
        assert_eq!(discovery.active(), 1);

        discovery.shutdown();
        discovery.drain().await;
        assert!(discovery.registry().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_create_events_attach_once() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(MockRuntime::new());
        runtime.add_workload(Workload::new("a", "web", "nginx"));
        let events = runtime.event_feed();
        let discovery = discovery(&runtime, &dir);

        for _ in 0..5 {
            events.send(Ok(LifecycleEvent::container_created("a"))).unwrap();
        }
        drop(events);

        let result = discovery.listen().await;
        assert!(result.is_err(), "closed feed stops the listener");

        wait_until(|| runtime.opened().len() == 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runtime.opened(), vec!["a"]);
        assert_eq!(runtime.list_calls(), 5);

        discovery.shutdown();
        discovery.drain().await;
    }

    #[tokio::test]
    async fn test_create_event_for_own_workload_ignored() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(MockRuntime::new());
        runtime.add_workload(Workload::new("h", "coolify-helper-run", HELPER_IMAGE));
        runtime.add_workload(Workload::new("s", SELF_NAME, "logkeep:latest"));
        let events = runtime.event_feed();
        let discovery = discovery(&runtime, &dir);

        events.send(Ok(LifecycleEvent::container_created("h"))).unwrap();
        events.send(Ok(LifecycleEvent::container_created("s"))).unwrap();
        drop(events);

        let _ = discovery.listen().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(runtime.opened().is_empty());
        assert!(discovery.registry().is_empty());
    }

    #[tokio::test]
    async fn test_other_events_ignored() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(MockRuntime::new());
        runtime.add_workload(Workload::new("a", "web", "nginx"));
        let events = runtime.event_feed();
        let discovery = discovery(&runtime, &dir);

        events
            .send(Ok(LifecycleEvent {
                kind: "container".into(),
                action: "die".into(),
                subject_id: "a".into(),
            }))
            .unwrap();
        drop(events);

        let _ = discovery.listen().await;
        assert_eq!(runtime.list_calls(), 0);
        assert!(discovery.registry().is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_drops_event_only() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(MockRuntime::new());
        runtime.add_workload(Workload::new("a", "web", "nginx"));
        runtime.add_workload(Workload::new("b", "db", "postgres"));
        let events = runtime.event_feed();
        let discovery = discovery(&runtime, &dir);

        let listener = {
            let discovery = Arc::clone(&discovery);
            tokio::spawn(async move { discovery.listen().await })
        };

        runtime.fail_listing(true);
        events.send(Ok(LifecycleEvent::container_created("a"))).unwrap();
        wait_until(|| runtime.list_calls() == 1).await;

        runtime.fail_listing(false);
        events.send(Ok(LifecycleEvent::container_created("b"))).unwrap();
        wait_until(|| runtime.opened().len() == 1).await;
        assert_eq!(runtime.opened(), vec!["b"]);
        assert!(!discovery.registry().contains("a"));

        drop(events);
        assert!(listener.await.unwrap().is_err());

        discovery.shutdown();
        discovery.drain().await;
    }

    #[tokio::test]
    async fn test_feed_error_keeps_captures_running() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(MockRuntime::new());
        runtime.add_workload(Workload::new("a", "web", "nginx"));
        let events = runtime.event_feed();
        let discovery = discovery(&runtime, &dir);

        discovery.attach_running().await.unwrap();
        events.send(Err(Error::runtime("socket closed"))).unwrap();

        let result = discovery.listen().await;
        assert!(matches!(result, Err(Error::RuntimeError(_))));

        wait_until(|| runtime.opened().len() == 1).await;
        assert!(discovery.registry().contains("a"));
        assert_eq!(discovery.active(), 1);

        discovery.shutdown();
        discovery.drain().await;
    }

    #[tokio::test]
    async fn test_finished_capture_releases_registry() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(MockRuntime::new());
        runtime.add_workload(Workload::new("a", "web", "nginx"));
        let feed = runtime.log_feed("a");
        let discovery = discovery(&runtime, &dir);

        discovery.attach_running().await.unwrap();
        feed.send(Ok(LogChunk::primary(&b"2024-01-01T10:00:00Z bye\n"[..]))).unwrap();
        drop(feed);

        tokio::time::timeout(Duration::from_secs(2), discovery.drain())
            .await
            .unwrap();
        assert!(discovery.registry().is_empty());
        assert_eq!(discovery.active(), 0);
    }

    #[tokio::test]
    async fn test_start_event_attaches_workload_missed_on_create() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(MockRuntime::new());
        let events = runtime.event_feed();
        let discovery = discovery(&runtime, &dir);

        let listener = {
            let discovery = Arc::clone(&discovery);
            tokio::spawn(async move { discovery.listen().await })
        };

        // created but not running yet
        events.send(Ok(LifecycleEvent::container_created("a"))).unwrap();
        wait_until(|| runtime.list_calls() == 1).await;
        assert!(discovery.registry().is_empty());

        runtime.add_workload(Workload::new("a", "web", "nginx"));
        events.send(Ok(LifecycleEvent::container_started("a"))).unwrap();
        wait_until(|| runtime.opened().len() == 1).await;
        assert!(discovery.registry().contains("a"));

        // a second start while attached does not spawn another capture
        events.send(Ok(LifecycleEvent::container_started("a"))).unwrap();
        wait_until(|| runtime.list_calls() == 3).await;
        assert_eq!(runtime.opened(), vec!["a"]);

        drop(events);
        assert!(listener.await.unwrap().is_err());

        discovery.shutdown();
        discovery.drain().await;
    }

    #[tokio::test]
    async fn test_write_failure_ends_only_that_capture() {
        let dir = TempDir::new().unwrap();
        // a regular file where the archive directory of "alpha" belongs
        fs::write(dir.path().join("alpha"), b"not a directory").unwrap();

        let runtime = Arc::new(MockRuntime::new());
        runtime.add_workload(Workload::new("a", "alpha", "nginx"));
        runtime.add_workload(Workload::new("b", "beta", "postgres"));
        let feed = runtime.log_feed("b");
        let discovery = discovery(&runtime, &dir);

        assert_eq!(discovery.attach_running().await.unwrap(), 2);
        wait_until(|| runtime.opened().len() == 2).await;
        wait_until(|| !discovery.registry().contains("a")).await;
        assert!(discovery.registry().contains("b"));
        assert_eq!(discovery.active(), 1);

        feed.send(Ok(LogChunk::primary(&b"2024-01-01T10:00:00Z still here\n"[..])))
            .unwrap();
        drop(feed);

        tokio::time::timeout(Duration::from_secs(2), discovery.drain())
            .await
            .unwrap();
        assert!(discovery.registry().is_empty());

        let beta = fs::read_to_string(ArchiveKey::today("beta").path(dir.path(), 0)).unwrap();
        assert!(beta.contains("still here"));
        assert!(dir.path().join("alpha").is_file());
    }

    #[tokio::test]
    async fn test_spawned_drain_finishes_with_captures() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(MockRuntime::new());
        runtime.add_workload(Workload::new("a", "web", "nginx"));
        let feed = runtime.log_feed("a");
        let discovery = discovery(&runtime, &dir);

        discovery.attach_running().await.unwrap();
        let drained = discovery.spawn_drain();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!drained.is_finished());

        drop(feed);
        tokio::time::timeout(Duration::from_secs(2), drained)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(discovery.active(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_listener() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(MockRuntime::new());
        let _events = runtime.event_feed();
        let discovery = discovery(&runtime, &dir);

        let listener = {
            let discovery = Arc::clone(&discovery);
            tokio::spawn(async move { discovery.listen().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        discovery.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), listener)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
