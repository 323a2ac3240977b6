//! Stream attachment worker - captures one workload's output into the archive

use futures::StreamExt;
use logkeep_core::{ArchiveKey, Config, NamingConfig, Result, Workload};
use logkeep_logs::{ArchiveFile, DedupWriter, RotationConfig};
use logkeep_runtime::{LogChunk, LogStreamOptions, WorkloadRuntime};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Settings shared by every capture
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub logs_dir: PathBuf,
    pub rotation: RotationConfig,
    pub naming: NamingConfig,
    pub dedup_capacity: Option<usize>,
}

impl CaptureSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            logs_dir: config.logs_dir.clone(),
            rotation: RotationConfig::new(config.max_file_size),
            naming: config.naming.clone(),
            dedup_capacity: config.dedup_capacity,
        }
    }
}

/// Why a capture stopped without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    /// The runtime closed the stream (workload stopped)
    StreamClosed,
    /// Shutdown was requested
    Cancelled,
}

/// Outcome of a finished capture
#[derive(Debug, Clone)]
pub struct CaptureStats {
    pub path: PathBuf,
    pub written: u64,
    pub suppressed: u64,
    pub end: CaptureEnd,
}

/// Capture a workload until its stream closes, fails or `cancel` fires.
///
/// The archive key is resolved once, from the display name and today's date.
/// stdout and stderr go through separate dedup writers into the same file.
pub async fn capture_workload(
    runtime: &dyn WorkloadRuntime,
    workload: &Workload,
    settings: &CaptureSettings,
    cancel: &CancellationToken,
) -> Result<CaptureStats> {
    let name = workload.display_name(&settings.naming);
    if let Some(label) = workload.label_name(&settings.naming) {
        if label != name {
            warn!(id = %workload.id, label = %label, "Unusable name label, archiving as {}", name);
        }
    }
    let key = ArchiveKey::today(name);

    let mut stream = runtime
        .open_log_stream(&workload.id, &LogStreamOptions::capture())
        .await?;

    let sink = Arc::new(ArchiveFile::open(&settings.logs_dir, &key, &settings.rotation)?);
    debug!(id = %workload.id, "capturing into {}", sink.path().display());

    let mut primary = DedupWriter::with_capacity(Arc::clone(&sink), settings.dedup_capacity);
    let mut secondary = DedupWriter::with_capacity(Arc::clone(&sink), settings.dedup_capacity);

    let outcome = loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break Ok(CaptureEnd::Cancelled),
            item = stream.next() => item,
        };

        let written = match item {
            Some(Ok(LogChunk::Primary(data))) => primary.write(&data),
            Some(Ok(LogChunk::Secondary(data))) => secondary.write(&data),
            Some(Err(e)) => break Err(e),
            None => break Ok(CaptureEnd::StreamClosed),
        };
        if let Err(e) = written {
            break Err(e);
        }
    };

    // Both writers flush even when the other one fails
    let flushed_primary = primary.finish();
    let flushed_secondary = secondary.finish();

    let end = outcome?;
    flushed_primary?;
    flushed_secondary?;

    Ok(CaptureStats {
        path: sink.path().to_path_buf(),
        written: primary.written() + secondary.written(),
        suppressed: primary.suppressed() + secondary.suppressed(),
        end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use logkeep_core::Error;
    use logkeep_runtime::MockRuntime;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> CaptureSettings {
        CaptureSettings {
            logs_dir: dir.path().to_path_buf(),
            rotation: RotationConfig::default(),
            naming: NamingConfig::default(),
            dedup_capacity: None,
        }
    }

    fn archive_path(dir: &TempDir, name: &str) -> PathBuf {
        ArchiveKey::today(name).path(dir.path(), 0)
    }

    #[tokio::test]
    async fn test_capture_writes_both_channels() {
        let dir = TempDir::new().unwrap();
        let runtime = MockRuntime::new();
        let workload = Workload::new("a1", "web", "nginx");
        let feed = runtime.log_feed("a1");

        feed.send(Ok(LogChunk::primary(&b"2024-01-01T10:00:00Z \x1b[32mup\x1b[0m\n"[..]))).unwrap();
        feed.send(Ok(LogChunk::secondary(&b"2024-01-01T10:00:01Z warn\n"[..]))).unwrap();
        feed.send(Ok(LogChunk::primary(&b"2024-01-01T10:00:00Z up\n"[..]))).unwrap();
        drop(feed);

        let stats = capture_workload(&runtime, &workload, &settings(&dir), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.end, CaptureEnd::StreamClosed);
        assert_eq!(stats.written, 2);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(stats.path, archive_path(&dir, "web"));

        let content = fs::read_to_string(&stats.path).unwrap();
        assert_eq!(content, "2024-01-01T10:00:00Z up\n2024-01-01T10:00:01Z warn\n");
    }

    #[tokio::test]
    async fn test_capture_uses_display_name() {
        let dir = TempDir::new().unwrap();
        let runtime = MockRuntime::new();
        let workload = Workload::new("a1", "random_name", "app:1")
            .with_label("coolify.name", "shop")
            .with_label("coolify.pullRequestId", "7");
        drop(runtime.log_feed("a1"));

        let stats = capture_workload(&runtime, &workload, &settings(&dir), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.path, archive_path(&dir, "shop-pr-7"));
    }

    #[tokio::test]
    async fn test_unsafe_name_label_stays_inside_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("logs");
        fs::create_dir(&root).unwrap();
        let settings = CaptureSettings {
            logs_dir: root.clone(),
            ..settings(&dir)
        };
        let runtime = MockRuntime::new();

        let escaping = Workload::new("a1", "web", "app:1").with_label("coolify.name", "..");
        let feed = runtime.log_feed("a1");
        feed.send(Ok(LogChunk::primary(&b"2024-01-01T10:00:00Z hi\n"[..])))
            .unwrap();
        drop(feed);
        let stats = capture_workload(&runtime, &escaping, &settings, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.path, ArchiveKey::today("web").path(&root, 0));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        let nested = Workload::new("b2", "api", "app:1").with_label("coolify.name", "team/api");
        drop(runtime.log_feed("b2"));
        let stats = capture_workload(&runtime, &nested, &settings, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.path, ArchiveKey::today("api").path(&root, 0));
        assert!(!root.join("team").exists());

        let range = logkeep_core::TimeRange::from_bounds(None, None).unwrap();
        let logs = logkeep_logs::ArchiveReader::new(&root).query("web", &range).unwrap();
        assert_eq!(logs, vec!["2024-01-01T10:00:00Z hi"]);
    }

    #[tokio::test]
    async fn test_unwritable_archive_dir_fails_capture() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("web"), b"").unwrap();
        let runtime = MockRuntime::new();
        let workload = Workload::new("a1", "web", "app:1");

        let result =
            capture_workload(&runtime, &workload, &settings(&dir), &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::IoError(_))));
    }

    #[tokio::test]
    async fn test_stream_error_ends_capture() {
        let dir = TempDir::new().unwrap();
        let runtime = MockRuntime::new();
        let workload = Workload::new("a1", "web", "nginx");
        let feed = runtime.log_feed("a1");

        feed.send(Ok(LogChunk::primary(&b"2024-01-01T10:00:00Z partial"[..]))).unwrap();
        feed.send(Err(Error::stream("connection reset"))).unwrap();

        let result =
            capture_workload(&runtime, &workload, &settings(&dir), &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::StreamError(_))));

        // The partial line is still flushed before the worker gives up
        let content = fs::read_to_string(archive_path(&dir, "web")).unwrap();
        assert_eq!(content, "2024-01-01T10:00:00Z partial\n");
    }

    #[tokio::test]
    async fn test_cancel_stops_capture() {
        let dir = TempDir::new().unwrap();
        let runtime = MockRuntime::new();
        let workload = Workload::new("a1", "web", "nginx");
        let cancel = CancellationToken::new();

        let handle = {
            let settings = settings(&dir);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                capture_workload(&runtime, &workload, &settings, &cancel).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let stats = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(stats.end, CaptureEnd::Cancelled);
        assert_eq!(stats.written, 0);
    }

    #[tokio::test]
    async fn test_failing_workload_does_not_affect_others() {
        let dir = TempDir::new().unwrap();
        let runtime = Arc::new(MockRuntime::new());
        let feed_a = runtime.log_feed("a");
        let feed_b = runtime.log_feed("b");

        let spawn = |workload: Workload| {
            let runtime = Arc::clone(&runtime);
            let settings = settings(&dir);
            tokio::spawn(async move {
                capture_workload(runtime.as_ref(), &workload, &settings, &CancellationToken::new())
                    .await
            })
        };
        let worker_a = spawn(Workload::new("a", "alpha", "img"));
        let worker_b = spawn(Workload::new("b", "beta", "img"));

        feed_a.send(Ok(LogChunk::primary(&b"2024-01-01T10:00:00Z a1\n"[..]))).unwrap();
        feed_b.send(Ok(LogChunk::primary(&b"2024-01-01T10:00:00Z b1\n"[..]))).unwrap();
        feed_a.send(Err(Error::stream("read failed"))).unwrap();

        let result_a = worker_a.await.unwrap();
        assert!(result_a.is_err());

        feed_b.send(Ok(LogChunk::primary(&b"2024-01-01T10:00:01Z b2\n"[..]))).unwrap();
        drop(feed_b);

        let stats_b = worker_b.await.unwrap().unwrap();
        assert_eq!(stats_b.written, 2);
        let content = fs::read_to_string(archive_path(&dir, "beta")).unwrap();
        assert_eq!(content, "2024-01-01T10:00:00Z b1\n2024-01-01T10:00:01Z b2\n");
    }
}
