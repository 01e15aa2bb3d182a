//! Retention sweeper.
//!
//! Runs at worker startup and every 30 minutes: removes builds-root and
//! uploads-root entries whose mtime exceeds the retention window, and
//! prunes expired queue rows. Individual failures are logged and skipped;
//! the sweep never aborts and never fails a build.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use demo2apk_core::config::AppConfig;
use demo2apk_queue::JobStore;
use tokio_util::sync::CancellationToken;

/// Interval between sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Run the sweeper loop until cancelled. The first sweep happens
/// immediately at startup.
pub async fn run(store: Arc<dyn JobStore>, config: Arc<AppConfig>, cancel: CancellationToken) {
    tracing::info!(
        retention_hours = config.file_retention_hours,
        interval_secs = SWEEP_INTERVAL.as_secs(),
        "Retention sweeper started",
    );

    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Retention sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                sweep_once(&store, &config).await;
            }
        }
    }
}

/// One full sweep over both storage roots plus queue retention.
pub async fn sweep_once(store: &Arc<dyn JobStore>, config: &AppConfig) {
    let cutoff = SystemTime::now() - config.file_retention();

    let removed_builds = sweep_dir(&config.builds_dir, cutoff).await;
    let removed_uploads = sweep_dir(&config.uploads_dir, cutoff).await;
    if removed_builds + removed_uploads > 0 {
        tracing::info!(
            builds = removed_builds,
            uploads = removed_uploads,
            "Sweeper reclaimed expired files",
        );
    }

    match store.prune().await {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "Sweeper pruned expired queue entries"),
        Err(e) => tracing::error!(error = %e, "Queue retention pruning failed"),
    }
}

/// Remove every direct child of `dir` whose mtime is older than `cutoff`.
/// Files are unlinked, directories removed recursively. Returns the number
/// of entries reclaimed.
pub async fn sweep_dir(dir: &Path, cutoff: SystemTime) -> u64 {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Sweeper cannot read directory");
            return 0;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Sweeper cannot list entry");
                break;
            }
        };
        let path = entry.path();

        let expired = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(mtime) => mtime < cutoff,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Sweeper cannot stat entry");
                continue;
            }
        };
        if !expired {
            continue;
        }

        let result = if path.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Sweeper removed expired entry");
                removed += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Sweeper failed to remove entry");
            }
        }
    }

    removed
}
