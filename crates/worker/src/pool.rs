//! Worker pool: N concurrent build slots pulling from the shared queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use demo2apk_core::config::AppConfig;
use demo2apk_core::progress::ProgressSink;
use demo2apk_queue::{BuildResult, Job, JobStore};
use tokio_util::sync::CancellationToken;

use crate::pipeline;

/// How often an idle slot polls for work.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Progress sink writing into the job record. The store clamps percent
/// upward, so heartbeat and real reports may interleave freely.
struct StoreSink {
    store: Arc<dyn JobStore>,
    task_id: String,
}

#[async_trait]
impl ProgressSink for StoreSink {
    async fn report(&self, percent: i16, message: &str) {
        if let Err(e) = self.store.update_progress(&self.task_id, percent, message).await {
            tracing::warn!(task = %self.task_id, error = %e, "Failed to write progress");
        }
    }
}

/// One build slot: poll, claim, build, record, repeat. Runs until the
/// cancellation token fires; an in-flight build always drains first.
pub async fn run_slot(
    slot: usize,
    store: Arc<dyn JobStore>,
    config: Arc<AppConfig>,
    cancel: CancellationToken,
) {
    tracing::info!(slot, "Build slot started");
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(slot, "Build slot stopping");
                break;
            }
            _ = ticker.tick() => {
                match store.claim_next().await {
                    Ok(Some(job)) => process_claimed(&store, &config, job).await,
                    Ok(None) => {}
                    Err(e) => tracing::error!(slot, error = %e, "Failed to poll the queue"),
                }
            }
        }
    }
}

/// Run one claimed job to its terminal state. A bad build never takes the
/// worker down: pipeline errors and panics are both recorded on the job.
pub async fn process_claimed(store: &Arc<dyn JobStore>, config: &Arc<AppConfig>, job: Job) {
    let task_id = job.task_id.clone();
    let started = Instant::now();
    tracing::info!(
        task = %task_id,
        app = %job.app_name,
        kind = %job.kind,
        "Build started",
    );

    let sink: Arc<dyn ProgressSink> = Arc::new(StoreSink {
        store: Arc::clone(store),
        task_id: task_id.clone(),
    });

    // The pipeline runs in its own task so a panic is contained to the job.
    let handle = tokio::spawn(pipeline::run_build(job, Arc::clone(config), sink));
    let duration_secs = || started.elapsed().as_secs() as i32;

    let result = match handle.await {
        Ok(Ok(apk_path)) => {
            tracing::info!(
                task = %task_id,
                duration = duration_secs(),
                success = true,
                "Build finished",
            );
            BuildResult::success(apk_path, duration_secs())
        }
        Ok(Err(e)) => {
            tracing::warn!(
                task = %task_id,
                duration = duration_secs(),
                success = false,
                error = %e,
                "Build failed",
            );
            BuildResult::failure(e.to_string(), duration_secs())
        }
        Err(join_error) => {
            tracing::error!(
                task = %task_id,
                error = %join_error,
                "Build task crashed",
            );
            BuildResult::failure(
                "Internal build error; please resubmit".to_string(),
                duration_secs(),
            )
        }
    };

    if let Err(e) = store.complete(&task_id, &result).await {
        tracing::error!(task = %task_id, error = %e, "Failed to record build result");
    }
}
