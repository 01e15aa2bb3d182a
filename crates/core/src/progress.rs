//! Progress reporting between the pipeline and the job record.
//!
//! The pipeline only ever talks to a [`ProgressSink`]; the worker implements
//! it by writing into the queue backend, which clamps the stored percent so
//! pollers never observe a regression.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

/// Receives progress updates from a running build.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, percent: i16, message: &str);
}

/// Sink that discards everything. Used where progress is irrelevant.
pub struct NullSink;

#[async_trait]
impl ProgressSink for NullSink {
    async fn report(&self, _percent: i16, _message: &str) {}
}

/// Sink that records every update; test helper for pipelines and the
/// heartbeat decorator.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<(i16, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<(i16, String)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn report(&self, percent: i16, message: &str) {
        self.updates.lock().unwrap().push((percent, message.to_string()));
    }
}

/// Seconds between synthetic heartbeat ticks while a long subcommand runs.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Maximum synthetic ticks per wrapped subcommand.
pub const HEARTBEAT_MAX_TICKS: u32 = 10;

/// Run `fut` while emitting synthetic progress inside `[start, end)`.
///
/// Long external subcommands (install, bundle, Gradle) produce no progress
/// of their own; the heartbeat keeps the status surface fresh with one tick
/// per [`HEARTBEAT_INTERVAL`], capped at [`HEARTBEAT_MAX_TICKS`], never
/// reaching `end`. Real reports written by the pipeline always land on the
/// same sink and win because the store clamps upward.
pub async fn with_heartbeat<F, T>(
    sink: &dyn ProgressSink,
    start: i16,
    end: i16,
    message: &str,
    fut: F,
) -> T
where
    F: Future<Output = T>,
{
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    // Consume the immediate first tick so the first synthetic report comes
    // a full interval after the subcommand starts.
    ticker.tick().await;

    tokio::pin!(fut);
    let span = i32::from((end - start).max(1));
    let mut ticks: u32 = 0;

    loop {
        tokio::select! {
            output = &mut fut => return output,
            _ = ticker.tick(), if ticks < HEARTBEAT_MAX_TICKS => {
                ticks += 1;
                let percent =
                    i32::from(start) + span * ticks as i32 / (HEARTBEAT_MAX_TICKS as i32 + 1);
                sink.report(percent as i16, message).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn heartbeat_ticks_stay_inside_the_band_and_cap() {
        let sink = RecordingSink::new();
        let result = with_heartbeat(&sink, 25, 38, "Installing dependencies", async {
            tokio::time::sleep(Duration::from_secs(120)).await;
            "done"
        })
        .await;
        assert_eq!(result, "done");

        let updates = sink.updates();
        assert_eq!(updates.len(), HEARTBEAT_MAX_TICKS as usize);
        for (percent, message) in &updates {
            assert!(*percent >= 25 && *percent < 38, "percent {percent} out of band");
            assert_eq!(message, "Installing dependencies");
        }
        // Ticks never regress.
        for pair in updates.windows(2) {
            assert!(pair[1].0 >= pair[0].0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fast_subcommands_emit_no_heartbeat() {
        let sink = RecordingSink::new();
        with_heartbeat(&sink, 40, 53, "Building", async {
            tokio::time::sleep(Duration::from_secs(2)).await;
        })
        .await;
        assert!(sink.updates().is_empty());
    }
}
