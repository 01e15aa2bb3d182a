//! The queue backend contract shared by the API and the worker.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use demo2apk_core::types::Timestamp;
use demo2apk_core::CoreResult;

use crate::job::{BuildResult, Job, NewTask};

/// Waiting/active counts for the status surface.
#[derive(Debug, Clone, Copy)]
pub struct QueueTotals {
    pub waiting: i64,
    pub active: i64,
}

impl QueueTotals {
    pub fn total(self) -> i64 {
        self.waiting + self.active
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

/// Durable job store keyed by task id.
///
/// Concurrency floor: `enqueue` is idempotent per task id, `claim_next` is
/// an atomic waiting→active transition with at most one winner, progress
/// updates never transition state, and terminal transitions carry the
/// result payload. Builds are never retried automatically.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Admit a task. Returns `false` when a job with this id already
    /// exists (re-submission is a no-op).
    async fn enqueue(&self, task: &NewTask) -> CoreResult<bool>;

    /// Atomically claim the oldest waiting job, moving it to active.
    async fn claim_next(&self) -> CoreResult<Option<Job>>;

    /// Write progress into an active job. The stored percent never
    /// decreases, so pollers observe monotonic progress even when the
    /// worker reports a regression between sub-stages.
    async fn update_progress(&self, task_id: &str, percent: i16, message: &str) -> CoreResult<()>;

    /// Terminal transition: active → completed with the build result
    /// (logical failures included, carrying `success = false`).
    async fn complete(&self, task_id: &str, result: &BuildResult) -> CoreResult<()>;

    /// Terminal transition: active → failed (unhandled worker error).
    async fn fail(&self, task_id: &str, error: &str) -> CoreResult<()>;

    async fn get(&self, task_id: &str) -> CoreResult<Option<Job>>;

    /// Remove a job. Active jobs cannot be removed (`Conflict`); unknown
    /// ids yield `Ok(None)`. The removed row is returned so the caller can
    /// clean up its files.
    async fn remove(&self, task_id: &str) -> CoreResult<Option<Job>>;

    /// 1-based position of a waiting job, scanning at most the first
    /// [`crate::job::WAITING_SCAN_LIMIT`] waiting jobs.
    async fn waiting_position(&self, task_id: &str) -> CoreResult<Option<usize>>;

    async fn queue_totals(&self) -> CoreResult<QueueTotals>;

    /// Enforce queue retention relative to `now`: completed jobs kept 24 h,
    /// failed jobs 7 d, terminal rows capped at 1000. Returns rows removed.
    async fn prune_with_now(&self, now: Timestamp) -> CoreResult<u64>;

    /// Retention enforcement against the current clock.
    async fn prune(&self) -> CoreResult<u64> {
        self.prune_with_now(Utc::now()).await
    }

    /// Count a request against `key`'s fixed window of length `window`.
    async fn check_rate(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> CoreResult<RateDecision>;

    /// Release backend connections. Default is a no-op.
    async fn close(&self) {}
}
