//! In-memory job store.
//!
//! Backs the test suites and mock deployments. Same state machine and
//! clamping semantics as the Postgres store, with a process-wide mutex
//! standing in for row locks.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use demo2apk_core::types::Timestamp;
use demo2apk_core::{CoreError, CoreResult};

use crate::job::{
    BuildResult, Job, JobState, NewTask, COMPLETED_RETENTION_HOURS, FAILED_RETENTION_DAYS,
    MAX_QUEUE_ENTRIES, WAITING_SCAN_LIMIT,
};
use crate::store::{JobStore, QueueTotals, RateDecision};

#[derive(Debug, Clone)]
struct RateBucket {
    window_start: Timestamp,
    count: u32,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, Job>,
    rates: HashMap<String, RateBucket>,
}

#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn waiting_fifo(inner: &Inner) -> Vec<String> {
        let mut waiting: Vec<&Job> = inner
            .jobs
            .values()
            .filter(|j| j.state() == JobState::Waiting)
            .collect();
        waiting.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        waiting.into_iter().map(|j| j.task_id.clone()).collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(&self, task: &NewTask) -> CoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.jobs.contains_key(&task.task_id) {
            return Ok(false);
        }
        inner
            .jobs
            .insert(task.task_id.clone(), Job::from_task(task, Utc::now()));
        Ok(true)
    }

    async fn claim_next(&self) -> CoreResult<Option<Job>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(task_id) = Self::waiting_fifo(&inner).into_iter().next() else {
            return Ok(None);
        };
        let job = inner.jobs.get_mut(&task_id).expect("job exists");
        job.state_id = JobState::Active.id();
        job.started_at = Some(Utc::now());
        Ok(Some(job.clone()))
    }

    async fn update_progress(&self, task_id: &str, percent: i16, message: &str) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(task_id) {
            if job.state() == JobState::Active {
                job.progress_percent = job.progress_percent.max(percent.clamp(0, 100));
                job.progress_message = Some(message.to_string());
            }
        }
        Ok(())
    }

    async fn complete(&self, task_id: &str, result: &BuildResult) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(task_id) {
            job.state_id = JobState::Completed.id();
            job.success = Some(result.success);
            job.apk_path = result.apk_path.clone();
            job.error_message = result.error.clone();
            job.duration_secs = Some(result.duration_secs);
            job.completed_at = Some(Utc::now());
            if result.success {
                job.progress_percent = 100;
            }
        }
        Ok(())
    }

    async fn fail(&self, task_id: &str, error: &str) -> CoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(task_id) {
            job.state_id = JobState::Failed.id();
            job.success = Some(false);
            job.error_message = Some(error.to_string());
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get(&self, task_id: &str) -> CoreResult<Option<Job>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.jobs.get(task_id).cloned())
    }

    async fn remove(&self, task_id: &str) -> CoreResult<Option<Job>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.jobs.get(task_id) {
            None => Ok(None),
            Some(job) if job.state() == JobState::Active => Err(CoreError::Conflict(
                "Cannot delete a build that is currently running".to_string(),
            )),
            Some(_) => Ok(inner.jobs.remove(task_id)),
        }
    }

    async fn waiting_position(&self, task_id: &str) -> CoreResult<Option<usize>> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::waiting_fifo(&inner)
            .iter()
            .take(WAITING_SCAN_LIMIT)
            .position(|id| id == task_id)
            .map(|i| i + 1))
    }

    async fn queue_totals(&self) -> CoreResult<QueueTotals> {
        let inner = self.inner.lock().unwrap();
        let waiting = inner
            .jobs
            .values()
            .filter(|j| j.state() == JobState::Waiting)
            .count() as i64;
        let active = inner
            .jobs
            .values()
            .filter(|j| j.state() == JobState::Active)
            .count() as i64;
        Ok(QueueTotals { waiting, active })
    }

    async fn prune_with_now(&self, now: Timestamp) -> CoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let completed_cutoff = now - chrono::Duration::hours(COMPLETED_RETENTION_HOURS);
        let failed_cutoff = now - chrono::Duration::days(FAILED_RETENTION_DAYS);
        let before = inner.jobs.len();

        inner.jobs.retain(|_, job| {
            let Some(completed_at) = job.completed_at else {
                return true;
            };
            match job.effective_state() {
                JobState::Completed => completed_at >= completed_cutoff,
                JobState::Failed => completed_at >= failed_cutoff,
                _ => true,
            }
        });

        // Cap terminal rows at MAX_QUEUE_ENTRIES, evicting oldest first.
        let mut terminal: Vec<(String, Timestamp)> = inner
            .jobs
            .values()
            .filter(|j| j.is_terminal())
            .map(|j| (j.task_id.clone(), j.completed_at.unwrap_or(j.created_at)))
            .collect();
        if terminal.len() as i64 > MAX_QUEUE_ENTRIES {
            terminal.sort_by(|a, b| b.1.cmp(&a.1));
            for (task_id, _) in terminal.split_off(MAX_QUEUE_ENTRIES as usize) {
                inner.jobs.remove(&task_id);
            }
        }

        Ok((before - inner.jobs.len()) as u64)
    }

    async fn check_rate(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> CoreResult<RateDecision> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let window_chrono = chrono::Duration::from_std(window)
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        let bucket = inner
            .rates
            .entry(key.to_string())
            .or_insert_with(|| RateBucket {
                window_start: now,
                count: 0,
            });

        if bucket.window_start < now - window_chrono {
            bucket.window_start = now;
            bucket.count = 0;
        }
        bucket.count += 1;

        if bucket.count > limit {
            let reset = bucket.window_start + window_chrono;
            Ok(RateDecision::Limited {
                retry_after_secs: (reset - now).num_seconds().max(1) as u64,
            })
        } else {
            Ok(RateDecision::Allowed {
                remaining: limit - bucket.count,
            })
        }
    }
}
