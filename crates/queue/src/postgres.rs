//! Postgres-backed job store.
//!
//! Claims use `FOR UPDATE SKIP LOCKED` so concurrent workers never
//! double-dispatch a job; admission is idempotent via `ON CONFLICT DO
//! NOTHING`; progress writes clamp with `GREATEST` so the stored percent
//! never regresses.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use demo2apk_core::types::Timestamp;
use demo2apk_core::{CoreError, CoreResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::job::{
    BuildResult, Job, JobState, NewTask, COMPLETED_RETENTION_HOURS, FAILED_RETENTION_DAYS,
    MAX_QUEUE_ENTRIES, WAITING_SCAN_LIMIT,
};
use crate::store::{JobStore, QueueTotals, RateDecision};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    task_id, kind, app_name, app_id, upload_path, icon_path, \
    state_id, progress_percent, progress_message, \
    success, apk_path, error_message, duration_secs, \
    created_at, started_at, completed_at";

/// Connection pool size. The API and worker each hold their own pool.
const MAX_CONNECTIONS: u32 = 10;

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    /// Connect to the queue backend and apply migrations.
    pub async fn connect(database_url: &str) -> CoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(|e| CoreError::Internal(format!("queue backend connection failed: {e}")))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| CoreError::Internal(format!("queue backend migration failed: {e}")))?;

        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> CoreResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Internal(format!("queue backend error: {e}"))
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn enqueue(&self, task: &NewTask) -> CoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO jobs (task_id, kind, app_name, app_id, upload_path, icon_path) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (task_id) DO NOTHING",
        )
        .bind(&task.task_id)
        .bind(task.kind.as_str())
        .bind(&task.app_name)
        .bind(&task.app_id)
        .bind(&task.upload_path)
        .bind(&task.icon_path)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn claim_next(&self) -> CoreResult<Option<Job>> {
        let query = format!(
            "UPDATE jobs \
             SET state_id = $1, started_at = NOW() \
             WHERE task_id = ( \
                 SELECT task_id FROM jobs \
                 WHERE state_id = $2 \
                 ORDER BY created_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobState::Active.id())
            .bind(JobState::Waiting.id())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn update_progress(&self, task_id: &str, percent: i16, message: &str) -> CoreResult<()> {
        sqlx::query(
            "UPDATE jobs \
             SET progress_percent = GREATEST(progress_percent, $2), progress_message = $3 \
             WHERE task_id = $1 AND state_id = $4",
        )
        .bind(task_id)
        .bind(percent.clamp(0, 100))
        .bind(message)
        .bind(JobState::Active.id())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn complete(&self, task_id: &str, result: &BuildResult) -> CoreResult<()> {
        sqlx::query(
            "UPDATE jobs \
             SET state_id = $2, success = $3, apk_path = $4, error_message = $5, \
                 duration_secs = $6, completed_at = NOW(), \
                 progress_percent = CASE WHEN $3 THEN 100 ELSE progress_percent END \
             WHERE task_id = $1",
        )
        .bind(task_id)
        .bind(JobState::Completed.id())
        .bind(result.success)
        .bind(&result.apk_path)
        .bind(&result.error)
        .bind(result.duration_secs)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn fail(&self, task_id: &str, error: &str) -> CoreResult<()> {
        sqlx::query(
            "UPDATE jobs \
             SET state_id = $2, success = FALSE, error_message = $3, completed_at = NOW() \
             WHERE task_id = $1",
        )
        .bind(task_id)
        .bind(JobState::Failed.id())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, task_id: &str) -> CoreResult<Option<Job>> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE task_id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn remove(&self, task_id: &str) -> CoreResult<Option<Job>> {
        let query = format!(
            "DELETE FROM jobs WHERE task_id = $1 AND state_id <> $2 RETURNING {COLUMNS}"
        );
        let deleted = sqlx::query_as::<_, Job>(&query)
            .bind(task_id)
            .bind(JobState::Active.id())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        if deleted.is_some() {
            return Ok(deleted);
        }

        // Nothing deleted: either the job is active or it does not exist.
        let state: Option<i16> =
            sqlx::query_scalar("SELECT state_id FROM jobs WHERE task_id = $1")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        match state {
            Some(id) if id == JobState::Active.id() => Err(CoreError::Conflict(
                "Cannot delete a build that is currently running".to_string(),
            )),
            _ => Ok(None),
        }
    }

    async fn waiting_position(&self, task_id: &str) -> CoreResult<Option<usize>> {
        let waiting: Vec<String> = sqlx::query_scalar(
            "SELECT task_id FROM jobs WHERE state_id = $1 \
             ORDER BY created_at ASC LIMIT $2",
        )
        .bind(JobState::Waiting.id())
        .bind(WAITING_SCAN_LIMIT as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(waiting.iter().position(|id| id == task_id).map(|i| i + 1))
    }

    async fn queue_totals(&self) -> CoreResult<QueueTotals> {
        let (waiting, active): (i64, i64) = sqlx::query_as(
            "SELECT \
                 COUNT(*) FILTER (WHERE state_id = $1), \
                 COUNT(*) FILTER (WHERE state_id = $2) \
             FROM jobs",
        )
        .bind(JobState::Waiting.id())
        .bind(JobState::Active.id())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(QueueTotals { waiting, active })
    }

    async fn prune_with_now(&self, now: Timestamp) -> CoreResult<u64> {
        let completed_cutoff = now - chrono::Duration::hours(COMPLETED_RETENTION_HOURS);
        let failed_cutoff = now - chrono::Duration::days(FAILED_RETENTION_DAYS);

        let expired = sqlx::query(
            "DELETE FROM jobs WHERE \
                 (state_id = $1 AND success = TRUE AND completed_at < $3) \
              OR ((state_id = $2 OR (state_id = $1 AND success = FALSE)) AND completed_at < $4)",
        )
        .bind(JobState::Completed.id())
        .bind(JobState::Failed.id())
        .bind(completed_cutoff)
        .bind(failed_cutoff)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        let evicted = sqlx::query(
            "DELETE FROM jobs WHERE task_id IN ( \
                 SELECT task_id FROM jobs \
                 WHERE state_id IN ($1, $2) \
                 ORDER BY completed_at DESC \
                 OFFSET $3 \
             )",
        )
        .bind(JobState::Completed.id())
        .bind(JobState::Failed.id())
        .bind(MAX_QUEUE_ENTRIES)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        Ok(expired + evicted)
    }

    async fn check_rate(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> CoreResult<RateDecision> {
        let now = Utc::now();
        let window_floor = now
            - chrono::Duration::from_std(window)
                .map_err(|e| CoreError::Internal(e.to_string()))?;

        let (count, window_start): (i32, Timestamp) = sqlx::query_as(
            "INSERT INTO rate_limits (client_key, window_start, count) \
             VALUES ($1, $2, 1) \
             ON CONFLICT (client_key) DO UPDATE SET \
                 count = CASE WHEN rate_limits.window_start < $3 \
                              THEN 1 ELSE rate_limits.count + 1 END, \
                 window_start = CASE WHEN rate_limits.window_start < $3 \
                                     THEN $2 ELSE rate_limits.window_start END \
             RETURNING count, window_start",
        )
        .bind(key)
        .bind(now)
        .bind(window_floor)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        if count as u32 > limit {
            let reset = window_start + chrono::Duration::from_std(window).unwrap_or_default();
            let retry_after_secs = (reset - now).num_seconds().max(1) as u64;
            Ok(RateDecision::Limited { retry_after_secs })
        } else {
            Ok(RateDecision::Allowed {
                remaining: limit.saturating_sub(count as u32),
            })
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
