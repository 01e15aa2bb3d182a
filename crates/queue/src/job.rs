//! Job entity model and state machine.

use demo2apk_core::types::{BuildKind, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// State column type (SMALLINT in the database).
pub type StateId = i16;

/// Queue states for a job. A job enters `Waiting` on admission, moves to
/// `Active` when exactly one worker claims it, and terminates as
/// `Completed` (including logical build failures, which carry
/// `success = false`) or `Failed` (unhandled worker error).
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Waiting = 1,
    Active = 2,
    Completed = 3,
    Failed = 4,
}

impl JobState {
    pub fn id(self) -> StateId {
        self as StateId
    }

    pub fn from_id(id: StateId) -> Option<Self> {
        match id {
            1 => Some(JobState::Waiting),
            2 => Some(JobState::Active),
            3 => Some(JobState::Completed),
            4 => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

/// Completed jobs are kept in the queue backend this long.
pub const COMPLETED_RETENTION_HOURS: i64 = 24;

/// Failed jobs are kept longer for postmortems.
pub const FAILED_RETENTION_DAYS: i64 = 7;

/// Terminal jobs beyond this count are evicted oldest-first.
pub const MAX_QUEUE_ENTRIES: i64 = 1000;

/// Bounded scan depth when computing a waiting job's queue position.
pub const WAITING_SCAN_LIMIT: usize = 100;

/// Admission payload: the immutable task written into the queue.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_id: String,
    pub kind: BuildKind,
    pub app_name: String,
    pub app_id: String,
    pub upload_path: String,
    pub icon_path: Option<String>,
}

/// Terminal result written by the worker.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub success: bool,
    pub apk_path: Option<String>,
    pub error: Option<String>,
    pub duration_secs: i32,
}

impl BuildResult {
    pub fn success(apk_path: String, duration_secs: i32) -> Self {
        Self {
            success: true,
            apk_path: Some(apk_path),
            error: None,
            duration_secs,
        }
    }

    pub fn failure(error: String, duration_secs: i32) -> Self {
        Self {
            success: false,
            apk_path: None,
            error: Some(error),
            duration_secs,
        }
    }
}

/// A job row: the task payload plus mutable progress and terminal result.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub task_id: String,
    pub kind: String,
    pub app_name: String,
    pub app_id: String,
    pub upload_path: String,
    pub icon_path: Option<String>,
    pub state_id: StateId,
    pub progress_percent: i16,
    pub progress_message: Option<String>,
    pub success: Option<bool>,
    pub apk_path: Option<String>,
    pub error_message: Option<String>,
    pub duration_secs: Option<i32>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Job {
    /// Build a fresh waiting job from an admission payload.
    pub fn from_task(task: &NewTask, now: Timestamp) -> Self {
        Self {
            task_id: task.task_id.clone(),
            kind: task.kind.as_str().to_string(),
            app_name: task.app_name.clone(),
            app_id: task.app_id.clone(),
            upload_path: task.upload_path.clone(),
            icon_path: task.icon_path.clone(),
            state_id: JobState::Waiting.id(),
            progress_percent: 0,
            progress_message: None,
            success: None,
            apk_path: None,
            error_message: None,
            duration_secs: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn state(&self) -> JobState {
        JobState::from_id(self.state_id).unwrap_or(JobState::Failed)
    }

    pub fn build_kind(&self) -> BuildKind {
        BuildKind::from_str(&self.kind).unwrap_or(BuildKind::Html)
    }

    /// State as seen by the status surface: a completed job whose result
    /// was a logical failure reads as failed.
    pub fn effective_state(&self) -> JobState {
        match self.state() {
            JobState::Completed if self.success == Some(false) => JobState::Failed,
            state => state,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state(), JobState::Completed | JobState::Failed)
    }
}
