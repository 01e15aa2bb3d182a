//! Build status polling.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use demo2apk_core::naming::display_file_name;
use demo2apk_core::types::Timestamp;
use demo2apk_core::CoreError;
use demo2apk_queue::{Job, JobState};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProgressBody {
    pub message: String,
    pub percent: i16,
}

#[derive(Debug, Serialize)]
pub struct ResultBody {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub task_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apk_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    pub retention_hours: u64,
}

/// GET /api/build/{task_id}/status
pub async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let job = state
        .store
        .get(&task_id)
        .await?
        .ok_or_else(|| CoreError::NotFound("Build task not found or expired".to_string()))?;

    let mut response = StatusResponse {
        task_id: job.task_id.clone(),
        status: status_str(&job),
        file_name: None,
        progress: None,
        queue_position: None,
        queue_total: None,
        result: None,
        download_url: None,
        apk_size: None,
        error: None,
        expires_at: None,
        retention_hours: state.config.file_retention_hours,
    };

    match job.effective_state() {
        JobState::Waiting => {
            response.queue_position = state.store.waiting_position(&job.task_id).await?;
            response.queue_total = Some(state.store.queue_totals().await?.total());
        }
        JobState::Active => {
            response.progress = Some(ProgressBody {
                message: job
                    .progress_message
                    .clone()
                    .unwrap_or_else(|| "Build started".to_string()),
                percent: job.progress_percent,
            });
        }
        JobState::Completed => {
            response.result = Some(ResultBody {
                success: true,
                duration: job.duration_secs,
            });
            response.download_url = Some(format!("/api/build/{}/download", job.task_id));

            if let Some(apk_path) = &job.apk_path {
                response.file_name = Some(display_file_name(&artifact_name(apk_path)));
                if let Ok(metadata) = tokio::fs::metadata(apk_path).await {
                    response.apk_size = Some(metadata.len());
                    response.expires_at = expires_at(&metadata, &job, state.config.file_retention_hours);
                }
            }
        }
        JobState::Failed => {
            response.error = Some(
                job.error_message
                    .clone()
                    .unwrap_or_else(|| "Build failed".to_string()),
            );
            response.result = Some(ResultBody {
                success: false,
                duration: job.duration_secs,
            });
        }
    }

    Ok(Json(response))
}

/// Queue state mapped to the client-facing status vocabulary.
fn status_str(job: &Job) -> &'static str {
    match job.effective_state() {
        JobState::Waiting => "pending",
        JobState::Active => "active",
        JobState::Completed => "completed",
        JobState::Failed => "failed",
    }
}

fn artifact_name(apk_path: &str) -> String {
    std::path::Path::new(apk_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| apk_path.to_string())
}

/// Artifact expiry: file mtime plus the retention window, falling back to
/// the job completion time when the filesystem refuses an mtime.
fn expires_at(metadata: &std::fs::Metadata, job: &Job, retention_hours: u64) -> Option<Timestamp> {
    let retention = chrono::Duration::hours(retention_hours as i64);
    match metadata.modified() {
        Ok(mtime) => Some(Timestamp::from(mtime) + retention),
        Err(_) => job.completed_at.map(|t| t + retention),
    }
}
