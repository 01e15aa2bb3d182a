//! Cancel/cleanup: remove a job and reclaim its files.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use demo2apk_core::CoreError;

use crate::error::ApiResult;
use crate::state::AppState;

/// DELETE /api/build/{task_id}
///
/// Removes a waiting or terminal job along with its upload workspace and
/// artifact. Active jobs are rejected; there is no preemption of an
/// in-flight build.
pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let job = state
        .store
        .remove(&task_id)
        .await? // Conflict on active jobs maps to 400.
        .ok_or_else(|| CoreError::NotFound("Build task not found".to_string()))?;

    // Reclaim the upload workspace.
    let upload_dir = state.config.uploads_dir.join(&task_id);
    if let Err(e) = tokio::fs::remove_dir_all(&upload_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(task = %task_id, error = %e, "Failed to remove upload workspace");
        }
    }

    // Reclaim the artifact, if one was produced.
    if let Some(apk_path) = &job.apk_path {
        if let Err(e) = tokio::fs::remove_file(apk_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(task = %task_id, error = %e, "Failed to remove artifact");
            }
        }
    }

    tracing::info!(task = %task_id, app = %job.app_name, "Build task deleted");

    Ok(Json(json!({
        "taskId": task_id,
        "status": "deleted",
    })))
}
