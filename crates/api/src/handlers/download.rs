//! Artifact download streaming.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tokio_util::io::ReaderStream;

use demo2apk_core::naming::display_file_name;
use demo2apk_core::CoreError;
use demo2apk_queue::JobState;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Android package MIME type.
const APK_CONTENT_TYPE: &str = "application/vnd.android.package-archive";

/// RFC 5987 attr-char complement: everything outside unreserved characters
/// is percent-encoded in the `filename*` form.
const RFC5987_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// GET /api/build/{task_id}/download
pub async fn download_apk(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Response> {
    let job = state
        .store
        .get(&task_id)
        .await?
        .ok_or_else(|| CoreError::NotFound("Build task not found or expired".to_string()))?;

    match job.effective_state() {
        JobState::Completed => {}
        JobState::Failed => {
            return Err(ApiError::BadRequest(
                "Build failed; there is no artifact to download".to_string(),
            ));
        }
        JobState::Waiting | JobState::Active => {
            return Err(ApiError::BadRequest(
                "Build is not finished yet".to_string(),
            ));
        }
    }

    // The job row's apk_path is authoritative; nothing reconstructs paths.
    let apk_path = job.apk_path.as_deref().ok_or_else(|| {
        CoreError::NotFound("Artifact is no longer available".to_string())
    })?;

    let metadata = tokio::fs::metadata(apk_path).await.map_err(|_| {
        CoreError::NotFound("Artifact expired and was removed".to_string())
    })?;

    let file = tokio::fs::File::open(apk_path)
        .await
        .map_err(|_| CoreError::NotFound("Artifact expired and was removed".to_string()))?;

    let stored_name = std::path::Path::new(apk_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.apk", job.app_name));
    let download_name = display_file_name(&stored_name);

    let stream = ReaderStream::new(file);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, APK_CONTENT_TYPE)
        .header(header::CONTENT_LENGTH, metadata.len().to_string())
        .header(header::CONTENT_DISPOSITION, content_disposition(&download_name))
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// RFC 5987 dual-form attachment disposition.
///
/// The plain `filename` carries an ASCII fallback (non-ASCII codepoints
/// become `_`); `filename*` carries the full UTF-8 name percent-encoded.
fn content_disposition(name: &str) -> String {
    let ascii: String = name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let encoded = utf8_percent_encode(name, RFC5987_ENCODE);
    format!("attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
}
