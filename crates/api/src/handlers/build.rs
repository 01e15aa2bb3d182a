//! Build submission: multipart upload, validation, admission.

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;

use demo2apk_core::config::MAX_ICON_SIZE;
use demo2apk_core::ids::new_task_id;
use demo2apk_core::naming::derive_app_id;
use demo2apk_core::types::BuildKind;
use demo2apk_core::CoreError;
use demo2apk_queue::NewTask;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Accepted upload extensions per build kind.
const HTML_EXTENSIONS: &[&str] = &["html", "htm"];
const ZIP_EXTENSIONS: &[&str] = &["zip"];
const ICON_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Admission response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildAccepted {
    pub task_id: String,
    pub status: &'static str,
    pub status_url: String,
    pub download_url: String,
}

/// POST /api/build/html
pub async fn submit_html(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<BuildAccepted>> {
    submit(state, BuildKind::Html, multipart).await
}

/// POST /api/build/zip
pub async fn submit_zip(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<BuildAccepted>> {
    submit(state, BuildKind::Zip, multipart).await
}

/// Typed view of the multipart form, collected before any validation so a
/// malformed field anywhere fails the whole request.
#[derive(Default)]
struct UploadForm {
    file: Option<(String, Bytes)>,
    app_name: Option<String>,
    app_id: Option<String>,
    icon: Option<(String, Bytes)>,
}

async fn parse_form(mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = basename(field.file_name().unwrap_or("upload"));
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
                form.file = Some((file_name, data));
            }
            "appName" => {
                form.app_name = Some(read_text(field).await?);
            }
            "appId" => {
                form.app_id = Some(read_text(field).await?);
            }
            "icon" => {
                let file_name = basename(field.file_name().unwrap_or("icon.png"));
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read icon: {e}")))?;
                form.icon = Some((file_name, data));
            }
            // Unknown fields are drained and ignored.
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    Ok(form)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed form field: {e}")))
}

async fn submit(
    state: AppState,
    kind: BuildKind,
    multipart: Multipart,
) -> ApiResult<Json<BuildAccepted>> {
    let form = parse_form(multipart).await?;

    let (file_name, file_data) = form.file.ok_or_else(|| {
        ApiError::Core(CoreError::Validation("Missing 'file' form field".to_string()))
    })?;

    let allowed = match kind {
        BuildKind::Html => HTML_EXTENSIONS,
        BuildKind::Zip => ZIP_EXTENSIONS,
    };
    if !has_extension(&file_name, allowed) {
        return Err(CoreError::Validation(format!(
            "Upload must be a {} file, got '{file_name}'",
            allowed.join("/")
        ))
        .into());
    }
    if file_data.is_empty() {
        return Err(CoreError::Validation("Uploaded file is empty".to_string()).into());
    }

    if let Some((icon_name, icon_data)) = &form.icon {
        if !has_extension(icon_name, ICON_EXTENSIONS) {
            return Err(CoreError::Validation(format!(
                "Icon must be a png/jpg/jpeg file, got '{icon_name}'"
            ))
            .into());
        }
        if icon_data.len() as u64 > MAX_ICON_SIZE {
            return Err(CoreError::Validation(
                "Icon exceeds the 2 MB limit".to_string(),
            )
            .into());
        }
    }

    let app_name = form
        .app_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            file_stem(&file_name)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| kind.default_app_name().to_string());

    let app_id = form
        .app_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| derive_app_id(&app_name));

    let task_id = new_task_id();

    // Persist the upload workspace: <uploads>/<taskId>/<originalName>.
    let task_dir = state.config.uploads_dir.join(&task_id);
    tokio::fs::create_dir_all(&task_dir)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to create upload dir: {e}")))?;

    let upload_path = task_dir.join(&file_name);
    tokio::fs::write(&upload_path, &file_data)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to store upload: {e}")))?;

    let icon_path = match &form.icon {
        Some((icon_name, icon_data)) => {
            let path = task_dir.join(format!("icon-{icon_name}"));
            tokio::fs::write(&path, icon_data)
                .await
                .map_err(|e| ApiError::Internal(format!("Failed to store icon: {e}")))?;
            Some(path.to_string_lossy().into_owned())
        }
        None => None,
    };

    let task = NewTask {
        task_id: task_id.clone(),
        kind,
        app_name: app_name.clone(),
        app_id,
        upload_path: upload_path.to_string_lossy().into_owned(),
        icon_path,
    };
    state.store.enqueue(&task).await?;

    tracing::info!(
        task = %task_id,
        app = %app_name,
        kind = kind.as_str(),
        size = file_data.len(),
        "Build request admitted",
    );

    Ok(Json(BuildAccepted {
        status: "pending",
        status_url: format!("/api/build/{task_id}/status"),
        download_url: format!("/api/build/{task_id}/download"),
        task_id,
    }))
}

/// Strip any client-supplied path components from an upload name.
fn basename(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("upload")
        .to_string()
}

fn has_extension(name: &str, allowed: &[&str]) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| allowed.contains(&e.as_str()))
}

fn file_stem(name: &str) -> Option<&str> {
    std::path::Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_strips_client_paths() {
        assert_eq!(basename("../../etc/passwd.html"), "passwd.html");
        assert_eq!(basename("C:\\Users\\me\\app.html"), "app.html");
        assert_eq!(basename("plain.zip"), "plain.zip");
    }

    #[test]
    fn extension_checks_are_case_insensitive() {
        assert!(has_extension("Index.HTML", HTML_EXTENSIONS));
        assert!(has_extension("site.htm", HTML_EXTENSIONS));
        assert!(!has_extension("site.zip", HTML_EXTENSIONS));
        assert!(has_extension("project.ZIP", ZIP_EXTENSIONS));
        assert!(!has_extension("no_extension", ZIP_EXTENSIONS));
    }
}
