//! Build pipeline envelope shared by both build kinds.
//!
//! Environment check → workspace preparation → external tool orchestration
//! → artifact collection. Stage failures abort the pipeline; the caller
//! records the error on the job.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use demo2apk_core::android;
use demo2apk_core::config::AppConfig;
use demo2apk_core::naming::{artifact_file_name, sanitize_dir_name};
use demo2apk_core::progress::ProgressSink;
use demo2apk_core::subprocess;
use demo2apk_core::types::BuildKind;
use demo2apk_core::{CoreError, CoreResult};
use demo2apk_queue::Job;

use crate::mock;

pub mod gradle;
pub mod html;
pub mod offlineify;
pub mod zip;

/// Everything a pipeline stage needs: the job payload, service config, and
/// the progress sink owned by the worker.
pub struct BuildContext {
    pub job: Job,
    pub config: Arc<AppConfig>,
    pub sink: Arc<dyn ProgressSink>,
}

impl BuildContext {
    pub async fn report(&self, percent: i16, message: &str) {
        tracing::debug!(task = %self.job.task_id, percent, message, "Progress");
        self.sink.report(percent, message).await;
    }
}

/// Resolved toolchain environment injected into every external command.
#[derive(Debug, Clone)]
pub struct ToolchainEnv {
    pub sdk_root: PathBuf,
    pub env: Vec<(String, String)>,
}

/// Run the pipeline for a claimed job, returning the artifact path.
pub async fn run_build(
    job: Job,
    config: Arc<AppConfig>,
    sink: Arc<dyn ProgressSink>,
) -> CoreResult<String> {
    if config.mock_build {
        return mock::run(&job, &config, sink.as_ref()).await;
    }

    let ctx = BuildContext { job, config, sink };
    match ctx.job.build_kind() {
        BuildKind::Html => html::run(&ctx).await,
        BuildKind::Zip => zip::run(&ctx).await,
    }
}

/// Resolve the Android SDK and verify the JS runtime, failing fast with a
/// clear message when the host is not a usable build environment.
pub(crate) async fn check_environment() -> CoreResult<ToolchainEnv> {
    let sdk_root = android::resolve_sdk_root()?;
    if !subprocess::is_available("node").await {
        return Err(CoreError::Environment(
            "Node.js runtime not found; install node and npm".to_string(),
        ));
    }
    let env = android::toolchain_env(&sdk_root);
    Ok(ToolchainEnv { sdk_root, env })
}

/// Create a clean per-build workspace under the builds root, removing any
/// prior directory left by an earlier build of the same app name.
pub(crate) async fn prepare_workspace(config: &AppConfig, app_name: &str) -> CoreResult<PathBuf> {
    let safe = sanitize_dir_name(app_name);
    let workspace = config.builds_dir.join(format!("{safe}-build"));
    if workspace.exists() {
        tokio::fs::remove_dir_all(&workspace).await?;
    }
    tokio::fs::create_dir_all(&workspace).await?;
    Ok(workspace)
}

/// Copy the built APK into the builds root under its suffixed name and
/// verify the copy is byte-complete.
pub(crate) async fn collect_artifact(ctx: &BuildContext, built_apk: &Path) -> CoreResult<String> {
    let source_meta = tokio::fs::metadata(built_apk).await.map_err(|_| {
        CoreError::Toolchain(format!(
            "Build reported success but no APK was found at {}",
            built_apk.display()
        ))
    })?;

    let file_name = artifact_file_name(&ctx.job.app_name, &ctx.job.task_id);
    let dest = ctx.config.builds_dir.join(&file_name);
    tokio::fs::copy(built_apk, &dest).await?;

    let copied = tokio::fs::metadata(&dest).await?;
    if copied.len() != source_meta.len() {
        return Err(CoreError::Internal(format!(
            "Artifact copy is incomplete ({} of {} bytes)",
            copied.len(),
            source_meta.len()
        )));
    }

    tracing::info!(
        task = %ctx.job.task_id,
        apkSize = copied.len(),
        apk = %dest.display(),
        "Artifact collected",
    );
    Ok(dest.to_string_lossy().into_owned())
}

/// Pick the icon source for a build: the uploaded icon when present,
/// otherwise a generated default written into the workspace.
pub(crate) async fn resolve_icon_source(
    ctx: &BuildContext,
    workspace: &Path,
) -> CoreResult<PathBuf> {
    if let Some(icon_path) = &ctx.job.icon_path {
        let path = PathBuf::from(icon_path);
        if path.is_file() {
            return Ok(path);
        }
        tracing::warn!(
            task = %ctx.job.task_id,
            icon = %icon_path,
            "Uploaded icon is missing; using the default",
        );
    }

    let dest = workspace.join("default-icon.png");
    let dest_for_task = dest.clone();
    tokio::task::spawn_blocking(move || demo2apk_core::icon::generate_default_icon(&dest_for_task))
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))??;
    Ok(dest)
}

/// Recursive directory copy (blocking; run via `spawn_blocking`).
pub(crate) fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
