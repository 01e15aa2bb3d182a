//! Zip pipeline: build a front-end project and package it via the native
//! wrapper.

use std::path::{Path, PathBuf};
use std::time::Duration;

use demo2apk_core::icon::{render_launcher_icon, WRAPPER_DENSITIES};
use demo2apk_core::progress::with_heartbeat;
use demo2apk_core::project::{
    detect_package_manager, detect_project_type, find_project_root, PackageManager, ProjectType,
};
use demo2apk_core::repair::repair_vite_project;
use demo2apk_core::subprocess::{self, is_available, CommandSpec};
use demo2apk_core::{CoreError, CoreResult};

use super::{
    check_environment, collect_artifact, gradle, prepare_workspace, resolve_icon_source,
    BuildContext,
};

/// Timeout for dependency installation.
const INSTALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Wrapper packages installed into the project.
const WRAPPER_PACKAGES: &[&str] = &[
    "@capacitor/core",
    "@capacitor/cli",
    "@capacitor/android",
];

pub async fn run(ctx: &BuildContext) -> CoreResult<String> {
    ctx.report(5, "Checking build environment").await;
    let tools = check_environment().await?;

    ctx.report(10, "Extracting archive").await;
    let workspace = prepare_workspace(&ctx.config, &ctx.job.app_name).await?;
    let extract_dir = workspace.join("source");
    extract_archive(Path::new(&ctx.job.upload_path), &extract_dir).await?;

    ctx.report(15, "Locating project root").await;
    let root = find_project_root(&extract_dir)?;

    ctx.report(18, "Detecting project type").await;
    let project_type = detect_project_type(&root);
    let pm = detect_package_manager(&root, is_available("pnpm").await, is_available("yarn").await);
    tracing::info!(
        task = %ctx.job.task_id,
        project_type = project_type.as_str(),
        package_manager = pm.command(),
        "Project classified",
    );

    if project_type == ProjectType::Next {
        ctx.report(20, "Writing static export configuration").await;
        write_next_static_export(&root).await?;
    }

    if project_type == ProjectType::Vite {
        ctx.report(22, "Repairing project configuration").await;
        let report = repair_vite_project(&root)?;
        for change in &report.changes {
            tracing::info!(task = %ctx.job.task_id, change = %change, "Project repair");
        }
        if !report.is_empty() {
            ctx.report(24, &format!("Applied {} project fixes", report.changes.len()))
                .await;
        }
    }

    ctx.report(25, "Installing dependencies").await;
    let install = CommandSpec::new(pm.command())
        .args(pm.install_args().iter().copied())
        .current_dir(&root)
        .envs(tools.env.clone())
        .timeout(INSTALL_TIMEOUT);
    with_heartbeat(
        ctx.sink.as_ref(),
        25,
        38,
        "Installing dependencies",
        subprocess::run_checked(&install),
    )
    .await?;

    ctx.report(40, "Running project build").await;
    let build = CommandSpec::new(pm.command())
        .args(pm.build_args().iter().copied())
        .current_dir(&root)
        .envs(tools.env.clone());
    with_heartbeat(
        ctx.sink.as_ref(),
        40,
        53,
        "Running project build",
        subprocess::run_checked(&build),
    )
    .await?;

    ctx.report(55, "Verifying build output").await;
    let web_dir = root.join(project_type.output_dir());
    if !web_dir.is_dir() {
        return Err(CoreError::Toolchain(format!(
            "Build completed but produced no '{}' directory",
            project_type.output_dir()
        )));
    }

    ctx.report(60, "Installing native wrapper").await;
    let add_wrapper = CommandSpec::new(pm.command())
        .args(add_dev_args(pm).iter().copied())
        .args(WRAPPER_PACKAGES.iter().copied())
        .current_dir(&root)
        .envs(tools.env.clone())
        .timeout(INSTALL_TIMEOUT);
    subprocess::run_checked(&add_wrapper).await?;
    write_wrapper_config(ctx, &root, project_type.output_dir()).await?;

    ctx.report(65, "Adding Android platform").await;
    let add_android = CommandSpec::new("npx")
        .args(["cap", "add", "android"])
        .current_dir(&root)
        .envs(tools.env.clone());
    subprocess::run_checked(&add_android).await?;

    ctx.report(70, "Syncing resources").await;
    let sync = CommandSpec::new("npx")
        .args(["cap", "sync", "android"])
        .current_dir(&root)
        .envs(tools.env.clone());
    subprocess::run_checked(&sync).await?;

    ctx.report(75, "Injecting launcher icons").await;
    let android_dir = root.join("android");
    inject_wrapper_icons(ctx, &workspace, &android_dir).await?;

    ctx.report(80, "Running Gradle build").await;
    gradle::ensure_wrapper(&android_dir, &tools).await?;
    gradle::assemble_debug(ctx, &android_dir, &tools, (80, 93)).await?;

    ctx.report(95, "Collecting artifact").await;
    let built = android_dir.join("app/build/outputs/apk/debug/app-debug.apk");
    let dest = collect_artifact(ctx, &built).await?;

    ctx.report(100, "Done").await;
    Ok(dest)
}

/// Unpack the uploaded archive (blocking zip crate work off the runtime).
async fn extract_archive(archive_path: &Path, dest: &Path) -> CoreResult<()> {
    tokio::fs::create_dir_all(dest).await?;
    let archive_path = archive_path.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || -> CoreResult<()> {
        let file = std::fs::File::open(&archive_path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| CoreError::Validation(format!("Upload is not a valid zip: {e}")))?;
        archive
            .extract(&dest)
            .map_err(|e| CoreError::Validation(format!("Archive extraction failed: {e}")))
    })
    .await
    .map_err(|e| CoreError::Internal(e.to_string()))?
}

/// Dev-dependency install arguments per package manager.
fn add_dev_args(pm: PackageManager) -> &'static [&'static str] {
    match pm {
        PackageManager::Npm => &["install", "-D"],
        PackageManager::Pnpm => &["add", "-D"],
        PackageManager::Yarn => &["add", "-D"],
    }
}

/// Replace the Next config with a static-export configuration so the
/// bundle lands in `out/` as plain files the webview can serve.
async fn write_next_static_export(root: &Path) -> CoreResult<()> {
    const CONFIG: &str = "const nextConfig = {\n  output: 'export',\n  images: { unoptimized: true },\n};\n\nmodule.exports = nextConfig;\n";

    let existing = ["next.config.js", "next.config.ts", "next.config.mjs"]
        .iter()
        .map(|name| root.join(name))
        .find(|p| p.is_file());
    for stale in existing.iter() {
        tokio::fs::remove_file(stale).await?;
    }
    tokio::fs::write(root.join("next.config.js"), CONFIG).await?;
    Ok(())
}

/// Write the wrapper's project configuration.
async fn write_wrapper_config(ctx: &BuildContext, root: &Path, web_dir: &str) -> CoreResult<()> {
    let config = serde_json::json!({
        "appId": ctx.job.app_id,
        "appName": ctx.job.app_name,
        "webDir": web_dir,
    });
    let pretty = serde_json::to_string_pretty(&config)
        .map_err(|e| CoreError::Internal(e.to_string()))?;
    tokio::fs::write(root.join("capacitor.config.json"), pretty + "\n").await?;
    Ok(())
}

/// Overwrite both launcher PNGs in every mipmap density and drop the
/// adaptive-icon override, which crops roughly 18% from the edges.
async fn inject_wrapper_icons(
    ctx: &BuildContext,
    workspace: &Path,
    android_dir: &Path,
) -> CoreResult<()> {
    let source = resolve_icon_source(ctx, workspace).await?;
    let res_dir = android_dir.join("app/src/main/res");

    for density in WRAPPER_DENSITIES {
        let mipmap = res_dir.join(format!("mipmap-{}", density.qualifier));
        tokio::fs::create_dir_all(&mipmap).await?;

        let launcher = mipmap.join("ic_launcher.png");
        let src = source.clone();
        let dest = launcher.clone();
        tokio::task::spawn_blocking(move || render_launcher_icon(&src, &dest, density.size_px))
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))??;
        tokio::fs::copy(&launcher, mipmap.join("ic_launcher_round.png")).await?;
    }

    let adaptive = res_dir.join("mipmap-anydpi-v26");
    if adaptive.exists() {
        tokio::fs::remove_dir_all(&adaptive).await?;
    }
    Ok(())
}
