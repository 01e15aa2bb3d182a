//! HTML pipeline: package a single document via the mobile-app shell.

use std::path::{Path, PathBuf};
use std::time::Duration;

use demo2apk_core::html::{needs_offlineify, prepare_html_for_shell};
use demo2apk_core::icon::{render_launcher_icon, SHELL_DENSITIES};
use demo2apk_core::progress::with_heartbeat;
use demo2apk_core::subprocess::{self, CommandSpec};
use demo2apk_core::{CoreError, CoreResult};

use super::{
    check_environment, collect_artifact, copy_dir_all, gradle, offlineify, prepare_workspace,
    BuildContext, ToolchainEnv,
};

/// Timeout for dependency installation stages.
const INSTALL_TIMEOUT: Duration = Duration::from_secs(120);

pub async fn run(ctx: &BuildContext) -> CoreResult<String> {
    ctx.report(5, "Checking build environment").await;
    let tools = check_environment().await?;

    let upload_path = PathBuf::from(&ctx.job.upload_path);
    let raw_html = tokio::fs::read_to_string(&upload_path).await?;

    ctx.report(10, "Preparing packaging toolchain").await;
    ensure_shell_cli(&tools).await?;

    // Directory whose contents become the app's web root, and the name of
    // the entry document within it.
    let mut web_source = upload_path
        .parent()
        .ok_or_else(|| CoreError::Internal("Upload has no parent directory".to_string()))?
        .to_path_buf();
    let mut entry_name = upload_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index.html".to_string());

    if needs_offlineify(&raw_html) {
        ctx.report(15, "Bundling remote dependencies for offline use")
            .await;
        web_source = offlineify::run(ctx, &upload_path).await?;
        entry_name = "index.html".to_string();
    }

    ctx.report(25, "Creating mobile shell project").await;
    let workspace = prepare_workspace(&ctx.config, &ctx.job.app_name).await?;
    let shell_dir = workspace.join("shell");
    let create = CommandSpec::new("npx")
        .args(["--yes", "cordova", "create"])
        .arg("shell")
        .arg(&ctx.job.app_id)
        .arg(&ctx.job.app_name)
        .current_dir(&workspace)
        .envs(tools.env.clone())
        .timeout(INSTALL_TIMEOUT);
    subprocess::run_checked(&create).await?;

    ctx.report(32, "Installing Android platform dependency").await;
    let install = CommandSpec::new("npm")
        .args(["install", "cordova-android", "--save"])
        .current_dir(&shell_dir)
        .envs(tools.env.clone())
        .timeout(INSTALL_TIMEOUT);
    with_heartbeat(
        ctx.sink.as_ref(),
        32,
        38,
        "Installing Android platform dependency",
        subprocess::run_checked(&install),
    )
    .await?;

    ctx.report(38, "Adding Android platform").await;
    let add_platform = CommandSpec::new("npx")
        .args(["cordova", "platform", "add", "android"])
        .current_dir(&shell_dir)
        .envs(tools.env.clone());
    subprocess::run_checked(&add_platform).await?;

    ctx.report(42, "Generating launcher icons").await;
    inject_shell_icons(ctx, &shell_dir).await?;

    ctx.report(45, "Copying web content").await;
    install_web_content(&web_source, &entry_name, &shell_dir).await?;

    ctx.report(55, "Syncing web resources").await;
    let prepare = CommandSpec::new("npx")
        .args(["cordova", "prepare", "android"])
        .current_dir(&shell_dir)
        .envs(tools.env.clone());
    subprocess::run_checked(&prepare).await?;

    let android_dir = shell_dir.join("platforms/android");

    ctx.report(60, "Provisioning Gradle").await;
    gradle::ensure_wrapper(&android_dir, &tools).await?;

    ctx.report(70, "Running Android debug build").await;
    gradle::assemble_debug(ctx, &android_dir, &tools, (70, 93)).await?;

    ctx.report(95, "Collecting artifact").await;
    let built = android_dir.join("app/build/outputs/apk/debug/app-debug.apk");
    let dest = collect_artifact(ctx, &built).await?;

    ctx.report(100, "Done").await;
    Ok(dest)
}

/// Make sure the shell CLI answers; install it globally when missing.
async fn ensure_shell_cli(tools: &ToolchainEnv) -> CoreResult<()> {
    if subprocess::is_available("cordova").await {
        return Ok(());
    }
    let install = CommandSpec::new("npm")
        .args(["install", "-g", "cordova"])
        .envs(tools.env.clone())
        .timeout(INSTALL_TIMEOUT);
    subprocess::run_checked(&install).await?;
    Ok(())
}

/// Copy the web source into the shell's `www`, rename the entry document to
/// `index.html`, and apply the webview patches.
async fn install_web_content(
    web_source: &Path,
    entry_name: &str,
    shell_dir: &Path,
) -> CoreResult<()> {
    let www = shell_dir.join("www");
    if www.exists() {
        tokio::fs::remove_dir_all(&www).await?;
    }

    let source = web_source.to_path_buf();
    let dest = www.clone();
    tokio::task::spawn_blocking(move || copy_dir_all(&source, &dest))
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))??;

    let entry = www.join(entry_name);
    let index = www.join("index.html");
    if entry != index {
        tokio::fs::rename(&entry, &index).await?;
    }

    let html = tokio::fs::read_to_string(&index).await?;
    tokio::fs::write(&index, prepare_html_for_shell(&html)).await?;
    Ok(())
}

/// Render launcher icons at every shell density and register them in
/// `config.xml` when no icon entries exist yet.
async fn inject_shell_icons(ctx: &BuildContext, shell_dir: &Path) -> CoreResult<()> {
    let icon_dir = shell_dir.join("res/icon/android");
    let source = super::resolve_icon_source(ctx, shell_dir).await?;

    for density in SHELL_DENSITIES {
        let dest = icon_dir.join(format!("icon-{}.png", density.qualifier));
        let src = source.clone();
        tokio::task::spawn_blocking(move || render_launcher_icon(&src, &dest, density.size_px))
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))??;
    }

    register_config_icons(shell_dir).await
}

/// Add `<icon>` entries to config.xml if none are present.
async fn register_config_icons(shell_dir: &Path) -> CoreResult<()> {
    let config_path = shell_dir.join("config.xml");
    let config = tokio::fs::read_to_string(&config_path).await?;
    if config.contains("<icon") {
        return Ok(());
    }

    let mut block = String::from("    <platform name=\"android\">\n");
    for density in SHELL_DENSITIES {
        block.push_str(&format!(
            "        <icon density=\"{q}\" src=\"res/icon/android/icon-{q}.png\" />\n",
            q = density.qualifier
        ));
    }
    block.push_str("    </platform>\n");

    let patched = match config.rfind("</widget>") {
        Some(at) => format!("{}{}{}", &config[..at], block, &config[at..]),
        None => {
            return Err(CoreError::Toolchain(
                "Shell project config.xml has no closing widget element".to_string(),
            ))
        }
    };
    tokio::fs::write(&config_path, patched).await?;
    Ok(())
}
