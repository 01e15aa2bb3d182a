//! Gradle wrapper provisioning and invocation.
//!
//! Projects generated by the shell and wrapper CLIs do not always carry a
//! wrapper script. When one is missing we generate it, preferring a system
//! Gradle and falling back to a pinned distribution cached under
//! `~/.gradle/gradle-dist/` so later builds skip the download.

use std::path::{Path, PathBuf};
use std::time::Duration;

use demo2apk_core::progress::with_heartbeat;
use demo2apk_core::subprocess::{self, CommandSpec};
use demo2apk_core::{CoreError, CoreResult};

use super::{BuildContext, ToolchainEnv};

/// Pinned Gradle version used when generating wrappers.
pub const GRADLE_VERSION: &str = "8.7";

/// Distribution URL matching [`GRADLE_VERSION`].
pub const GRADLE_DIST_URL: &str =
    "https://services.gradle.org/distributions/gradle-8.7-bin.zip";

/// JVM heap cap for Gradle. Container deployments routinely run with
/// 2 GB limits; an uncapped daemonless Gradle will blow through that.
const GRADLE_HEAP_OPTS: &str = "-Xmx1024m";

/// Timeout for wrapper generation and distribution download.
const PROVISION_TIMEOUT: Duration = Duration::from_secs(300);

/// Ensure `project_dir` has an executable `gradlew`.
pub async fn ensure_wrapper(project_dir: &Path, tools: &ToolchainEnv) -> CoreResult<()> {
    let gradlew = project_dir.join("gradlew");
    if gradlew.exists() {
        make_executable(&gradlew)?;
        return Ok(());
    }

    let gradle_program = if subprocess::is_available("gradle").await {
        PathBuf::from("gradle")
    } else {
        provision_gradle_dist().await?
    };

    let spec = CommandSpec::new(gradle_program.to_string_lossy())
        .args([
            "wrapper",
            "--gradle-version",
            GRADLE_VERSION,
            "--gradle-distribution-url",
            GRADLE_DIST_URL,
        ])
        .current_dir(project_dir)
        .envs(tools.env.clone())
        .timeout(PROVISION_TIMEOUT);
    subprocess::run_checked(&spec).await?;

    make_executable(&gradlew)?;
    Ok(())
}

/// Run `./gradlew assembleDebug --no-daemon` with the heap cap, emitting
/// heartbeat progress inside `band`.
pub async fn assemble_debug(
    ctx: &BuildContext,
    project_dir: &Path,
    tools: &ToolchainEnv,
    band: (i16, i16),
) -> CoreResult<()> {
    let spec = CommandSpec::new("./gradlew")
        .args(["assembleDebug", "--no-daemon"])
        .current_dir(project_dir)
        .envs(tools.env.clone())
        .env("GRADLE_OPTS", GRADLE_HEAP_OPTS);

    with_heartbeat(
        ctx.sink.as_ref(),
        band.0,
        band.1,
        "Running Gradle build",
        subprocess::run_checked(&spec),
    )
    .await?;
    Ok(())
}

/// Download and unpack the pinned Gradle distribution, returning the path
/// to its `gradle` launcher. Reuses the cache when present.
async fn provision_gradle_dist() -> CoreResult<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| CoreError::Environment("HOME is not set; cannot cache Gradle".to_string()))?;
    let cache = PathBuf::from(home).join(".gradle/gradle-dist");
    let launcher = cache.join(format!("gradle-{GRADLE_VERSION}/bin/gradle"));
    if launcher.exists() {
        return Ok(launcher);
    }

    tokio::fs::create_dir_all(&cache).await?;

    tracing::info!(url = GRADLE_DIST_URL, "Downloading Gradle distribution");
    let bytes = reqwest::get(GRADLE_DIST_URL)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| CoreError::Toolchain(format!("Gradle download failed: {e}")))?
        .bytes()
        .await
        .map_err(|e| CoreError::Toolchain(format!("Gradle download failed: {e}")))?;

    let archive_path = cache.join(format!("gradle-{GRADLE_VERSION}-bin.zip"));
    tokio::fs::write(&archive_path, &bytes).await?;

    let unpack_to = cache.clone();
    let archive_for_task = archive_path.clone();
    tokio::task::spawn_blocking(move || -> CoreResult<()> {
        let file = std::fs::File::open(&archive_for_task)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| CoreError::Toolchain(format!("Gradle archive is corrupt: {e}")))?;
        archive
            .extract(&unpack_to)
            .map_err(|e| CoreError::Toolchain(format!("Gradle archive extraction failed: {e}")))
    })
    .await
    .map_err(|e| CoreError::Internal(e.to_string()))??;

    let _ = tokio::fs::remove_file(&archive_path).await;
    make_executable(&launcher)?;
    Ok(launcher)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> CoreResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> CoreResult<()> {
    Ok(())
}
