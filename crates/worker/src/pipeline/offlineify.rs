//! Offlineify sub-pipeline: make a CDN-dependent HTML document self-contained.
//!
//! Compiles the embedded `text/babel` script ahead of time, swaps known CDN
//! tags for local vendor files, fetches those files, and generates a local
//! Tailwind stylesheet when the CDN build was in use. The output directory
//! replaces the original document in the main pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use demo2apk_core::html::{rewrite_for_offline, VendorAsset, APP_JS_FILE, TAILWIND_CSS_FILE};
use demo2apk_core::subprocess::{self, CommandSpec};
use demo2apk_core::{CoreError, CoreResult};

use super::BuildContext;

/// Timeout for the JSX transform and the Tailwind CLI (both run via npx and
/// may need a one-off package download).
const TOOL_TIMEOUT: Duration = Duration::from_secs(180);

/// Timeout per vendor-file fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Run the sub-pipeline on `html_path`, returning the directory holding
/// `index.html`, `app.js` (if compiled), and `vendor/`.
pub async fn run(ctx: &BuildContext, html_path: &Path) -> CoreResult<PathBuf> {
    let raw = tokio::fs::read_to_string(html_path).await?;
    let upload_dir = html_path
        .parent()
        .ok_or_else(|| CoreError::Internal("Upload has no parent directory".to_string()))?;

    let out_dir = upload_dir.join("offline");
    if out_dir.exists() {
        tokio::fs::remove_dir_all(&out_dir).await?;
    }
    let vendor_dir = out_dir.join("vendor");
    tokio::fs::create_dir_all(&vendor_dir).await?;

    let rewrite = rewrite_for_offline(&raw);

    if let Some(babel_source) = &rewrite.babel_source {
        compile_babel_entry(ctx, &out_dir, babel_source).await?;
    }

    tokio::fs::write(out_dir.join("index.html"), &rewrite.html).await?;

    if !rewrite.assets.is_empty() {
        fetch_vendor_assets(ctx, &rewrite.assets, &vendor_dir).await?;
    }

    if rewrite.needs_tailwind {
        generate_tailwind_css(ctx, &out_dir, html_path).await?;
    }

    Ok(out_dir)
}

/// Compile the extracted JSX through Babel (classic runtime, non-dev) into
/// `app.js` next to the rewritten document.
async fn compile_babel_entry(
    ctx: &BuildContext,
    out_dir: &Path,
    babel_source: &str,
) -> CoreResult<()> {
    let entry = out_dir.join("_entry.jsx");
    tokio::fs::write(&entry, babel_source).await?;

    let spec = CommandSpec::new("npx")
        .args([
            "--yes",
            "--package",
            "@babel/core",
            "--package",
            "@babel/cli",
            "--package",
            "@babel/preset-react",
            "babel",
            "_entry.jsx",
            "--out-file",
            APP_JS_FILE,
            "--presets",
            "@babel/preset-react",
        ])
        .current_dir(out_dir)
        .timeout(TOOL_TIMEOUT);
    subprocess::run_checked(&spec).await?;

    let _ = tokio::fs::remove_file(&entry).await;
    tracing::debug!(task = %ctx.job.task_id, "Compiled embedded JSX to app.js");
    Ok(())
}

/// Fetch every vendor file in parallel; any failure fails the pipeline.
async fn fetch_vendor_assets(
    ctx: &BuildContext,
    assets: &[VendorAsset],
    vendor_dir: &Path,
) -> CoreResult<()> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| CoreError::Internal(e.to_string()))?;

    let fetches = assets.iter().map(|asset| {
        let client = client.clone();
        let dest = vendor_dir.join(asset.file);
        async move {
            let bytes = client
                .get(asset.url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| {
                    CoreError::Toolchain(format!("Failed to fetch {}: {e}", asset.url))
                })?
                .bytes()
                .await
                .map_err(|e| {
                    CoreError::Toolchain(format!("Failed to fetch {}: {e}", asset.url))
                })?;
            tokio::fs::write(&dest, &bytes).await?;
            Ok::<_, CoreError>(())
        }
    });

    futures::future::try_join_all(fetches).await?;
    tracing::debug!(
        task = %ctx.job.task_id,
        count = assets.len(),
        "Fetched vendor files",
    );
    Ok(())
}

/// Run the Tailwind CLI in JIT mode over the rewritten document, the
/// compiled entry script, and the original HTML, emitting a minified
/// stylesheet into `vendor/`.
async fn generate_tailwind_css(
    ctx: &BuildContext,
    out_dir: &Path,
    original_html: &Path,
) -> CoreResult<()> {
    let input = out_dir.join("_tailwind.css");
    tokio::fs::write(&input, "@tailwind base;\n@tailwind components;\n@tailwind utilities;\n")
        .await?;

    let content = format!(
        "index.html,{},{}",
        APP_JS_FILE,
        original_html.to_string_lossy()
    );
    let spec = CommandSpec::new("npx")
        .args(["--yes", "tailwindcss", "-i", "_tailwind.css", "-o"])
        .arg(format!("vendor/{TAILWIND_CSS_FILE}"))
        .arg("--content")
        .arg(&content)
        .arg("--minify")
        .current_dir(out_dir)
        .timeout(TOOL_TIMEOUT);
    subprocess::run_checked(&spec).await?;

    let _ = tokio::fs::remove_file(&input).await;
    tracing::debug!(task = %ctx.job.task_id, "Generated local Tailwind stylesheet");
    Ok(())
}
