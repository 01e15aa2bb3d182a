//! MOCK_BUILD short-circuit.
//!
//! Steps through the declared progress schedule and writes a placeholder
//! artifact, so the whole admission → worker → download loop can be
//! exercised without any native toolchain on the host.

use demo2apk_core::config::AppConfig;
use demo2apk_core::naming::artifact_file_name;
use demo2apk_core::progress::ProgressSink;
use demo2apk_core::CoreResult;
use demo2apk_queue::Job;

/// Placeholder artifact body. Plain bytes, not a real package; download
/// consumers tolerate this only in test deployments.
const MOCK_ARTIFACT: &[u8] = b"demo2apk mock artifact\n";

const SCHEDULE: &[(i16, &str)] = &[
    (5, "Checking build environment"),
    (25, "Preparing workspace"),
    (55, "Packaging web content"),
    (80, "Running Android build"),
    (95, "Collecting artifact"),
];

pub async fn run(job: &Job, config: &AppConfig, sink: &dyn ProgressSink) -> CoreResult<String> {
    for (percent, message) in SCHEDULE {
        sink.report(*percent, message).await;
    }

    tokio::fs::create_dir_all(&config.builds_dir).await?;
    let dest = config
        .builds_dir
        .join(artifact_file_name(&job.app_name, &job.task_id));
    tokio::fs::write(&dest, MOCK_ARTIFACT).await?;

    sink.report(100, "Done").await;
    tracing::info!(task = %job.task_id, apk = %dest.display(), "Mock build finished");
    Ok(dest.to_string_lossy().into_owned())
}
