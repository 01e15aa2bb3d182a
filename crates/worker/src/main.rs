use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use demo2apk_core::config::{mask_credentials, AppConfig};
use demo2apk_queue::{JobStore, PgJobStore};
use demo2apk_worker::{pool, sweeper};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("demo2apk={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        concurrency = config.worker_concurrency,
        builds_dir = %config.builds_dir.display(),
        uploads_dir = %config.uploads_dir.display(),
        mock = config.mock_build,
        "Worker starting",
    );

    std::fs::create_dir_all(&config.builds_dir).expect("Failed to create builds dir");
    std::fs::create_dir_all(&config.uploads_dir).expect("Failed to create uploads dir");

    let store = PgJobStore::connect(&config.database_url)
        .await
        .expect("Failed to connect to the queue backend");
    store
        .health_check()
        .await
        .expect("Queue backend health check failed");
    tracing::info!(
        url = %mask_credentials(&config.database_url),
        "Queue backend ready",
    );

    let store: Arc<dyn JobStore> = Arc::new(store);
    let config = Arc::new(config);
    let cancel = CancellationToken::new();

    let mut handles = Vec::new();
    for slot in 0..config.worker_concurrency {
        handles.push(tokio::spawn(pool::run_slot(
            slot,
            Arc::clone(&store),
            Arc::clone(&config),
            cancel.clone(),
        )));
    }
    handles.push(tokio::spawn(sweeper::run(
        Arc::clone(&store),
        Arc::clone(&config),
        cancel.clone(),
    )));

    shutdown_signal().await;
    tracing::info!("Shutdown signal received; draining in-flight builds");
    cancel.cancel();

    // No timeout here: in-flight builds run to completion by policy.
    for handle in handles {
        let _ = handle.await;
    }

    store.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
