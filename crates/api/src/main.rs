use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use demo2apk_api::{routes, state::AppState};
use demo2apk_core::config::{mask_credentials, AppConfig};
use demo2apk_queue::{JobStore, PgJobStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("demo2apk={},tower_http=info", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        host = %config.host,
        port = config.port,
        builds_dir = %config.builds_dir.display(),
        uploads_dir = %config.uploads_dir.display(),
        "Loaded configuration",
    );

    // Storage roots must exist before the first upload or download.
    std::fs::create_dir_all(&config.builds_dir).expect("Failed to create builds dir");
    std::fs::create_dir_all(&config.uploads_dir).expect("Failed to create uploads dir");

    // Queue backend.
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
    let state = AppState::new(Arc::clone(&store), Arc::new(config.clone()));
    let app = routes::build_router(state);

    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!(%addr, "API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    store.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM so the server drains cleanly whether stopped
/// interactively or by a process manager.
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
