//! Liveness and service metadata endpoints.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api
///
/// Service metadata: endpoint map and the limits a client should respect.
pub async fn service_info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": "demo2apk",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "submitHtml": "POST /api/build/html",
            "submitZip": "POST /api/build/zip",
            "status": "GET /api/build/{taskId}/status",
            "download": "GET /api/build/{taskId}/download",
            "cancel": "DELETE /api/build/{taskId}",
        },
        "limits": {
            "maxFileSize": state.config.max_file_size,
            "rateLimitMax": state.config.rate_limit_max,
            "rateLimitWindowSecs": state.config.rate_limit_window_secs,
            "retentionHours": state.config.file_retention_hours,
        },
    }))
}
