use std::sync::Arc;

use demo2apk_core::config::AppConfig;
use demo2apk_queue::JobStore;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// Cheaply cloneable; both fields are behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Queue backend shared with the worker processes.
    pub store: Arc<dyn JobStore>,
    /// Service configuration loaded at startup.
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn JobStore>, config: Arc<AppConfig>) -> Self {
        Self { store, config }
    }
}
