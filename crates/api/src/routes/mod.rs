//! Router assembly and middleware stack.

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Request};
use axum::middleware as axum_middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use demo2apk_core::ids::new_trace_id;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::handlers;
use crate::middleware::rate_limit;
use crate::state::AppState;

/// 16-char request trace ids, set on every request and echoed in the
/// response so a client error can be tied to its server logs.
#[derive(Clone, Copy)]
struct MakeTraceId;

impl MakeRequestId for MakeTraceId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&new_trace_id()).ok().map(RequestId::new)
    }
}

/// Build the complete router.
///
/// ```text
/// GET    /health                         liveness
/// GET    /api                            service metadata
/// POST   /api/build/html                 submit HTML build   (rate limited)
/// POST   /api/build/zip                  submit zip build    (rate limited)
/// GET    /api/build/{taskId}/status      poll
/// GET    /api/build/{taskId}/download    stream artifact
/// DELETE /api/build/{taskId}             cancel or cleanup
/// GET    /downloads/<file>               static artifact prefix
/// ```
pub fn build_router(state: AppState) -> Router {
    // Rate limiting applies to submission only.
    let submit = Router::new()
        .route("/api/build/html", post(handlers::build::submit_html))
        .route("/api/build/zip", post(handlers::build::submit_zip))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit::enforce,
        ));

    Router::new()
        .route("/health", get(handlers::meta::health))
        .route("/api", get(handlers::meta::service_info))
        .route(
            "/api/build/{task_id}/status",
            get(handlers::status::get_status),
        )
        .route(
            "/api/build/{task_id}/download",
            get(handlers::download::download_apk),
        )
        .route("/api/build/{task_id}", delete(handlers::delete::delete_task))
        .merge(submit)
        // Read-only direct access to finished artifacts.
        .nest_service("/downloads", ServeDir::new(&state.config.builds_dir))
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeTraceId))
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(state.config.max_file_size as usize))
        .with_state(state)
}
