use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use demo2apk_core::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and implements [`IntoResponse`]
/// producing the service's `{error, message}` JSON bodies. Raw internal
/// details never reach the client; the request id in the logs ties a
/// response to its server-side cause.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias for handler return values.
pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message, retry_after) = match &self {
            ApiError::Core(core) => match core {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "Bad Request", msg.clone(), None)
                }
                CoreError::NotFound(msg) => {
                    (StatusCode::NOT_FOUND, "Not Found", msg.clone(), None)
                }
                // DELETE on an active job is surfaced as a plain 400.
                CoreError::Conflict(msg) => {
                    (StatusCode::BAD_REQUEST, "Bad Request", msg.clone(), None)
                }
                CoreError::RateLimited { retry_after_secs } => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "Too Many Requests",
                    format!(
                        "Rate limit exceeded. Try again in {} minutes.",
                        (retry_after_secs / 60).max(1)
                    ),
                    Some(*retry_after_secs),
                ),
                CoreError::Toolchain(msg) | CoreError::Environment(msg) => {
                    // The API never runs builds; seeing these here means a
                    // handler misused core. Treat as internal.
                    tracing::error!(error = %msg, "Toolchain error reached the API");
                    internal_tuple()
                }
                CoreError::Io(e) => {
                    tracing::error!(error = %e, "I/O error in handler");
                    internal_tuple()
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal_tuple()
                }
            },
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "Bad Request", msg.clone(), None)
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal_tuple()
            }
        };

        let mut body = json!({
            "error": kind,
            "message": message,
        });
        if let Some(secs) = retry_after {
            body["retryAfter"] = json!(secs);
        }

        let mut response = (status, axum::Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

fn internal_tuple() -> (StatusCode, &'static str, String, Option<u64>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error",
        "An internal error occurred".to_string(),
        None,
    )
}
