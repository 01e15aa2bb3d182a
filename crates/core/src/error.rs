use std::io;

/// Domain-level error kinds shared across the workspace.
///
/// The API layer maps these onto HTTP statuses; the worker records them in
/// the job row. Build failures never escape the job record as process errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded, retry in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// An external command exited non-zero or could not run to completion.
    #[error("{0}")]
    Toolchain(String),

    /// A required tool or SDK is missing from the build host.
    #[error("{0}")]
    Environment(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
