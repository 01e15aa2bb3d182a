//! Random identifier generation.
//!
//! Task ids are short URL-safe tokens that double as queue job ids and
//! artifact-name suffixes; trace ids tie a request log line to its response.

use rand::Rng;

/// Length of a task identifier.
pub const TASK_ID_LEN: usize = 12;

/// Length of a request trace identifier.
pub const TRACE_ID_LEN: usize = 16;

fn alphanumeric_token(len: usize) -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate a new 12-character task identifier.
pub fn new_task_id() -> String {
    alphanumeric_token(TASK_ID_LEN)
}

/// Generate a new 16-character request trace identifier.
pub fn new_trace_id() -> String {
    alphanumeric_token(TRACE_ID_LEN)
}

/// Whether `value` has the shape of a task identifier.
pub fn looks_like_task_id(value: &str) -> bool {
    value.len() == TASK_ID_LEN && value.chars().all(|c| c.is_ascii_alphanumeric())
}
