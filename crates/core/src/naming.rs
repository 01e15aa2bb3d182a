//! App identifier derivation and filesystem-name sanitization.
//!
//! Two distinct concerns: `derive_app_id` produces a valid reverse-DNS Java
//! package identifier from arbitrary Unicode input, while
//! `sanitize_dir_name` produces a path segment the external toolchains can
//! tolerate. Artifact file names keep the display name but carry a task-id
//! suffix so concurrent builds with the same app name never collide.

use crate::ids::TASK_ID_LEN;

/// Package prefix for derived app identifiers.
pub const APP_ID_PREFIX: &str = "com.vibecoding.";

/// Separator between the display name and the task-id suffix in artifact
/// file names.
const ARTIFACT_SUFFIX_SEP: &str = "--";

/// Derive a reverse-DNS app identifier from a display name.
///
/// Lowercases, replaces runs of non-`[a-z0-9]` with a single dot, strips
/// leading/trailing dots, and repairs each segment so it starts with a
/// letter. Any input, including fully non-Latin names, yields a valid
/// Java package identifier.
pub fn derive_app_id(app_name: &str) -> String {
    let lowered = app_name.to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            slug.push(ch);
        } else if !slug.ends_with('.') {
            slug.push('.');
        }
    }

    let trimmed = slug.trim_matches('.');
    if trimmed.is_empty() {
        return format!("{APP_ID_PREFIX}app");
    }

    let suffix = trimmed
        .split('.')
        .enumerate()
        .map(|(index, segment)| {
            if segment.is_empty() {
                format!("app{index}")
            } else if !segment.starts_with(|c: char| c.is_ascii_lowercase()) {
                format!("a{segment}")
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(".");

    format!("{APP_ID_PREFIX}{suffix}")
}

/// Sanitize a name for use as a workspace directory segment.
///
/// Replaces any character outside `[A-Za-z0-9_.-]` with `_`, collapses runs
/// of `_`, and trims leading/trailing `_`. Non-ASCII paths break several of
/// the external toolchains, so the result is pure ASCII.
pub fn sanitize_dir_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    for ch in replaced.chars() {
        if ch == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(ch);
    }

    let trimmed = collapsed.trim_matches('_');
    if trimmed.is_empty() {
        "project".to_string()
    } else {
        trimmed.to_string()
    }
}

/// File name for a finished artifact: `<appName>--<taskId>.apk`.
///
/// The display name keeps its Unicode but loses path-hostile characters;
/// the suffix guarantees uniqueness across concurrent same-name builds.
pub fn artifact_file_name(app_name: &str, task_id: &str) -> String {
    let safe: String = app_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();
    format!("{safe}{ARTIFACT_SUFFIX_SEP}{task_id}.apk")
}

/// User-facing download name: the stored artifact name with the internal
/// `--<taskId>` suffix stripped.
pub fn display_file_name(stored: &str) -> String {
    let Some(stem) = stored.strip_suffix(".apk") else {
        return stored.to_string();
    };
    match stem.rsplit_once(ARTIFACT_SUFFIX_SEP) {
        Some((name, suffix))
            if suffix.len() == TASK_ID_LEN
                && suffix.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!("{name}.apk")
        }
        _ => stored.to_string(),
    }
}
