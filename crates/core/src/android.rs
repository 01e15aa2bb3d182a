//! Android SDK discovery and toolchain environment assembly.

use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Environment variables that override SDK discovery, in priority order.
pub const SDK_ENV_VARS: &[&str] = &["ANDROID_HOME", "ANDROID_SDK_ROOT"];

/// All locations checked for an Android SDK, most specific first.
pub fn sdk_root_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    for var in SDK_ENV_VARS {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                candidates.push(PathBuf::from(value));
            }
        }
    }
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        candidates.push(home.join("Android/Sdk"));
        candidates.push(home.join("Library/Android/sdk"));
        candidates.push(home.join("android-sdk"));
    }
    candidates.push(PathBuf::from("/usr/lib/android-sdk"));
    candidates.push(PathBuf::from("/opt/android-sdk"));
    candidates.push(PathBuf::from("/usr/local/lib/android/sdk"));
    candidates
}

/// Pick the first existing candidate directory.
pub fn resolve_sdk_root_from(candidates: &[PathBuf]) -> CoreResult<PathBuf> {
    candidates
        .iter()
        .find(|path| path.is_dir())
        .cloned()
        .ok_or_else(|| {
            CoreError::Environment(
                "Android SDK not found; set ANDROID_HOME to the SDK root".to_string(),
            )
        })
}

/// Resolve the SDK root from env overrides and well-known locations.
pub fn resolve_sdk_root() -> CoreResult<PathBuf> {
    resolve_sdk_root_from(&sdk_root_candidates())
}

/// Environment variables exposing the SDK to child processes.
///
/// Prepends `platform-tools` and the command-line tools to `PATH` so the
/// shell and wrapper CLIs find `adb`, `sdkmanager`, and friends.
pub fn toolchain_env(sdk_root: &Path) -> Vec<(String, String)> {
    let sdk = sdk_root.to_string_lossy();
    let current_path = std::env::var("PATH").unwrap_or_default();
    let path = format!(
        "{sdk}/platform-tools:{sdk}/cmdline-tools/latest/bin:{sdk}/tools/bin:{current_path}"
    );
    vec![
        ("ANDROID_HOME".to_string(), sdk.to_string()),
        ("ANDROID_SDK_ROOT".to_string(), sdk.to_string()),
        ("PATH".to_string(), path),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_the_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let missing = PathBuf::from("/definitely/not/here");
        let resolved =
            resolve_sdk_root_from(&[missing, dir.path().to_path_buf()]).unwrap();
        assert_eq!(resolved, dir.path());
    }

    #[test]
    fn missing_sdk_is_an_environment_error() {
        let err = resolve_sdk_root_from(&[PathBuf::from("/nope/a"), PathBuf::from("/nope/b")])
            .unwrap_err();
        assert!(matches!(err, CoreError::Environment(_)));
        assert!(err.to_string().contains("ANDROID_HOME"));
    }

    #[test]
    fn toolchain_env_exposes_sdk_paths() {
        let env = toolchain_env(Path::new("/sdk"));
        let get = |key: &str| {
            env.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("ANDROID_HOME"), "/sdk");
        assert_eq!(get("ANDROID_SDK_ROOT"), "/sdk");
        assert!(get("PATH").starts_with("/sdk/platform-tools:"));
    }
}
