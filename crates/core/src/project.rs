//! Front-end project inspection.
//!
//! Locates the project root inside an extracted archive and classifies the
//! project so the pipeline knows how to build it and where the bundled
//! output lands.

use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Classified project flavor, detected from config files and manifest deps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectType {
    /// Modern bundler with a `vite.config.*` file.
    Vite,
    /// Framework-static project with a `next.config.*` file.
    Next,
    /// Tooling-managed project using `react-scripts`.
    CreateReactApp,
    /// Nothing recognized; built best-effort.
    Unknown,
}

impl ProjectType {
    /// Directory (relative to the project root) where the build output lands.
    pub fn output_dir(self) -> &'static str {
        match self {
            ProjectType::Vite => "dist",
            ProjectType::Next => "out",
            ProjectType::CreateReactApp => "build",
            ProjectType::Unknown => "dist",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectType::Vite => "vite",
            ProjectType::Next => "next",
            ProjectType::CreateReactApp => "create-react-app",
            ProjectType::Unknown => "unknown",
        }
    }
}

/// Package manager used to install and build the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Pnpm,
    Yarn,
    Npm,
}

impl PackageManager {
    pub fn command(self) -> &'static str {
        match self {
            PackageManager::Pnpm => "pnpm",
            PackageManager::Yarn => "yarn",
            PackageManager::Npm => "npm",
        }
    }

    /// Arguments for a full install with dev dependencies forced on.
    ///
    /// Projects are built from scratch, so dev-only tooling (bundler,
    /// transpiler plugins) must be present even when `NODE_ENV=production`
    /// leaks into the worker environment.
    pub fn install_args(self) -> &'static [&'static str] {
        match self {
            PackageManager::Pnpm => &["install", "--prod=false"],
            PackageManager::Yarn => &["install", "--production=false"],
            PackageManager::Npm => &["install", "--include=dev"],
        }
    }

    /// Arguments to run the project's `build` script.
    pub fn build_args(self) -> &'static [&'static str] {
        match self {
            PackageManager::Pnpm => &["run", "build"],
            PackageManager::Yarn => &["build"],
            PackageManager::Npm => &["run", "build"],
        }
    }
}

/// Candidate config file names per project type.
const VITE_CONFIGS: &[&str] = &[
    "vite.config.js",
    "vite.config.ts",
    "vite.config.mts",
    "vite.config.mjs",
];

const NEXT_CONFIGS: &[&str] = &["next.config.js", "next.config.ts", "next.config.mjs"];

/// Directories never descended into while searching for the project root.
const SKIPPED_DIRS: &[&str] = &["node_modules", "__MACOSX", ".git"];

/// How deep below the extraction root the manifest may sit. Archives are
/// usually flat or wrap the project in a single top-level folder.
const MAX_ROOT_DEPTH: usize = 3;

/// Find the directory containing `package.json` inside an extracted archive.
pub fn find_project_root(extracted: &Path) -> CoreResult<PathBuf> {
    fn search(dir: &Path, depth: usize) -> Option<PathBuf> {
        if dir.join("package.json").is_file() {
            return Some(dir.to_path_buf());
        }
        if depth == 0 {
            return None;
        }
        let mut subdirs: Vec<PathBuf> = std::fs::read_dir(dir)
            .ok()?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| !n.starts_with('.') && !SKIPPED_DIRS.contains(&n))
                    .unwrap_or(false)
            })
            .collect();
        subdirs.sort();
        subdirs.iter().find_map(|sub| search(sub, depth - 1))
    }

    search(extracted, MAX_ROOT_DEPTH).ok_or_else(|| {
        CoreError::Validation(
            "No package.json found in the archive; upload a complete front-end project"
                .to_string(),
        )
    })
}

/// Locate the first existing Vite config file in `root`.
pub fn vite_config_path(root: &Path) -> Option<PathBuf> {
    VITE_CONFIGS
        .iter()
        .map(|name| root.join(name))
        .find(|p| p.is_file())
}

/// Classify a project from its config files and manifest.
pub fn detect_project_type(root: &Path) -> ProjectType {
    if vite_config_path(root).is_some() {
        return ProjectType::Vite;
    }
    if NEXT_CONFIGS.iter().any(|name| root.join(name).is_file()) {
        return ProjectType::Next;
    }
    if manifest_has_dependency(root, "react-scripts") {
        return ProjectType::CreateReactApp;
    }
    ProjectType::Unknown
}

/// Whether `package.json` lists `name` under dependencies or devDependencies.
pub fn manifest_has_dependency(root: &Path, name: &str) -> bool {
    let Ok(raw) = std::fs::read_to_string(root.join("package.json")) else {
        return false;
    };
    let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&raw) else {
        return false;
    };
    ["dependencies", "devDependencies"].iter().any(|section| {
        manifest
            .get(section)
            .and_then(|deps| deps.get(name))
            .is_some()
    })
}

/// Pick the package manager from lockfiles, falling back to npm.
///
/// Lockfile preference only holds when the corresponding tool is actually
/// installed on the build host.
pub fn detect_package_manager(root: &Path, have_pnpm: bool, have_yarn: bool) -> PackageManager {
    if root.join("pnpm-lock.yaml").is_file() && have_pnpm {
        return PackageManager::Pnpm;
    }
    if root.join("yarn.lock").is_file() && have_yarn {
        return PackageManager::Yarn;
    }
    PackageManager::Npm
}
