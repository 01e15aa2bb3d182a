//! Auto-repair for bundler-based front-end projects.
//!
//! AI-generated Vite projects routinely ship with an absolute base path,
//! no legacy transpilation, references to stylesheets that do not exist,
//! and undeclared implicit dependencies. Each repair below is applied only
//! when the project actually needs it, and every change is recorded so the
//! progress surface can report what was touched.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::project::vite_config_path;

/// Browser floor for the legacy transpilation plugin. Android System WebView
/// on older devices is roughly Chrome 52.
pub const LEGACY_TARGETS: &str = "['chrome >= 52', 'android >= 5']";

/// devDependencies added alongside the legacy plugin.
const LEGACY_PLUGIN_DEP: (&str, &str) = ("@vitejs/plugin-legacy", "^5.4.0");
const TERSER_DEP: (&str, &str) = ("terser", "^5.31.0");

/// Packages known to use another package without declaring it.
const IMPLICIT_PEERS: &[(&str, &str, &str)] = &[
    ("recharts", "react-is", "^18.3.1"),
    ("react-redux", "react-is", "^18.3.1"),
    ("@mui/material", "@emotion/styled", "^11.11.5"),
];

/// Bare imports worth adding when found in sources but missing from the
/// manifest.
const IMPORT_WATCH_LIST: &[(&str, &str)] = &[
    ("react-is", "^18.3.1"),
    ("prop-types", "^15.8.1"),
    ("clsx", "^2.1.1"),
    ("lucide-react", "^0.452.0"),
];

/// Node built-ins that must never be treated as missing packages.
const NODE_BUILTINS: &[&str] = &[
    "assert", "buffer", "child_process", "crypto", "events", "fs", "http", "https", "module",
    "net", "os", "path", "process", "querystring", "readline", "stream", "string_decoder",
    "tls", "tty", "url", "util", "v8", "vm", "worker_threads", "zlib",
];

/// Class-name fragments that signal Tailwind usage in markup.
const TAILWIND_HINTS: &[&str] = &[
    "flex", "grid", "px-", "py-", "mx-", "my-", "bg-", "text-", "rounded", "shadow",
];

/// Most source files scanned for class names and imports. Uploaded projects
/// are small; the cap only guards against pathological archives.
const MAX_SCANNED_FILES: usize = 512;

static BASE_SETTING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bbase\s*:").expect("base setting regex"));

static PLUGINS_ARRAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"plugins\s*:\s*\[").expect("plugins array regex"));

static DEFINE_CONFIG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"defineConfig\s*\(\s*\{").expect("defineConfig regex"));

static EXPORT_DEFAULT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"export\s+default\s*\{").expect("export default regex"));

static INDEX_CSS_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']([^"']*index\.css)["']"#).expect("index.css regex"));

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)(?:import\s[^;]*?from\s*|import\s*\(\s*|require\s*\(\s*)["']([^"']+)["']"#)
        .expect("import specifier regex")
});

/// Whether a Vite config still needs repairing: true iff it lacks a `base`
/// setting or lacks the legacy transpilation plugin.
pub fn needs_vite_fix(config_src: &str) -> bool {
    !BASE_SETTING_RE.is_match(config_src) || !config_src.contains("@vitejs/plugin-legacy")
}

/// Changes applied by [`repair_vite_project`], in application order.
#[derive(Debug, Default)]
pub struct RepairReport {
    pub changes: Vec<String>,
}

impl RepairReport {
    fn note(&mut self, change: impl Into<String>) {
        self.changes.push(change.into());
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Repair a Vite project in place. No-op when everything is already in
/// order.
pub fn repair_vite_project(root: &Path) -> CoreResult<RepairReport> {
    let mut report = RepairReport::default();

    let config_path = vite_config_path(root).ok_or_else(|| {
        CoreError::Internal("repair_vite_project called without a vite config".to_string())
    })?;
    let mut config = std::fs::read_to_string(&config_path)?;
    let original = config.clone();

    if !BASE_SETTING_RE.is_match(&config) {
        if let Some(patched) = inject_config_entry(&config, "base: './',") {
            config = patched;
            report.note("set base: './' for file:// asset resolution");
        }
    }

    if !config.contains("@vitejs/plugin-legacy") {
        config = inject_legacy_plugin(&config, &mut report);
    }

    if config != original {
        std::fs::write(&config_path, &config)?;
    }

    let mut manifest = read_manifest(root)?;
    let original_manifest = manifest.clone();

    if config.contains("@vitejs/plugin-legacy") {
        for (name, version) in [LEGACY_PLUGIN_DEP, TERSER_DEP] {
            if ensure_dev_dependency(&mut manifest, name, version) {
                report.note(format!("added devDependency {name}@{version}"));
            }
        }
    }

    let tailwind = tailwind_in_use(root);
    ensure_entry_css(root, tailwind, &mut report)?;

    if tailwind && tailwind_config_path(root).is_none() {
        scaffold_tailwind(root, &mut report)?;
        for (name, version) in [
            ("tailwindcss", "^3.4.0"),
            ("postcss", "^8.4.0"),
            ("autoprefixer", "^10.4.0"),
        ] {
            if ensure_dev_dependency(&mut manifest, name, version) {
                report.note(format!("added devDependency {name}@{version}"));
            }
        }
    }

    add_implicit_dependencies(root, &mut manifest, &mut report);

    if manifest != original_manifest {
        write_manifest(root, &manifest)?;
    }

    Ok(report)
}

// ---------------------------------------------------------------------------
// Config editing
// ---------------------------------------------------------------------------

/// Insert `entry` as the first key of the config object literal. Returns
/// `None` when the config shape is not recognized.
fn inject_config_entry(config: &str, entry: &str) -> Option<String> {
    let m = DEFINE_CONFIG_RE
        .find(config)
        .or_else(|| EXPORT_DEFAULT_RE.find(config))?;
    let at = m.end();
    Some(format!("{}\n  {}{}", &config[..at], entry, &config[at..]))
}

fn legacy_plugin_call() -> String {
    format!(
        "legacy({{ targets: {LEGACY_TARGETS}, additionalLegacyPolyfills: ['regenerator-runtime/runtime'] }})"
    )
}

fn inject_legacy_plugin(config: &str, report: &mut RepairReport) -> String {
    let with_import = format!("import legacy from '@vitejs/plugin-legacy'\n{config}");

    if let Some(m) = PLUGINS_ARRAY_RE.find(&with_import) {
        let at = m.end();
        report.note("added @vitejs/plugin-legacy to existing plugins");
        return format!(
            "{}\n    {},{}",
            &with_import[..at],
            legacy_plugin_call(),
            &with_import[at..]
        );
    }

    match inject_config_entry(&with_import, &format!("plugins: [{}],", legacy_plugin_call())) {
        Some(patched) => {
            report.note("added @vitejs/plugin-legacy plugins array");
            patched
        }
        None => {
            report.note("vite config shape not recognized; legacy plugin not injected");
            config.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest editing
// ---------------------------------------------------------------------------

fn read_manifest(root: &Path) -> CoreResult<Value> {
    let raw = std::fs::read_to_string(root.join("package.json"))?;
    serde_json::from_str(&raw)
        .map_err(|e| CoreError::Validation(format!("package.json is not valid JSON: {e}")))
}

fn write_manifest(root: &Path, manifest: &Value) -> CoreResult<()> {
    let pretty = serde_json::to_string_pretty(manifest)
        .map_err(|e| CoreError::Internal(e.to_string()))?;
    std::fs::write(root.join("package.json"), pretty + "\n")?;
    Ok(())
}

fn section<'a>(manifest: &'a Value, key: &str) -> Option<&'a Map<String, Value>> {
    manifest.get(key).and_then(Value::as_object)
}

fn has_dependency(manifest: &Value, name: &str) -> bool {
    ["dependencies", "devDependencies"]
        .iter()
        .any(|key| section(manifest, key).is_some_and(|deps| deps.contains_key(name)))
}

/// Add a dependency to the given section if absent anywhere in the
/// manifest. Returns whether the manifest changed.
fn ensure_dependency_in(manifest: &mut Value, key: &str, name: &str, version: &str) -> bool {
    if has_dependency(manifest, name) {
        return false;
    }
    let Some(obj) = manifest.as_object_mut() else {
        return false;
    };
    let Some(deps) = obj
        .entry(key.to_string())
        .or_insert_with(|| json!({}))
        .as_object_mut()
    else {
        return false;
    };
    deps.insert(name.to_string(), Value::String(version.to_string()));
    true
}

fn ensure_dev_dependency(manifest: &mut Value, name: &str, version: &str) -> bool {
    ensure_dependency_in(manifest, "devDependencies", name, version)
}

fn ensure_runtime_dependency(manifest: &mut Value, name: &str, version: &str) -> bool {
    ensure_dependency_in(manifest, "dependencies", name, version)
}

// ---------------------------------------------------------------------------
// Entry CSS and Tailwind
// ---------------------------------------------------------------------------

/// Full-size reset appended to a generated entry stylesheet.
const ROOT_RESET_CSS: &str =
    "html, body, #root {\n  height: 100%;\n  width: 100%;\n  margin: 0;\n  padding: 0;\n}\n";

const TAILWIND_DIRECTIVES: &str = "@tailwind base;\n@tailwind components;\n@tailwind utilities;\n";

/// Create a referenced-but-missing `index.css` so the bundler does not fail
/// resolving it.
fn ensure_entry_css(root: &Path, tailwind: bool, report: &mut RepairReport) -> CoreResult<()> {
    let index_html = root.join("index.html");
    let Ok(html) = std::fs::read_to_string(&index_html) else {
        return Ok(());
    };

    for caps in INDEX_CSS_REF_RE.captures_iter(&html) {
        let referenced = caps[1].trim_start_matches('/');
        let css_path = root.join(referenced);
        if css_path.exists() {
            continue;
        }
        if let Some(parent) = css_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut contents = String::new();
        if tailwind {
            contents.push_str(TAILWIND_DIRECTIVES);
            contents.push('\n');
        }
        contents.push_str(ROOT_RESET_CSS);
        std::fs::write(&css_path, contents)?;
        report.note(format!("created missing stylesheet {referenced}"));
    }
    Ok(())
}

fn tailwind_config_path(root: &Path) -> Option<std::path::PathBuf> {
    ["tailwind.config.js", "tailwind.config.ts", "tailwind.config.cjs", "tailwind.config.mjs"]
        .iter()
        .map(|name| root.join(name))
        .find(|p| p.is_file())
}

/// Whether the project uses Tailwind: a config file, a reference in the
/// HTML, or utility-class patterns in the sources.
pub fn tailwind_in_use(root: &Path) -> bool {
    if tailwind_config_path(root).is_some() {
        return true;
    }
    if let Ok(html) = std::fs::read_to_string(root.join("index.html")) {
        if html.contains("tailwind") {
            return true;
        }
    }
    source_files(root)
        .iter()
        .take(MAX_SCANNED_FILES)
        .filter_map(|p| std::fs::read_to_string(p).ok())
        .any(|src| has_tailwind_classes(&src))
}

fn has_tailwind_classes(src: &str) -> bool {
    static CLASS_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"class(?:Name)?\s*=\s*["']([^"']+)["']"#).expect("class attr regex")
    });
    CLASS_ATTR_RE.captures_iter(src).any(|caps| {
        let classes = &caps[1];
        classes
            .split_whitespace()
            .filter(|token| {
                TAILWIND_HINTS
                    .iter()
                    .any(|hint| token.starts_with(hint) || *token == *hint)
            })
            .count()
            >= 2
    })
}

fn scaffold_tailwind(root: &Path, report: &mut RepairReport) -> CoreResult<()> {
    let tailwind_config = "/** @type {import('tailwindcss').Config} */\n\
export default {\n\
  content: ['./index.html', './src/**/*.{js,ts,jsx,tsx}'],\n\
  theme: { extend: {} },\n\
  plugins: [],\n\
}\n";
    std::fs::write(root.join("tailwind.config.js"), tailwind_config)?;

    let postcss_config = "export default {\n\
  plugins: {\n\
    tailwindcss: {},\n\
    autoprefixer: {},\n\
  },\n\
}\n";
    std::fs::write(root.join("postcss.config.js"), postcss_config)?;
    report.note("scaffolded tailwind.config.js and postcss.config.js");
    Ok(())
}

// ---------------------------------------------------------------------------
// Implicit dependencies
// ---------------------------------------------------------------------------

fn add_implicit_dependencies(root: &Path, manifest: &mut Value, report: &mut RepairReport) {
    // Known peer gaps of installed packages.
    for (package, implied, version) in IMPLICIT_PEERS {
        if has_dependency(manifest, package)
            && ensure_runtime_dependency(manifest, implied, version)
        {
            report.note(format!("added {implied}@{version} (implicit peer of {package})"));
        }
    }

    // Bare imports found in sources but missing from the manifest.
    for specifier in collect_bare_imports(root) {
        let Some((_, version)) = IMPORT_WATCH_LIST
            .iter()
            .find(|(name, _)| *name == specifier)
        else {
            continue;
        };
        if ensure_runtime_dependency(manifest, &specifier, version) {
            report.note(format!("added {specifier}@{version} (imported but not declared)"));
        }
    }
}

/// Bare package names imported anywhere under `src/` (and the project root).
fn collect_bare_imports(root: &Path) -> Vec<String> {
    let mut found = Vec::new();
    for path in source_files(root).iter().take(MAX_SCANNED_FILES) {
        let Ok(src) = std::fs::read_to_string(path) else {
            continue;
        };
        for caps in IMPORT_RE.captures_iter(&src) {
            let spec = &caps[1];
            if spec.starts_with('.') || spec.starts_with('/') || spec.starts_with("node:") {
                continue;
            }
            let package = package_base_name(spec);
            if NODE_BUILTINS.contains(&package) {
                continue;
            }
            if !found.iter().any(|f| f == package) {
                found.push(package.to_string());
            }
        }
    }
    found
}

/// `@scope/pkg/sub` -> `@scope/pkg`; `pkg/sub` -> `pkg`.
fn package_base_name(specifier: &str) -> &str {
    let mut parts = specifier.splitn(3, '/');
    match (parts.next(), parts.next()) {
        (Some(scope), Some(name)) if scope.starts_with('@') => {
            &specifier[..scope.len() + 1 + name.len()]
        }
        (Some(name), _) => name,
        _ => specifier,
    }
}

fn source_files(root: &Path) -> Vec<std::path::PathBuf> {
    const EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx"];
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    let mut depth_guard = 0;
    while let Some(dir) = stack.pop() {
        depth_guard += 1;
        if depth_guard > 256 {
            break;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if dir != *root || name == "src" {
                    // Only descend below the root via src/ to avoid
                    // node_modules and build output.
                    if !name.starts_with('.') && name != "node_modules" {
                        stack.push(path);
                    }
                }
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXTENSIONS.contains(&e))
            {
                files.push(path);
            }
        }
    }
    files.sort();
    files.dedup();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    fn read(root: &Path, rel: &str) -> String {
        std::fs::read_to_string(root.join(rel)).unwrap()
    }

    const BARE_CONFIG: &str = "import { defineConfig } from 'vite'\n\
import react from '@vitejs/plugin-react'\n\
\n\
export default defineConfig({\n\
  plugins: [react()],\n\
})\n";

    #[test]
    fn needs_fix_when_base_or_legacy_missing() {
        assert!(needs_vite_fix(BARE_CONFIG));
        assert!(needs_vite_fix("export default defineConfig({ base: './' })"));
        let fixed = "import legacy from '@vitejs/plugin-legacy'\n\
export default defineConfig({ base: './', plugins: [legacy()] })";
        assert!(!needs_vite_fix(fixed));
    }

    #[test]
    fn base_detection_ignores_lookalike_keys() {
        assert!(needs_vite_fix(
            "export default defineConfig({ database: 'x' })"
        ));
    }

    #[test]
    fn repair_injects_base_and_legacy_plugin() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "vite.config.js", BARE_CONFIG);
        write(dir.path(), "package.json", r#"{"dependencies": {}}"#);

        let report = repair_vite_project(dir.path()).unwrap();
        assert!(!report.is_empty());

        let config = read(dir.path(), "vite.config.js");
        assert!(config.contains("base: './'"));
        assert!(config.contains("import legacy from '@vitejs/plugin-legacy'"));
        assert!(config.contains("chrome >= 52"));
        assert!(config.contains("regenerator-runtime/runtime"));
        assert!(!needs_vite_fix(&config));

        let manifest = read(dir.path(), "package.json");
        assert!(manifest.contains("@vitejs/plugin-legacy"));
        assert!(manifest.contains("terser"));
    }

    #[test]
    fn repair_is_a_no_op_when_already_satisfied() {
        let dir = tempfile::tempdir().unwrap();
        let fixed = "import legacy from '@vitejs/plugin-legacy'\n\
export default defineConfig({\n  base: './',\n  plugins: [legacy()],\n})\n";
        write(dir.path(), "vite.config.js", fixed);
        write(
            dir.path(),
            "package.json",
            r#"{"devDependencies": {"@vitejs/plugin-legacy": "^5.0.0", "terser": "^5.0.0"}}"#,
        );

        let report = repair_vite_project(dir.path()).unwrap();
        assert!(report.is_empty(), "unexpected changes: {:?}", report.changes);
        assert_eq!(read(dir.path(), "vite.config.js"), fixed);
    }

    #[test]
    fn repair_creates_missing_entry_css() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "vite.config.js", BARE_CONFIG);
        write(dir.path(), "package.json", "{}");
        write(
            dir.path(),
            "index.html",
            r#"<html><head><link rel="stylesheet" href="/src/index.css"></head></html>"#,
        );

        repair_vite_project(dir.path()).unwrap();

        let css = read(dir.path(), "src/index.css");
        assert!(css.contains("height: 100%"));
        assert!(!css.contains("@tailwind"));
    }

    #[test]
    fn repair_scaffolds_tailwind_when_classes_are_used() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "vite.config.js", BARE_CONFIG);
        write(dir.path(), "package.json", "{}");
        write(
            dir.path(),
            "index.html",
            r#"<link rel="stylesheet" href="/src/index.css">"#,
        );
        write(
            dir.path(),
            "src/App.jsx",
            r#"export default () => <div className="flex px-4 bg-white">hi</div>;"#,
        );

        repair_vite_project(dir.path()).unwrap();

        assert!(dir.path().join("tailwind.config.js").is_file());
        assert!(dir.path().join("postcss.config.js").is_file());
        let css = read(dir.path(), "src/index.css");
        assert!(css.starts_with("@tailwind base;"));
        let manifest = read(dir.path(), "package.json");
        assert!(manifest.contains("tailwindcss"));
    }

    #[test]
    fn repair_adds_implicit_peer_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "vite.config.js", BARE_CONFIG);
        write(
            dir.path(),
            "package.json",
            r#"{"dependencies": {"recharts": "^2.12.0"}}"#,
        );

        let report = repair_vite_project(dir.path()).unwrap();

        let manifest: Value = serde_json::from_str(&read(dir.path(), "package.json")).unwrap();
        assert!(manifest["dependencies"]["react-is"].is_string());
        assert!(report.changes.iter().any(|c| c.contains("react-is")));
    }

    #[test]
    fn repair_adds_watched_bare_imports() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "vite.config.js", BARE_CONFIG);
        write(dir.path(), "package.json", r#"{"dependencies": {}}"#);
        write(
            dir.path(),
            "src/util.ts",
            "import clsx from 'clsx'\nimport fs from 'node:fs'\nimport local from './local'\n",
        );

        repair_vite_project(dir.path()).unwrap();

        let manifest: Value = serde_json::from_str(&read(dir.path(), "package.json")).unwrap();
        assert!(manifest["dependencies"]["clsx"].is_string());
        assert!(manifest["dependencies"].get("fs").is_none());
        assert!(manifest["dependencies"].get("./local").is_none());
    }

    #[test]
    fn package_base_names_handle_scopes_and_subpaths() {
        assert_eq!(package_base_name("react-dom/client"), "react-dom");
        assert_eq!(package_base_name("@scope/pkg/sub"), "@scope/pkg");
        assert_eq!(package_base_name("plain"), "plain");
    }
}
