//! HTML inspection and rewriting.
//!
//! Two transforms live here: the offlineify rewrite that removes network
//! dependencies from a standalone HTML document, and the shell patch that
//! prepares a document for the mobile-app shell's webview. Both are pure
//! string transforms; fetching the vendor files and compiling the extracted
//! script are the worker's job.

use std::sync::LazyLock;

use regex::Regex;

/// CDN hostnames that trigger the offlineify sub-pipeline.
pub const CDN_HOSTS: &[&str] = &[
    "unpkg.com",
    "cdn.jsdelivr.net",
    "cdnjs.cloudflare.com",
    "cdn.tailwindcss.com",
    "fonts.googleapis.com",
];

/// A vendor file that must be fetched for offline use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorAsset {
    /// File name under the output `vendor/` directory.
    pub file: &'static str,
    /// Source URL to fetch from.
    pub url: &'static str,
}

pub const REACT_ASSET: VendorAsset = VendorAsset {
    file: "react.production.min.js",
    url: "https://unpkg.com/react@18/umd/react.production.min.js",
};

pub const REACT_DOM_ASSET: VendorAsset = VendorAsset {
    file: "react-dom.production.min.js",
    url: "https://unpkg.com/react-dom@18/umd/react-dom.production.min.js",
};

/// Name of the compiled entry script written next to the rewritten HTML.
pub const APP_JS_FILE: &str = "app.js";

/// Name of the generated Tailwind stylesheet under `vendor/`.
pub const TAILWIND_CSS_FILE: &str = "tailwind.min.css";

static SCRIPT_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]*\bsrc\s*=\s*["']([^"']+)["'][^>]*>\s*</script>"#)
        .expect("script src regex")
});

static LINK_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<link[^>]*\bhref\s*=\s*["']([^"']+)["'][^>]*/?>"#).expect("link href regex")
});

static BABEL_SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]*\btype\s*=\s*["']text/babel["'][^>]*>(.*?)</script>"#)
        .expect("babel script regex")
});

static FONT_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)@import\s+url\(\s*['"]?[^)'"]*fonts\.googleapis\.com[^)'"]*['"]?\s*\)\s*;?"#)
        .expect("font import regex")
});

/// Whether a document needs the offlineify sub-pipeline before packaging.
///
/// True iff the content references a known CDN host, contains a
/// browser-compiled Babel script tag, or imports a Google Font.
pub fn needs_offlineify(html: &str) -> bool {
    if CDN_HOSTS.iter().any(|host| html.contains(host)) {
        return true;
    }
    if html.contains("text/babel") {
        return true;
    }
    FONT_IMPORT_RE.is_match(html)
}

/// Result of the offline rewrite.
#[derive(Debug)]
pub struct OfflineRewrite {
    /// The rewritten document.
    pub html: String,
    /// Source of the first `text/babel` block, if one was extracted. The
    /// caller compiles it and writes the output as [`APP_JS_FILE`].
    pub babel_source: Option<String>,
    /// Vendor files the caller must fetch into `vendor/`.
    pub assets: Vec<VendorAsset>,
    /// Whether a Tailwind CDN reference was replaced; the caller must
    /// generate [`TAILWIND_CSS_FILE`] with the Tailwind CLI.
    pub needs_tailwind: bool,
}

/// Apply the fixed CDN rewrite table and extract the Babel entry script.
///
/// Known CDN script tags become local `./vendor/` references, the Babel
/// standalone runtime is dropped, the `text/babel` block is replaced by a
/// plain `./app.js` script tag, and Google Fonts imports are removed.
pub fn rewrite_for_offline(html: &str) -> OfflineRewrite {
    let mut assets = Vec::new();
    let mut needs_tailwind = false;

    // Extract the first text/babel block before touching script tags.
    let mut babel_source = None;
    let rewritten = BABEL_SCRIPT_RE
        .replace(html, |caps: &regex::Captures<'_>| {
            babel_source = Some(caps[1].to_string());
            format!(r#"<script src="./{APP_JS_FILE}"></script>"#)
        })
        .into_owned();

    let rewritten = SCRIPT_SRC_RE
        .replace_all(&rewritten, |caps: &regex::Captures<'_>| {
            let src = &caps[1];
            if src.contains("react-dom") && src.contains("unpkg.com") {
                if !assets.contains(&REACT_DOM_ASSET) {
                    assets.push(REACT_DOM_ASSET);
                }
                format!(r#"<script src="./vendor/{}"></script>"#, REACT_DOM_ASSET.file)
            } else if src.contains("unpkg.com/react") {
                if !assets.contains(&REACT_ASSET) {
                    assets.push(REACT_ASSET);
                }
                format!(r#"<script src="./vendor/{}"></script>"#, REACT_ASSET.file)
            } else if src.contains("@babel/standalone") || src.contains("babel.min.js") {
                // The runtime compiler is pointless once app.js is precompiled.
                String::new()
            } else if src.contains("cdn.tailwindcss.com") {
                needs_tailwind = true;
                format!(r#"<link rel="stylesheet" href="./vendor/{TAILWIND_CSS_FILE}">"#)
            } else {
                caps[0].to_string()
            }
        })
        .into_owned();

    let rewritten = LINK_HREF_RE
        .replace_all(&rewritten, |caps: &regex::Captures<'_>| {
            if caps[1].contains("fonts.googleapis.com") || caps[1].contains("fonts.gstatic.com") {
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned();

    let rewritten = FONT_IMPORT_RE.replace_all(&rewritten, "").into_owned();

    OfflineRewrite {
        html: rewritten,
        babel_source,
        assets,
        needs_tailwind,
    }
}

/// Viewport meta inserted into shell documents.
const VIEWPORT_META: &str = r#"<meta name="viewport" content="width=device-width, initial-scale=1.0, maximum-scale=1.0, user-scalable=no, viewport-fit=cover">"#;

/// Content-Security-Policy meta permissive enough for the shell webview.
const CSP_META: &str = r#"<meta http-equiv="Content-Security-Policy" content="default-src * 'self' 'unsafe-inline' 'unsafe-eval' data: gap: content:">"#;

/// Script tag wiring the document to the shell runtime.
const CORDOVA_SCRIPT: &str = r#"<script src="cordova.js"></script>"#;

/// Patch a document for the mobile-app shell webview.
///
/// Inserts a viewport meta, a permissive CSP meta, and the `cordova.js`
/// script tag, each only if absent. Applying the patch twice yields the
/// same document as applying it once.
pub fn prepare_html_for_shell(html: &str) -> String {
    let mut out = html.to_string();

    if !contains_ci(&out, "name=\"viewport\"") && !contains_ci(&out, "name='viewport'") {
        out = insert_in_head(&out, VIEWPORT_META);
    }

    if !contains_ci(&out, "content-security-policy") {
        out = insert_in_head(&out, CSP_META);
    }

    if !out.contains("cordova.js") {
        out = insert_before_body_end(&out, CORDOVA_SCRIPT);
    }

    out
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

/// Insert `snippet` right after the opening `<head>` tag, or prepend it if
/// the document has no head element.
fn insert_in_head(html: &str, snippet: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let start = lower.find("<head>").or_else(|| lower.find("<head "));
    if let Some(start) = start {
        if let Some(close) = html[start..].find('>') {
            let at = start + close + 1;
            return format!("{}\n    {}{}", &html[..at], snippet, &html[at..]);
        }
    }
    format!("{snippet}\n{html}")
}

/// Insert `snippet` right before `</body>`, or append it if the document
/// has no closing body tag.
fn insert_before_body_end(html: &str, snippet: &str) -> String {
    let lower = html.to_ascii_lowercase();
    if let Some(at) = lower.rfind("</body>") {
        format!("{}    {}\n{}", &html[..at], snippet, &html[at..])
    } else {
        format!("{html}\n{snippet}\n")
    }
}
