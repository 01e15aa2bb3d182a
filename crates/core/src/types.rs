use serde::{Deserialize, Serialize};

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Which build pipeline a task runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildKind {
    /// A single HTML document packaged via the mobile-app shell.
    Html,
    /// A zipped front-end project packaged via the native wrapper.
    Zip,
}

impl BuildKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildKind::Html => "html",
            BuildKind::Zip => "zip",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "html" => Some(BuildKind::Html),
            "zip" => Some(BuildKind::Zip),
            _ => None,
        }
    }

    /// Default display name when the client supplies neither a name nor a
    /// usable upload filename.
    pub fn default_app_name(self) -> &'static str {
        match self {
            BuildKind::Html => "MyVibeApp",
            BuildKind::Zip => "MyReactApp",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        assert_eq!(BuildKind::from_str("html"), Some(BuildKind::Html));
        assert_eq!(BuildKind::from_str("zip"), Some(BuildKind::Zip));
        assert_eq!(BuildKind::from_str("exe"), None);
        assert_eq!(BuildKind::Html.as_str(), "html");
        assert_eq!(BuildKind::Zip.as_str(), "zip");
    }
}
