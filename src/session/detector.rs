use crate::config::SessionConfig;

/// Recognizes login pages served in place of catalog content
///
/// This is a literal substring match: any one marker is conclusive. A data
/// page whose markup happens to contain no marker while the session is gone
/// (a false negative) is accepted; it is parsed as an empty page instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginDetector {
    markers: Vec<String>,
}

impl LoginDetector {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.login_markers.clone())
    }

    pub fn is_login_page(&self, content: &str) -> bool {
        self.markers
            .iter()
            .any(|marker| content.contains(marker.as_str()))
    }

    /// The first marker found in the content, for logging
    pub fn matching_marker(&self, content: &str) -> Option<&str> {
        self.markers
            .iter()
            .find(|marker| content.contains(marker.as_str()))
            .map(String::as_str)
    }
}

impl Default for LoginDetector {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}
