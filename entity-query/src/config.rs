use std::time::Duration;

use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where the panel API lives and how to talk to it.
///
/// Every field has a default, so partial configs deserialize:
///
/// ```
/// use entity_query::ApiConfig;
///
/// let config: ApiConfig = serde_json::from_str(r#"{"base_url": "https://panel.example/api/"}"#).unwrap();
/// assert_eq!(config.base_url, "https://panel.example/api/");
/// assert_eq!(config.timeout_secs, 30);
/// assert!(config.token.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Sent as a bearer token when present.
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
