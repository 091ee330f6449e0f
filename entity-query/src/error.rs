use thiserror::Error;

/// Why fetching a page of entities failed.
///
/// `Clone` so that a failed outcome can sit inside a reactive resource like any other value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request never produced a response: connection refused, timeout, DNS...
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The remote answered with a non-success status.
    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The body was not the expected `{items, pages}` shape.
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            FetchError::Malformed(error.to_string())
        } else if let Some(status) = error.status() {
            FetchError::Status {
                status: status.as_u16(),
                body: error.to_string(),
            }
        } else {
            FetchError::Transport(error.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(error: serde_json::Error) -> Self {
        FetchError::Malformed(error.to_string())
    }
}
