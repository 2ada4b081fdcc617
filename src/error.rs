use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the Qualifire SDK.
#[derive(Debug, Error)]
pub enum Error {
    /// An evaluation request violated a construction-time invariant.
    #[error("invalid evaluation request: {0}")]
    Validation(String),

    /// Required configuration (API key) is missing.
    #[error("{0}")]
    Configuration(String),

    /// The evaluation endpoint returned a non-200 status.
    #[error("Qualifire API error: {}{}", .status, format_body(.body))]
    Api { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("failed to decode API response: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

fn format_body(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" - {body}")
    }
}
