use thiserror::Error;

/// Central error type for companion client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("no matching plan")]
    NoMatchingPlan,

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Browser session error: {0}")]
    BrowserSession(String),

    #[error("checkout already in progress")]
    AlreadyInProgress,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ClientError {
    /// True for failures of the HTTP round-trip itself (transport or non-2xx).
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network(_) | ClientError::Api { .. })
    }
}

/// Convenience type alias for client results.
pub type ClientResult<T> = Result<T, ClientError>;
