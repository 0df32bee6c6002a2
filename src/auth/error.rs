use thiserror::Error;

/// Failures inside the token lifecycle.
///
/// None of these reach the poller: `AuthManager::ensure_access_token` logs
/// them and hands back `None`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization server rejected the request: {0}")]
    Rejected(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to persist tokens: {0}")]
    Persistence(String),
    #[error("device code authorization cancelled")]
    Cancelled,
    #[error("interactive sign-in required")]
    InteractionRequired,
    #[error("invalid auth configuration: {0}")]
    Configuration(String),
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Persistence(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Persistence(error.to_string())
    }
}

impl From<oauth2::url::ParseError> for AuthError {
    fn from(error: oauth2::url::ParseError) -> Self {
        Self::Configuration(error.to_string())
    }
}
