use thiserror::Error;

/// Error taxonomy shared by the bootstrap flow, the API client and the chat
/// client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PtmsError {
    /// No connectivity, timeout, or a transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Bad credentials or an expired session.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Missing or malformed user input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The server answered but reported failure.
    #[error("Server error: {0}")]
    Server(String),

    /// Local persistence failure.
    #[error("Cache error: {0}")]
    Cache(String),
}

impl PtmsError {
    /// Whether retrying the same operation later can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PtmsError::Network(_) | PtmsError::Server(_))
    }
}

pub type PtmsResult<T> = Result<T, PtmsError>;
