//! Error types for the chat layer.

pub type Result<T> = std::result::Result<T, ChatError>;

/// Error conditions raised while talking to a chat provider.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The provider cannot be reached or did not answer in time. Actionable
    /// and non-fatal: conversation history is intact up to the last
    /// successful turn.
    #[error("chat provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    /// The provider answered with a non-success status.
    #[error("chat provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    /// The provider answered, but not in the shape we expect.
    #[error("malformed provider response: {message}")]
    MalformedResponse { message: String },

    #[error("invalid chat configuration: {message}")]
    InvalidConfig { message: String },
}

impl ChatError {
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::ProviderUnavailable {
            message: message.into(),
        }
    }

    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Transport failures all collapse to `ProviderUnavailable`; there is
    /// nothing more specific a caller could do with them.
    pub fn from_transport(source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::unavailable(format!("request timed out: {source}"))
        } else if source.is_connect() {
            Self::unavailable(format!("connection failed: {source}"))
        } else {
            Self::unavailable(source.to_string())
        }
    }
}
