//! Error types for the embedding capability.

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error conditions raised while generating embeddings.
///
/// Transient failures (connection problems, timeouts, overloaded servers)
/// are distinguished from permanent ones so the indexing engine can retry
/// the former with bounded backoff and give up immediately on the latter.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The provider configuration is invalid or incomplete.
    #[error("invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// The provider returned a non-success status.
    #[error("embedding provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    /// The request could not be completed at the transport level.
    #[error("embedding request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    /// The provider answered, but not in the shape we expect.
    #[error("malformed embedding response: {message}")]
    MalformedResponse { message: String },
}

impl EmbedError {
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Whether retrying the same call can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { source } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            Self::Provider { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidConfig { .. } | Self::MalformedResponse { .. } => false,
        }
    }
}
