use std::error::Error as StdError;

/// Crate-wide result type for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed transport errors shared by every [`crate::Connection`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The socket is gone or was never opened.
    #[error("transport closed")]
    Closed,

    /// No response arrived in time.
    #[error("transport request timed out: {operation}")]
    Timeout { operation: String },

    /// The remote side answered with an error.
    #[error("transport request rejected: {message}")]
    Rejected { message: String },

    /// Operation is currently unavailable (not connected, not paired, ...).
    #[error("transport operation unavailable: {message}")]
    Unavailable { message: String },

    /// Wrapped source error from an external dependency.
    #[error("transport operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    #[must_use]
    pub fn rejected(message: impl std::fmt::Display) -> Self {
        Self::Rejected {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}
