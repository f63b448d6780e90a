use std::time::Duration;

/// Crate-wide result type for the sidecar transport.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("sidecar unreachable on port {port} after {attempts} attempts")]
    Unreachable { port: u16, attempts: u32 },

    #[error("sidecar did not answer {operation} within {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("sidecar connection closed")]
    Closed,

    #[error("sidecar error: {message}")]
    Sidecar { message: String },
}

impl Error {
    #[must_use]
    pub fn sidecar(message: impl Into<String>) -> Self {
        Self::Sidecar {
            message: message.into(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl From<Error> for airbot_transport::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Closed => Self::Closed,
            Error::Timeout { operation, .. } => Self::timeout(operation),
            Error::Sidecar { message } => Self::rejected(message),
            Error::Json(e) => Self::SerdeJson(e),
            other => Self::external("whatsapp sidecar", other),
        }
    }
}
