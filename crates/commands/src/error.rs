use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),

    #[error("file lock failed: {message}")]
    Lock { message: String },

    #[error("ledger file {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    #[must_use]
    pub fn lock_failed(message: impl Into<String>) -> Self {
        Self::Lock {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
