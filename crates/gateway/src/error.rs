use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("session store: {0}")]
    Session(#[from] airbot_sessions::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
