use std::path::PathBuf;

/// Core error type for the bot.
///
/// The adapter crate maps its protocol errors into this type so the core
/// can handle failures consistently (fatal at startup vs. degrade-and-log).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("storage unavailable: {path}: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, Error>;
