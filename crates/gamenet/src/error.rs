use std::io;

use crate::config::ConfigError;
use crate::net::EncodingError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodingError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
