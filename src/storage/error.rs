//! The host storage backend's own failure type.
//!
//! Kept distinct from [`crate::error::EngineError`] so a `Store`
//! implementation other than [`super::SledStore`] doesn't need to know
//! about the engine's error taxonomy — `EngineError` wraps this via
//! `#[from]`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}
