//! Shared error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("audio encoding error: {0}")]
    Audio(String),
}
