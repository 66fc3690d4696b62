//! Domain errors.
//!
//! Handlers wrap these in [`crate::AppError`]; the HTTP status is picked by
//! downcasting back to [`Error`].

use thiserror::Error;

use crate::narration::SpeechError;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed user input, shown inline next to the form
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Credentials were checked and rejected
    #[error("{0}")]
    Unauthorized(String),

    /// Object store failures (upload, delete, bad paths)
    #[error("storage error: {0}")]
    Storage(String),

    #[error("password hashing error: {0}")]
    PasswordHash(String),

    #[error("speech device error: {0}")]
    Speech(#[from] SpeechError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
