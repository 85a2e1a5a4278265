//! Error types for jukebox-ap
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation.

use thiserror::Error;

/// Main error type for the jukebox-ap module
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Transition oracle / backend request errors
    #[error("Oracle request failed: {0}")]
    Oracle(#[from] reqwest::Error),

    /// Audio output or channel errors
    #[error("Audio channel error: {0}")]
    Channel(String),

    /// Playback engine errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the jukebox-ap Error
pub type Result<T> = std::result::Result<T, Error>;
