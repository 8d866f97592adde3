//! Error types for the catchment toolkit
//!
//! One error enum shared by the engine and the command-line front end. Geometry
//! failures have their own typed error in the engine; everything that crosses an
//! I/O boundary ends up here.

use std::fmt;

/// Main error type for catchment operations
#[derive(Debug)]
pub enum Error {
    /// Invalid configuration or parameters
    InvalidInput(String),

    /// A record was readable JSON but does not carry what the stage needs
    InvalidRecord(String),

    /// HTTP-specific error (non-success status, unreadable body)
    HttpError(String),

    /// Network connectivity issues
    NetworkError(String),

    /// The routing provider answered, but not with a usable result
    RoutingError(String),

    /// File or stream I/O error
    IoError(std::io::Error),

    /// JSON (de)serialization error
    JsonError(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidInput(msg) => {
                write!(f, "Invalid input: {msg}")
            }
            Error::InvalidRecord(msg) => {
                write!(f, "Invalid record: {msg}")
            }
            Error::HttpError(msg) => {
                write!(f, "HTTP error: {msg}")
            }
            Error::NetworkError(msg) => {
                write!(f, "Network error: {msg}")
            }
            Error::RoutingError(msg) => {
                write!(f, "Routing error: {msg}")
            }
            Error::IoError(err) => {
                write!(f, "I/O error: {err}")
            }
            Error::JsonError(err) => {
                write!(f, "JSON error: {err}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            Error::JsonError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(err)
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Error::NetworkError(err.to_string())
        } else {
            Error::HttpError(err.to_string())
        }
    }
}

/// Convenience result type for catchment operations
pub type Result<T> = std::result::Result<T, Error>;
