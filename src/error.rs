use std::path::PathBuf;

use thiserror::Error;

use crate::isbn::IsbnError;

/// Custom error type for library and persistence operations
#[derive(Debug, Error)]
pub enum LibraryError {
    /// Text could not be turned into an ISBN
    #[error(transparent)]
    Isbn(#[from] IsbnError),
    /// No book with this ISBN is in the library
    #[error("no book with ISBN {0} in the library")]
    BookNotFound(String),
    /// The user is not one of the configured readers
    #[error("unknown user {0}")]
    UnknownUser(String),
    /// Error occurred while saving state
    #[error("persistence error: {0}")]
    PersistenceError(String),
    /// Error occurred while loading state
    #[error("load error: {0}")]
    LoadError(String),
}

/// Errors raised while reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// The config file is not valid TOML for [`crate::config::Config`]
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that failed
        path: PathBuf,
        /// Underlying TOML error
        source: toml::de::Error,
    },
    /// The merged configuration is unusable
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
