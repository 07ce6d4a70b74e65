//! Error types for imprint-citations
//!
//! None of these reach the citation UI: providers absorb load failures and
//! surface them through `warning_message()` instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::http::HttpError;

/// Result type alias for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Failure while loading data for a bibliography provider
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Reading a bibliography file failed
    #[error("IO error reading {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// Remote service request failed
    #[error("HTTP error: {0}")]
    Http(HttpError),

    /// Bibliography content could not be read
    #[error("Could not parse {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// Remote service asked us to slow down
    #[error("Rate limited")]
    RateLimited,

    /// Provider is not configured or its service is unreachable
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl From<HttpError> for ProviderError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::RateLimited => ProviderError::RateLimited,
            other => ProviderError::Http(other),
        }
    }
}

impl ProviderError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        ProviderError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn parse(source_name: impl Into<String>, message: impl ToString) -> Self {
        ProviderError::Parse {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }
}

/// Configuration loading or validation error
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
