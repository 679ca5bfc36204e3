// src/error.rs

//! Unified error handling for the scanner.

use std::fmt;

use thiserror::Error;

/// Result type alias for scanner operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A listing page could not be fetched or understood
    #[error("Fetch error for {entity}: {message}")]
    Fetch { entity: String, message: String },

    /// Cancellation was observed while a pass was running
    #[error("Cancelled")]
    Cancelled,
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fetch error with entity context.
    pub fn fetch(entity: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            entity: entity.into(),
            message: message.to_string(),
        }
    }

    /// Whether another attempt at the same pass could succeed.
    ///
    /// Network, I/O and fetch failures are transient. Bad configuration, bad
    /// selectors and malformed data fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(_) | Self::Http(_) | Self::Fetch { .. } => true,
            Self::Json(_)
            | Self::Toml(_)
            | Self::Url(_)
            | Self::Selector { .. }
            | Self::Config(_)
            | Self::Validation(_)
            | Self::Cancelled => false,
        }
    }
}
