//! Error handling for ranking and scanning operations.
//!
//! Errors returned through this type are the ones that stop a run. Failures
//! of individual homepage fetches are not errors at all: the scanner turns
//! them into [`ScanOutcome`](crate::ScanOutcome) tags on the result.

use std::fmt;
use std::time::Duration;

/// Main error type for topsite scanning.
#[derive(Debug, Clone)]
pub enum ScanError {
    /// The ranking service rejected the credentials or the signature
    Authentication {
        message: String,
        code: Option<String>,
    },

    /// The ranking service answered with something we cannot use
    Service {
        message: String,
        status_code: Option<u16>,
    },

    /// Network-related errors (connection refused, DNS, etc.)
    NetworkError {
        message: String,
        source: Option<String>,
    },

    /// An operation took longer than allowed
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Response parsing errors
    ParseError {
        message: String,
        content: Option<String>,
    },

    /// Configuration errors (invalid settings, etc.)
    ConfigError { message: String },

    /// File I/O errors when reading config files
    FileError { path: String, message: String },

    /// Generic internal errors that don't fit other categories
    Internal { message: String },
}

impl ScanError {
    /// Create a new authentication error.
    pub fn authentication<M: Into<String>>(message: M) -> Self {
        Self::Authentication {
            message: message.into(),
            code: None,
        }
    }

    /// Create a new authentication error carrying the provider's error code.
    pub fn authentication_with_code<M: Into<String>, C: Into<String>>(message: M, code: C) -> Self {
        Self::Authentication {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    /// Create a new service error.
    pub fn service<M: Into<String>>(message: M) -> Self {
        Self::Service {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a new service error with HTTP status code.
    pub fn service_with_status<M: Into<String>>(message: M, status_code: u16) -> Self {
        Self::Service {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create a new network error.
    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new network error with source information.
    pub fn network_with_source<M: Into<String>, S: Into<String>>(message: M, source: S) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<O: Into<String>>(operation: O, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a new parse error.
    pub fn parse<M: Into<String>>(message: M) -> Self {
        Self::ParseError {
            message: message.into(),
            content: None,
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the credentials were the problem.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication { message, code } => {
                if let Some(code) = code {
                    write!(f, "Authentication error ({}): {}", code, message)
                } else {
                    write!(f, "Authentication error: {}", message)
                }
            }
            Self::Service {
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "Ranking service error (HTTP {}): {}", code, message)
                } else {
                    write!(f, "Ranking service error: {}", message)
                }
            }
            Self::NetworkError { message, source } => {
                if let Some(source) = source {
                    write!(f, "Network error: {} (source: {})", message, source)
                } else {
                    write!(f, "Network error: {}", message)
                }
            }
            Self::Timeout {
                operation,
                duration,
            } => {
                write!(f, "Timeout after {:?} during: {}", duration, operation)
            }
            Self::ParseError { message, .. } => {
                write!(f, "Parse error: {}", message)
            }
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for ScanError {}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network_with_source("Request timed out", err.to_string())
        } else if err.is_connect() {
            Self::network_with_source("Connection failed", err.to_string())
        } else if err.is_builder() {
            Self::internal(format!("Invalid HTTP request: {}", err))
        } else {
            Self::network_with_source("HTTP request failed", err.to_string())
        }
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError {
            message: format!("JSON serialization failed: {}", err),
            content: None,
        }
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}

impl From<regex::Error> for ScanError {
    fn from(err: regex::Error) -> Self {
        Self::Internal {
            message: format!("Regex error: {}", err),
        }
    }
}
