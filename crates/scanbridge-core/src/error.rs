//! Configuration errors.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The configuration file could not be read.
    #[error("failed to read configuration from {path}: {reason}")]
    ConfigRead { path: String, reason: String },

    /// The configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    ConfigParse(String),

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    ConfigValue { field: String, reason: String },
}

impl CoreError {
    /// Creates a read error.
    pub fn read(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConfigRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a value error.
    pub fn value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, CoreError>;
