//! Error types for seal-virtual-core.
//!
//! The engine itself never fails at runtime: bad scroll input collapses to an
//! empty or degenerate range and an exhausted pool hands out `None`. Errors
//! only surface while loading and validating configuration.

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error while reading a config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML could not be parsed into a config.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// A field holds a value the engine cannot run with.
    #[error("Invalid value for '{field}': {message}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Human-readable reason.
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}
