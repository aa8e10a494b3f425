//! Error types for the walk tracking engine.
//!
//! ```text
//! EngineError
//! └── ConfigError       (config file loading / validation)
//!
//! PersistenceError      (record store I/O and encoding, from save calls)
//! ```
//!
//! Per-tick processing never returns these; it logs and carries on.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient `Result` alias for engine construction.
pub type EngineResult<T> = Result<T, EngineError>;

/// Top-level error for engine construction.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors while loading or validating an [`crate::config::EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read or written.
    #[error("Failed to access config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for the expected schema.
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A field holds a value outside its allowed range.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors from the durable record store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored bytes do not decode into a record.
    #[error("Corrupt record in {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_display() {
        let err = ConfigError::invalid_value("steps.window_capacity", "must be > 1");
        assert_eq!(
            err.to_string(),
            "Invalid value for `steps.window_capacity`: must be > 1"
        );
    }

    #[test]
    fn test_engine_error_wraps_config() {
        let err: EngineError = ConfigError::invalid_value("fusion.gps_weight", "not finite").into();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
