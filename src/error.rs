//! Error taxonomy for experiment read-outs
//!
//! Every failure is raised synchronously at the point of detection and is
//! never retried. Configuration-file loading wraps these in `anyhow` (see
//! [`crate::config`]); the engine itself returns [`ExperimentError`].

use thiserror::Error;

/// Errors raised by the assumption checker and the comparison engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExperimentError {
    /// Malformed static configuration (proportions, masks, options)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A computed quantity breaches an operator-set policy threshold
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// A valid-looking request combination that is not implemented
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("Column not found: {0}")]
    MissingColumn(String),

    /// Dataset does not have the shape or kind the descriptor expects
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Statistic undefined for the supplied data
    #[error("Statistics error: {0}")]
    Statistics(String),
}

impl ExperimentError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn stats(msg: impl Into<String>) -> Self {
        Self::Statistics(msg.into())
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, ExperimentError>;
