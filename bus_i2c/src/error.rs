//! Errors outside the HAL taxonomy
//!
//! Bus operations fail with [`hal::HalError`]. Configuration loading and the
//! diagnostic command parser have their own failure modes.

use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid I2C config: {0}")]
    Parse(String),

    #[error("timeout budget must be non-zero")]
    ZeroTimeout,

    #[error("base address {0:#x} is not 4-byte aligned")]
    UnalignedBase(usize),
}

/// Diagnostic command errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiagError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("report serialization failed: {0}")]
    Serialize(String),
}
