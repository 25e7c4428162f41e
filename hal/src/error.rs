//! Error taxonomy shared by every layer of the core

use thiserror::Error;

/// Errors surfaced by the interrupt table, the device layer and bus engines
///
/// None of these are fatal. A failed operation always returns control to
/// the caller with the hardware left in a known state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HalError {
    /// A polled condition never became true within its iteration budget
    #[error("operation timed out")]
    Timeout,

    /// The resource already has an operation in flight
    #[error("resource busy")]
    Busy,

    /// The capability is absent or the command is not recognized
    #[error("operation not supported")]
    Unsupported,

    /// A line, address or slot index outside its valid domain
    #[error("value out of range: {0}")]
    OutOfRange(usize),

    /// Retries exhausted or a generic transaction failure
    #[error("operation failed")]
    Failed,
}

/// Convenience alias used across the core
pub type HalResult<T> = Result<T, HalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(HalError::Timeout.to_string(), "operation timed out");
        assert_eq!(
            HalError::OutOfRange(300).to_string(),
            "value out of range: 300"
        );
    }
}
