//! Unified error types for the domain layer

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Validation failed (e.g., invalid field values)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Coordinates outside the playable world
    #[error("Coordinates ({x}, {y}, {z}) are out of world bounds")]
    OutOfBounds { x: f64, y: f64, z: f64 },

    /// Parse error (for value objects)
    #[error("Parse error: {0}")]
    Parse(String),

    /// State transition not allowed
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

impl DomainError {
    /// Creates a validation error for business rule violations.
    ///
    /// # Example
    /// ```ignore
    /// if timeout_ms == 0 {
    ///     return Err(DomainError::validation("movement timeout must be positive"));
    /// }
    /// ```
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an invalid state transition error
    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_displays_message() {
        let err = DomainError::validation("timeout must be positive");
        assert_eq!(err.to_string(), "Validation failed: timeout must be positive");
    }

    #[test]
    fn out_of_bounds_lists_coordinates() {
        let err = DomainError::OutOfBounds {
            x: 40000.0,
            y: 64.0,
            z: 0.0,
        };
        assert!(err.to_string().contains("40000"));
    }
}
