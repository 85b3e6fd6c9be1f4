//! # Error Module
//!
//! Định nghĩa các domain errors cho Monetary sử dụng thiserror.

use thiserror::Error;

/// Core domain errors.
///
/// Lỗi validation ở tầng domain, không liên quan đến infrastructure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount {amount_minor} out of range: min {min_minor}, max {max_minor:?}")]
    AmountOutOfRange {
        amount_minor: i64,
        min_minor: i64,
        max_minor: Option<i64>,
    },

    #[error("Invalid account reference: {0:?}")]
    InvalidAccountRef(String),
}

/// Result type alias với CoreError
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::AmountOutOfRange {
            amount_minor: 50,
            min_minor: 100,
            max_minor: None,
        };
        assert_eq!(err.to_string(), "Amount 50 out of range: min 100, max None");

        let err = CoreError::InvalidAccountRef("#x".to_string());
        assert_eq!(err.to_string(), "Invalid account reference: \"#x\"");
    }
}
