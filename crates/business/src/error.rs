//! Business layer errors
//!
//! Every failure a caller can act on has its own kind, with the numeric
//! context (requested, available, currency) attached.

use monetary_core::{CoreError, OrderStatus};
use monetary_epay::EpayError;
use monetary_persistence::PersistenceError;
use thiserror::Error;

/// Business operation errors
#[derive(Debug, Error)]
pub enum BusinessError {
    // === Validation errors ===
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Amount {amount_minor} fen outside product range [{min_minor}, {}]", .max_minor.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string()))]
    AmountOutOfRange {
        amount_minor: i64,
        min_minor: i64,
        max_minor: Option<i64>,
    },

    // === Ledger errors ===
    #[error("Insufficient balance: requested {requested}, available {available} {currency}")]
    InsufficientBalance {
        requested: i64,
        available: i64,
        currency: String,
    },

    #[error("No {currency} balance record for {account}")]
    RecordNotFound { account: String, currency: String },

    #[error("Cannot transfer to self: {0}")]
    SelfTransfer(String),

    #[error("Balance overflow on {key}/{currency}")]
    BalanceOverflow { key: String, currency: String },

    // === Identity errors ===
    #[error("Failed to provision account for {identifier}: {reason}")]
    ProvisioningFailed { identifier: String, reason: String },

    // === Payment errors ===
    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Trade not successful: {0}")]
    TradeNotSuccessful(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Order {out_trade_no} is already {status}")]
    OrderAlreadyTerminal {
        out_trade_no: String,
        status: OrderStatus,
    },

    // === Admin errors ===
    #[error("Admin console is disabled")]
    AdminDisabled,

    #[error("Unauthorized")]
    Unauthorized,

    // === Infrastructure ===
    #[error("Store operation timed out: {0}")]
    Timeout(String),

    #[error("Persistence error: {0}")]
    Persistence(PersistenceError),

    #[error("Gateway error: {0}")]
    Epay(#[from] EpayError),

    #[error("Core error: {0}")]
    Core(CoreError),
}

/// Result type alias for business operations
pub type BusinessResult<T> = Result<T, BusinessError>;

impl From<PersistenceError> for BusinessError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Overflow { key, currency } => Self::BalanceOverflow { key, currency },
            PersistenceError::Timeout(op) => Self::Timeout(op),
            other => Self::Persistence(other),
        }
    }
}

impl From<CoreError> for BusinessError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidAmount(msg) => Self::InvalidAmount(msg),
            CoreError::AmountOutOfRange {
                amount_minor,
                min_minor,
                max_minor,
            } => Self::AmountOutOfRange {
                amount_minor,
                min_minor,
                max_minor,
            },
            other => Self::Core(other),
        }
    }
}

impl BusinessError {
    /// Create insufficient balance error
    pub fn insufficient_balance(requested: i64, available: i64, currency: &str) -> Self {
        Self::InsufficientBalance {
            requested,
            available,
            currency: currency.to_string(),
        }
    }

    pub fn record_not_found(account: impl ToString, currency: &str) -> Self {
        Self::RecordNotFound {
            account: account.to_string(),
            currency: currency.to_string(),
        }
    }

    /// Timeouts and connection-level storage failures; safe to retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Persistence(e) => e.is_transient(),
            _ => false,
        }
    }

    pub fn is_insufficient_balance(&self) -> bool {
        matches!(self, Self::InsufficientBalance { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_balance_error() {
        let err = BusinessError::insufficient_balance(100, 50, "gold");
        assert!(err.to_string().contains("requested 100"));
        assert!(err.to_string().contains("available 50 gold"));
        assert!(err.is_insufficient_balance());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_persistence_mapping() {
        let overflow: BusinessError = PersistenceError::overflow("alice", "default").into();
        assert!(matches!(overflow, BusinessError::BalanceOverflow { .. }));

        let timeout: BusinessError = PersistenceError::Timeout("debit".to_string()).into();
        assert!(timeout.is_transient());

        let missing: BusinessError = PersistenceError::not_found("Order", "NL1").into();
        assert!(!missing.is_transient());
    }

    #[test]
    fn test_core_mapping() {
        let err: BusinessError = CoreError::InvalidAmount("x".to_string()).into();
        assert!(matches!(err, BusinessError::InvalidAmount(_)));

        let err: BusinessError = CoreError::AmountOutOfRange {
            amount_minor: 50,
            min_minor: 100,
            max_minor: None,
        }
        .into();
        assert!(err.to_string().contains("[100, -]"));
    }
}
