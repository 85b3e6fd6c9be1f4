//! # Balance Module
//!
//! Định nghĩa BalanceRecord - một dòng `(identifier_key, currency) -> value`
//! trong ledger, cùng các kết quả của thao tác debit/transfer nguyên tử.

use crate::identity::AccountId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tên currency mặc định khi caller không chỉ định.
pub const DEFAULT_CURRENCY: &str = "default";

/// Một balance record trong ledger.
///
/// - `identifier_key`: legacy primary key (một identifier variant)
/// - `account_id`: back-reference tới canonical account, có thể null với
///   các record cũ tạo trước khi có identity linkage
/// - `value`: luôn >= 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub identifier_key: String,
    pub account_id: Option<AccountId>,
    pub currency: String,
    pub value: i64,
}

impl BalanceRecord {
    pub fn new(identifier_key: &str, account_id: Option<AccountId>, currency: &str, value: i64) -> Self {
        Self {
            identifier_key: identifier_key.to_string(),
            account_id,
            currency: currency.to_string(),
            value,
        }
    }

    /// Record cũ chưa có account_id
    pub fn is_unlinked(&self) -> bool {
        self.account_id.is_none()
    }

    /// Gắn account_id (bản sao, không ghi xuống store)
    pub fn with_account(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }
}

impl fmt::Display for BalanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.account_id {
            Some(id) => write!(f, "{} (#{}) {} {}", self.identifier_key, id, self.value, self.currency),
            None => write!(f, "{} {} {}", self.identifier_key, self.value, self.currency),
        }
    }
}

/// Nơi ghi một khoản credit: key của record, và account_id để gắn vào
/// record nếu record chưa có.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditTarget {
    pub identifier_key: String,
    pub account_id: Option<AccountId>,
}

impl CreditTarget {
    pub fn new(identifier_key: &str, account_id: Option<AccountId>) -> Self {
        Self {
            identifier_key: identifier_key.to_string(),
            account_id,
        }
    }
}

/// Kết quả debit có điều kiện (check + trừ trong một đơn vị nguyên tử).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited { remaining: i64 },
    Missing,
    Insufficient { available: i64 },
}

/// Kết quả transfer trong một transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed { from_remaining: i64, to_balance: i64 },
    SourceMissing,
    Insufficient { available: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_linkage() {
        let record = BalanceRecord::new("onebot:1", None, DEFAULT_CURRENCY, 10);
        assert!(record.is_unlinked());

        let linked = record.with_account(AccountId(9));
        assert!(!linked.is_unlinked());
        assert_eq!(linked.account_id, Some(AccountId(9)));
    }

    #[test]
    fn test_record_display() {
        let record = BalanceRecord::new("alice", Some(AccountId(2)), "gold", 50);
        assert_eq!(record.to_string(), "alice (#2) 50 gold");
    }
}
