//! # Identity Module
//!
//! Định nghĩa AccountId, AccountRef và Binding - các cách tham chiếu tới
//! một người dùng trên nhiều platform khác nhau.
//!
//! Một người dùng có thể xuất hiện dưới nhiều dạng identifier:
//! - `123456` (raw platform id)
//! - `onebot:123456` (có prefix platform)
//! - canonical `AccountId` trong directory

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical numeric account id, owned by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl AccountId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for AccountId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tham chiếu tới một account tại API boundary.
///
/// Mọi public operation của ledger nhận `AccountRef`; việc resolve sang
/// `AccountId` chỉ diễn ra một lần tại boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum AccountRef {
    /// Canonical account id từ directory
    Canonical(AccountId),
    /// External identifier variant (có thể có prefix `platform:`)
    External(String),
}

impl AccountRef {
    pub fn canonical(id: impl Into<AccountId>) -> Self {
        Self::Canonical(id.into())
    }

    pub fn external(identifier: impl Into<String>) -> Self {
        Self::External(identifier.into())
    }
}

impl From<AccountId> for AccountRef {
    fn from(id: AccountId) -> Self {
        Self::Canonical(id)
    }
}

impl From<&str> for AccountRef {
    fn from(identifier: &str) -> Self {
        Self::External(identifier.to_string())
    }
}

impl From<String> for AccountRef {
    fn from(identifier: String) -> Self {
        Self::External(identifier)
    }
}

/// Parse từ CLI: `#123` là canonical id, còn lại là external identifier.
impl FromStr for AccountRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CoreError::InvalidAccountRef(s.to_string()));
        }
        match s.strip_prefix('#') {
            Some(digits) => digits
                .parse::<i64>()
                .map(|id| AccountRef::Canonical(AccountId(id)))
                .map_err(|_| CoreError::InvalidAccountRef(s.to_string())),
            None => Ok(AccountRef::External(s.to_string())),
        }
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRef::Canonical(id) => write!(f, "#{}", id),
            AccountRef::External(identifier) => write!(f, "{}", identifier),
        }
    }
}

/// Một dòng trong binding table: identifier variant gắn với account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub identifier: String,
    pub platform: String,
    pub account_id: AccountId,
}

impl Binding {
    pub fn new(identifier: &str, platform: &str, account_id: AccountId) -> Self {
        Self {
            identifier: identifier.to_string(),
            platform: platform.to_string(),
            account_id,
        }
    }
}

/// Bỏ prefix `platform:` (tính tới dấu `:` cuối cùng).
pub fn extract_bare_id(identifier: &str) -> &str {
    match identifier.rfind(':') {
        Some(idx) => &identifier[idx + 1..],
        None => identifier,
    }
}

/// Danh sách identifier variants để dò balance record của một account.
///
/// Thứ tự xác định: với mỗi binding theo thứ tự truyền vào, thử raw id,
/// bare id, rồi `platform:bareId`. Bỏ trùng lặp, giữ lần xuất hiện đầu.
pub fn candidate_keys(bindings: &[Binding]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(bindings.len() * 3);
    let mut push = |key: String| {
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
        }
    };

    for binding in bindings {
        let bare = extract_bare_id(&binding.identifier);
        push(binding.identifier.clone());
        push(bare.to_string());
        if !binding.platform.is_empty() {
            push(format!("{}:{}", binding.platform, bare));
        }
    }

    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bare_id() {
        assert_eq!(extract_bare_id("onebot:123456"), "123456");
        assert_eq!(extract_bare_id("123456"), "123456");
        assert_eq!(extract_bare_id("a:b:c"), "c");
        assert_eq!(extract_bare_id("trailing:"), "");
        assert_eq!(extract_bare_id(""), "");
    }

    #[test]
    fn test_account_ref_parse() {
        assert_eq!(
            "#42".parse::<AccountRef>().unwrap(),
            AccountRef::Canonical(AccountId(42))
        );
        assert_eq!(
            "onebot:42".parse::<AccountRef>().unwrap(),
            AccountRef::External("onebot:42".to_string())
        );
        assert_eq!(
            "42".parse::<AccountRef>().unwrap(),
            AccountRef::External("42".to_string())
        );
        assert!("#abc".parse::<AccountRef>().is_err());
        assert!("  ".parse::<AccountRef>().is_err());
    }

    #[test]
    fn test_account_ref_display() {
        assert_eq!(AccountRef::canonical(7).to_string(), "#7");
        assert_eq!(AccountRef::external("alice").to_string(), "alice");
    }

    #[test]
    fn test_account_ref_json() {
        let json = serde_json::to_string(&AccountRef::canonical(7)).unwrap();
        assert_eq!(json, r#"{"kind":"canonical","value":7}"#);

        let parsed: AccountRef = serde_json::from_str(r#"{"kind":"external","value":"onebot:1"}"#).unwrap();
        assert_eq!(parsed, AccountRef::external("onebot:1"));
    }

    #[test]
    fn test_candidate_keys_order_and_dedup() {
        let id = AccountId(1);
        let bindings = vec![
            Binding::new("onebot:100", "onebot", id),
            Binding::new("100", "discord", id),
        ];

        let keys = candidate_keys(&bindings);
        assert_eq!(
            keys,
            vec![
                "onebot:100".to_string(),
                "100".to_string(),
                "discord:100".to_string(),
            ]
        );
    }

    #[test]
    fn test_candidate_keys_empty_platform() {
        let bindings = vec![Binding::new("alice", "", AccountId(3))];
        assert_eq!(candidate_keys(&bindings), vec!["alice".to_string()]);
    }
}
