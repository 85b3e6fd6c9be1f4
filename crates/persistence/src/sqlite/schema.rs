//! Database schema definitions
//!
//! Row types cho sqlx mapping từ SQLite tables, cùng DDL tạo bảng.

use crate::error::{PersistenceError, PersistenceResult};
use chrono::{DateTime, Utc};
use monetary_core::{AccountId, BalanceRecord, Binding, OrderStatus, PaymentOrder, Product};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// DDL cho toàn bộ schema. Idempotent (`IF NOT EXISTS`).
pub const SCHEMA: &str = r#"
-- Directory: accounts
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    authority INTEGER NOT NULL DEFAULT 1,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

-- Directory: identifier variants per platform
CREATE TABLE IF NOT EXISTS bindings (
    platform TEXT NOT NULL,
    pid TEXT NOT NULL,
    aid INTEGER NOT NULL,
    PRIMARY KEY (platform, pid),
    FOREIGN KEY (aid) REFERENCES users(id)
);
CREATE INDEX IF NOT EXISTS idx_bindings_pid ON bindings(pid);
CREATE INDEX IF NOT EXISTS idx_bindings_aid ON bindings(aid);

-- Ledger: (user_id, currency) -> value, uid is the eventual back-reference
CREATE TABLE IF NOT EXISTS monetary (
    user_id TEXT NOT NULL,
    uid INTEGER,
    currency TEXT NOT NULL,
    value INTEGER NOT NULL DEFAULT 0 CHECK (value >= 0),
    PRIMARY KEY (user_id, currency)
);
CREATE INDEX IF NOT EXISTS idx_monetary_uid ON monetary(uid, currency);

-- Recharge product catalog
CREATE TABLE IF NOT EXISTS recharge_products (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    currency TEXT NOT NULL DEFAULT 'default',
    credits_per_yuan TEXT NOT NULL,
    min_amount_minor INTEGER NOT NULL DEFAULT 1,
    max_amount_minor INTEGER,
    enabled INTEGER NOT NULL DEFAULT 1,
    sort_order INTEGER NOT NULL DEFAULT 0
);

-- Payment orders
CREATE TABLE IF NOT EXISTS recharge_orders (
    out_trade_no TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    uid INTEGER,
    product_id INTEGER,
    currency TEXT NOT NULL DEFAULT 'default',
    amount_minor INTEGER NOT NULL,
    credits INTEGER NOT NULL,
    pay_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at DATETIME NOT NULL,
    updated_at DATETIME NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_recharge_orders_user ON recharge_orders(user_id);
CREATE INDEX IF NOT EXISTS idx_recharge_orders_status ON recharge_orders(status);
"#;

/// Row type cho bảng `monetary`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BalanceRow {
    pub user_id: String,
    pub uid: Option<i64>,
    pub currency: String,
    pub value: i64,
}

/// Row type cho bảng `bindings`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BindingRow {
    pub platform: String,
    pub pid: String,
    pub aid: i64,
}

/// Row type cho bảng `recharge_products`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ProductRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub currency: String,
    pub credits_per_yuan: String, // Decimal stored as TEXT
    pub min_amount_minor: i64,
    pub max_amount_minor: Option<i64>,
    pub enabled: bool,
    pub sort_order: i64,
}

/// Row type cho bảng `recharge_orders`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct OrderRow {
    pub out_trade_no: String,
    pub user_id: String,
    pub uid: Option<i64>,
    pub product_id: Option<i64>,
    pub currency: String,
    pub amount_minor: i64,
    pub credits: i64,
    pub pay_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// === Conversion implementations ===

impl From<BalanceRow> for BalanceRecord {
    fn from(row: BalanceRow) -> Self {
        BalanceRecord::new(&row.user_id, row.uid.map(AccountId), &row.currency, row.value)
    }
}

impl From<BindingRow> for Binding {
    fn from(row: BindingRow) -> Self {
        Binding::new(&row.pid, &row.platform, AccountId(row.aid))
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = PersistenceError;

    fn try_from(row: ProductRow) -> PersistenceResult<Self> {
        let credits_per_yuan = Decimal::from_str(&row.credits_per_yuan)
            .map_err(|e| PersistenceError::InvalidDecimal(format!("{}: {}", row.credits_per_yuan, e)))?;

        Ok(Product {
            id: row.id,
            name: row.name,
            description: row.description,
            currency: row.currency,
            credits_per_yuan,
            min_amount_minor: row.min_amount_minor,
            max_amount_minor: row.max_amount_minor,
            enabled: row.enabled,
            sort_order: row.sort_order,
        })
    }
}

impl TryFrom<OrderRow> for PaymentOrder {
    type Error = PersistenceError;

    fn try_from(row: OrderRow) -> PersistenceResult<Self> {
        let status = OrderStatus::from_str(&row.status).ok_or_else(|| PersistenceError::InvalidEnumValue {
            field: "status".to_string(),
            value: row.status.clone(),
        })?;

        Ok(PaymentOrder {
            out_trade_no: row.out_trade_no,
            identifier_key: row.user_id,
            account_id: row.uid.map(AccountId),
            product_id: row.product_id,
            currency: row.currency,
            amount_minor: row.amount_minor,
            credits: row.credits,
            pay_type: row.pay_type,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_row_rejects_unknown_status() {
        let now = Utc::now();
        let row = OrderRow {
            out_trade_no: "NL1".to_string(),
            user_id: "alice".to_string(),
            uid: None,
            product_id: None,
            currency: "default".to_string(),
            amount_minor: 100,
            credits: 10,
            pay_type: "alipay".to_string(),
            status: "refunded".to_string(),
            created_at: now,
            updated_at: now,
        };

        let err = PaymentOrder::try_from(row).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidEnumValue { .. }));
    }

    #[test]
    fn test_product_row_parses_rate() {
        let row = ProductRow {
            id: 1,
            name: "Gold".to_string(),
            description: None,
            currency: "gold".to_string(),
            credits_per_yuan: "12.5".to_string(),
            min_amount_minor: 100,
            max_amount_minor: None,
            enabled: true,
            sort_order: 0,
        };

        let product = Product::try_from(row).unwrap();
        assert_eq!(product.credits_per_yuan, dec!(12.5));
    }
}
