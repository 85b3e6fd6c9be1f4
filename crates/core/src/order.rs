//! # Order Module
//!
//! Định nghĩa PaymentOrder và OrderStatus cho luồng thanh toán.
//! `out_trade_no` là primary key và cũng là idempotency token.

use crate::identity::AccountId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trạng thái của order.
///
/// Chỉ có hai chuyển trạng thái hợp lệ: `Pending -> Success` và
/// `Pending -> Failed`. Cả hai đều là terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Đang chờ thanh toán
    Pending,
    /// Đã thanh toán và đã credit
    Success,
    /// Thanh toán thất bại
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Success => "success",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "success" => Some(OrderStatus::Success),
            "failed" => Some(OrderStatus::Failed),
            _ => None,
        }
    }

    /// Kiểm tra chuyển trạng thái có hợp lệ không
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Success) | (OrderStatus::Pending, OrderStatus::Failed)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Một payment order.
///
/// `currency` và `credits` được chốt tại thời điểm tạo order từ product,
/// reconciliation chỉ replay lại con số này.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub out_trade_no: String,
    /// Identifier người dùng nhập khi tạo order
    pub identifier_key: String,
    pub account_id: Option<AccountId>,
    pub product_id: Option<i64>,
    pub currency: String,
    /// Số tiền theo đơn vị nhỏ nhất (fen)
    pub amount_minor: i64,
    pub credits: i64,
    pub pay_type: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentOrder {
    /// Số tiền dạng yuan (2 chữ số thập phân)
    pub fn amount(&self) -> Decimal {
        Decimal::new(self.amount_minor, 2)
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }
}

impl fmt::Display for PaymentOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Order {} ({}, {} yuan = {} {}, {})",
            self.out_trade_no,
            self.identifier_key,
            self.amount(),
            self.credits,
            self.currency,
            self.status
        )
    }
}

/// Bộ lọc cho admin listing.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    /// Exact match trên identifier_key
    pub identifier: Option<String>,
    /// Substring match trên identifier_key
    pub identifier_contains: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl OrderFilter {
    pub fn for_identifier(identifier: &str, limit: usize) -> Self {
        Self {
            identifier: Some(identifier.to_string()),
            limit: Some(limit),
            ..Default::default()
        }
    }

    /// Kiểm tra một order có khớp filter (trừ `limit`)
    pub fn matches(&self, order: &PaymentOrder) -> bool {
        if let Some(status) = self.status {
            if order.status != status {
                return false;
            }
        }
        if let Some(identifier) = &self.identifier {
            if &order.identifier_key != identifier {
                return false;
            }
        }
        if let Some(needle) = &self.identifier_contains {
            if !order.identifier_key.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.created_from {
            if order.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.created_to {
            if order.created_at > to {
                return false;
            }
        }
        true
    }
}

/// Thống kê order cho admin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub total_amount_minor: i64,
    pub total_credits: i64,
    pub success_count: usize,
    pub pending_count: usize,
    pub failed_count: usize,
}

impl OrderStats {
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a PaymentOrder>) -> Self {
        let mut stats = Self::default();
        for order in orders {
            match order.status {
                OrderStatus::Success => {
                    stats.success_count += 1;
                    stats.total_amount_minor += order.amount_minor;
                    stats.total_credits += order.credits;
                }
                OrderStatus::Pending => stats.pending_count += 1,
                OrderStatus::Failed => stats.failed_count += 1,
            }
        }
        stats
    }
}

/// Kết quả settle (CAS pending -> success + credit) trong store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Lần đầu chuyển sang success, credit đã ghi
    Settled { balance: i64 },
    /// Order không còn ở pending
    NotPending(OrderStatus),
    /// Không tìm thấy order
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn order(no: &str, user: &str, status: OrderStatus, amount_minor: i64, credits: i64) -> PaymentOrder {
        let now = Utc::now();
        PaymentOrder {
            out_trade_no: no.to_string(),
            identifier_key: user.to_string(),
            account_id: None,
            product_id: None,
            currency: "default".to_string(),
            amount_minor,
            credits,
            pay_type: "alipay".to_string(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Success));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Failed));
        assert!(!OrderStatus::Success.can_transition_to(OrderStatus::Failed));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::Success));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_status_roundtrip_str() {
        for status in [OrderStatus::Pending, OrderStatus::Success, OrderStatus::Failed] {
            assert_eq!(OrderStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::from_str("refunded"), None);
    }

    #[test]
    fn test_amount_in_yuan() {
        let o = order("NL1", "u", OrderStatus::Pending, 1050, 105);
        assert_eq!(o.amount().to_string(), "10.50");
    }

    #[test]
    fn test_filter_matches() {
        let o = order("NL1", "onebot:12345", OrderStatus::Success, 100, 10);

        assert!(OrderFilter::default().matches(&o));
        assert!(OrderFilter::for_identifier("onebot:12345", 10).matches(&o));
        assert!(!OrderFilter::for_identifier("12345", 10).matches(&o));

        let contains = OrderFilter {
            identifier_contains: Some("234".to_string()),
            ..Default::default()
        };
        assert!(contains.matches(&o));

        let pending_only = OrderFilter {
            status: Some(OrderStatus::Pending),
            ..Default::default()
        };
        assert!(!pending_only.matches(&o));

        let future = OrderFilter {
            created_from: Some(Utc::now() + Duration::days(1)),
            ..Default::default()
        };
        assert!(!future.matches(&o));
    }

    #[test]
    fn test_stats() {
        let orders = vec![
            order("NL1", "a", OrderStatus::Success, 1000, 100),
            order("NL2", "a", OrderStatus::Success, 500, 50),
            order("NL3", "b", OrderStatus::Pending, 700, 70),
            order("NL4", "b", OrderStatus::Failed, 300, 30),
        ];

        let stats = OrderStats::from_orders(&orders);
        assert_eq!(stats.total_amount_minor, 1500);
        assert_eq!(stats.total_credits, 150);
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.failed_count, 1);
    }
}
