//! Store capability traits
//!
//! Business layer chỉ phụ thuộc vào các trait này (giữ dưới dạng
//! `Arc<dyn ...>`). Adapter cụ thể (SQLite, in-memory) được chọn lúc khởi động.

use crate::error::PersistenceResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use monetary_core::{
    AccountId, BalanceRecord, Binding, CreditTarget, DebitOutcome, OrderFilter, OrderStatus,
    PaymentOrder, Product, SettleOutcome, TransferOutcome,
};

/// Balance table `(identifier_key, currency) -> value`.
///
/// Mọi thao tác ghi là nguyên tử với chính nó: check và mutate nằm trong
/// cùng một statement hoặc transaction.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Point read theo account_id (record đã được link)
    async fn get_by_account(
        &self,
        account_id: AccountId,
        currency: &str,
    ) -> PersistenceResult<Option<BalanceRecord>>;

    /// Point read theo primary key
    async fn get(&self, identifier_key: &str, currency: &str) -> PersistenceResult<Option<BalanceRecord>>;

    /// Backfill account_id cho record cũ. Chỉ ghi khi account_id đang null;
    /// trả về `true` nếu đã ghi.
    async fn link_account(
        &self,
        identifier_key: &str,
        currency: &str,
        account_id: AccountId,
    ) -> PersistenceResult<bool>;

    /// Cộng `amount` vào record (tạo mới nếu chưa có). Trả về số dư mới.
    async fn credit(&self, target: &CreditTarget, currency: &str, amount: i64) -> PersistenceResult<i64>;

    /// Trừ `amount` nếu record tồn tại và đủ số dư.
    async fn debit(&self, identifier_key: &str, currency: &str, amount: i64) -> PersistenceResult<DebitOutcome>;

    /// Debit `from` và credit `to` trong cùng một transaction.
    async fn transfer(
        &self,
        from_key: &str,
        to: &CreditTarget,
        currency: &str,
        amount: i64,
    ) -> PersistenceResult<TransferOutcome>;
}

/// Payment orders, keyed by `out_trade_no`.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_order(&self, order: &PaymentOrder) -> PersistenceResult<()>;

    async fn get_order(&self, out_trade_no: &str) -> PersistenceResult<Option<PaymentOrder>>;

    /// Compare-and-set trạng thái. Trả về `false` nếu trạng thái hiện tại
    /// không phải `from`.
    async fn transition(
        &self,
        out_trade_no: &str,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> PersistenceResult<bool>;

    /// CAS `pending -> success` và credit trong cùng một transaction.
    async fn settle(
        &self,
        out_trade_no: &str,
        target: &CreditTarget,
        at: DateTime<Utc>,
    ) -> PersistenceResult<SettleOutcome>;

    /// Danh sách order mới nhất trước
    async fn list_orders(&self, filter: &OrderFilter) -> PersistenceResult<Vec<PaymentOrder>>;

    async fn remove_order(&self, out_trade_no: &str) -> PersistenceResult<bool>;
}

/// Product catalog (read-only với luồng tạo order).
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, id: i64) -> PersistenceResult<Option<Product>>;

    /// Products đang enabled, sắp xếp theo `sort_order`
    async fn list_enabled(&self) -> PersistenceResult<Vec<Product>>;

    async fn put_product(&self, product: &Product) -> PersistenceResult<()>;
}

/// Directory của host platform: `(platform, bare_id) -> account_id`.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_account_id(&self, platform: &str, bare_id: &str) -> PersistenceResult<Option<AccountId>>;

    /// Tạo account mới cho `(platform, bare_id)`. Idempotent: nếu đã tồn
    /// tại thì trả về account hiện có.
    async fn provision(&self, platform: &str, bare_id: &str) -> PersistenceResult<AccountId>;
}

/// Binding table: identifier variants gắn với account.
#[async_trait]
pub trait BindingTable: Send + Sync {
    /// Bindings của account, thứ tự xác định (platform, identifier)
    async fn list_bindings(&self, account_id: AccountId) -> PersistenceResult<Vec<Binding>>;

    async fn lookup_account(&self, identifier: &str) -> PersistenceResult<Option<AccountId>>;
}
