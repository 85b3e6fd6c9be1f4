//! SQLite store
//!
//! `SqliteStore` implement mọi store trait trên một `SqlitePool`.
//! Các thao tác check-rồi-ghi được gộp vào một statement có điều kiện
//! hoặc một transaction.

use crate::error::{PersistenceError, PersistenceResult};
use crate::sqlite::schema::{BalanceRow, BindingRow, OrderRow, ProductRow, SCHEMA};
use crate::traits::{BalanceStore, BindingTable, Directory, OrderStore, ProductCatalog};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use monetary_core::{
    AccountId, BalanceRecord, Binding, CreditTarget, DebitOutcome, OrderFilter, OrderStatus,
    PaymentOrder, Product, SettleOutcome, TransferOutcome,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Giới hạn thời gian chờ khi database đang bị khóa
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREDIT_SQL: &str = r#"
    INSERT INTO monetary (user_id, uid, currency, value)
    VALUES (?, ?, ?, ?)
    ON CONFLICT(user_id, currency) DO UPDATE SET
        value = monetary.value + excluded.value,
        uid = COALESCE(monetary.uid, excluded.uid)
    WHERE monetary.value <= ? - excluded.value
    RETURNING value
"#;

const DEBIT_SQL: &str = r#"
    UPDATE monetary SET value = value - ?
    WHERE user_id = ? AND currency = ? AND value >= ?
    RETURNING value
"#;

/// Counts cho lệnh `status`
#[derive(Debug, Clone, Default)]
pub struct StoreCounts {
    pub accounts: i64,
    pub bindings: i64,
    pub balances: i64,
    pub orders: i64,
    pub products: i64,
}

/// SQLite-backed implementation of every store trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap một pool có sẵn (schema phải được tạo trước bằng `init_schema`)
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Kết nối tới database file, tạo file và schema nếu chưa có
    ///
    /// # Arguments
    /// * `database_url` - SQLite URL (e.g., "sqlite:data/monetary.db")
    /// * `acquire_timeout` - thời gian tối đa chờ một connection
    pub async fn connect(database_url: &str, acquire_timeout: Duration) -> PersistenceResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(DEFAULT_BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database (một connection duy nhất, dùng cho test)
    pub async fn in_memory() -> PersistenceResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Tạo bảng nếu chưa có
    pub async fn init_schema(&self) -> PersistenceResult<()> {
        debug!("Initializing schema");
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Get SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Đóng pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Gắn identifier vào account (tạo account nếu id chưa tồn tại)
    pub async fn bind(&self, identifier: &str, platform: &str, account_id: AccountId) -> PersistenceResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT OR IGNORE INTO users (id) VALUES (?)")
            .bind(account_id.value())
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO bindings (platform, pid, aid) VALUES (?, ?, ?)
             ON CONFLICT(platform, pid) DO UPDATE SET aid = excluded.aid",
        )
        .bind(platform)
        .bind(identifier)
        .bind(account_id.value())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Ghi thẳng một balance record (seed record legacy, import)
    pub async fn insert_record(&self, record: &BalanceRecord) -> PersistenceResult<()> {
        sqlx::query("INSERT INTO monetary (user_id, uid, currency, value) VALUES (?, ?, ?, ?)")
            .bind(&record.identifier_key)
            .bind(record.account_id.map(|id| id.value()))
            .bind(&record.currency)
            .bind(record.value)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => PersistenceError::already_exists(
                    "Balance",
                    &format!("{}:{}", record.identifier_key, record.currency),
                ),
                other => PersistenceError::Database(other),
            })?;
        Ok(())
    }

    /// Đếm records trong từng bảng
    pub async fn counts(&self) -> PersistenceResult<StoreCounts> {
        let count = |table: &'static str| {
            let pool = self.pool.clone();
            async move {
                let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
                    .fetch_one(&pool)
                    .await?;
                Ok::<i64, PersistenceError>(row.0)
            }
        };

        Ok(StoreCounts {
            accounts: count("users").await?,
            bindings: count("bindings").await?,
            balances: count("monetary").await?,
            orders: count("recharge_orders").await?,
            products: count("recharge_products").await?,
        })
    }

    async fn fetch_balance(
        conn: &mut SqliteConnection,
        identifier_key: &str,
        currency: &str,
    ) -> PersistenceResult<Option<BalanceRow>> {
        let row = sqlx::query_as::<_, BalanceRow>(
            "SELECT user_id, uid, currency, value FROM monetary WHERE user_id = ? AND currency = ?",
        )
        .bind(identifier_key)
        .bind(currency)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    /// Upsert-add bên trong transaction. Overflow -> lỗi, transaction rollback khi drop.
    async fn credit_in(
        tx: &mut Transaction<'_, Sqlite>,
        target: &CreditTarget,
        currency: &str,
        amount: i64,
    ) -> PersistenceResult<i64> {
        sqlx::query_scalar::<_, i64>(CREDIT_SQL)
            .bind(&target.identifier_key)
            .bind(target.account_id.map(|id| id.value()))
            .bind(currency)
            .bind(amount)
            .bind(i64::MAX)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| PersistenceError::overflow(&target.identifier_key, currency))
    }
}

#[async_trait]
impl BalanceStore for SqliteStore {
    async fn get_by_account(
        &self,
        account_id: AccountId,
        currency: &str,
    ) -> PersistenceResult<Option<BalanceRecord>> {
        let row = sqlx::query_as::<_, BalanceRow>(
            "SELECT user_id, uid, currency, value FROM monetary
             WHERE uid = ? AND currency = ? ORDER BY user_id LIMIT 1",
        )
        .bind(account_id.value())
        .bind(currency)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(BalanceRecord::from))
    }

    async fn get(&self, identifier_key: &str, currency: &str) -> PersistenceResult<Option<BalanceRecord>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Self::fetch_balance(&mut conn, identifier_key, currency)
            .await?
            .map(BalanceRecord::from))
    }

    async fn link_account(
        &self,
        identifier_key: &str,
        currency: &str,
        account_id: AccountId,
    ) -> PersistenceResult<bool> {
        let result = sqlx::query(
            "UPDATE monetary SET uid = ? WHERE user_id = ? AND currency = ? AND uid IS NULL",
        )
        .bind(account_id.value())
        .bind(identifier_key)
        .bind(currency)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn credit(&self, target: &CreditTarget, currency: &str, amount: i64) -> PersistenceResult<i64> {
        let mut tx = self.pool.begin().await?;
        let balance = Self::credit_in(&mut tx, target, currency, amount).await?;
        tx.commit().await?;
        Ok(balance)
    }

    async fn debit(&self, identifier_key: &str, currency: &str, amount: i64) -> PersistenceResult<DebitOutcome> {
        let mut tx = self.pool.begin().await?;
        let remaining = sqlx::query_scalar::<_, i64>(DEBIT_SQL)
            .bind(amount)
            .bind(identifier_key)
            .bind(currency)
            .bind(amount)
            .fetch_optional(&mut *tx)
            .await?;

        let outcome = match remaining {
            Some(remaining) => DebitOutcome::Debited { remaining },
            None => match Self::fetch_balance(&mut tx, identifier_key, currency).await? {
                Some(row) => DebitOutcome::Insufficient { available: row.value },
                None => DebitOutcome::Missing,
            },
        };
        tx.commit().await?;
        Ok(outcome)
    }

    async fn transfer(
        &self,
        from_key: &str,
        to: &CreditTarget,
        currency: &str,
        amount: i64,
    ) -> PersistenceResult<TransferOutcome> {
        let mut tx = self.pool.begin().await?;

        let from_remaining = sqlx::query_scalar::<_, i64>(DEBIT_SQL)
            .bind(amount)
            .bind(from_key)
            .bind(currency)
            .bind(amount)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(from_remaining) = from_remaining else {
            let outcome = match Self::fetch_balance(&mut tx, from_key, currency).await? {
                Some(row) => TransferOutcome::Insufficient { available: row.value },
                None => TransferOutcome::SourceMissing,
            };
            debug!("Transfer {} -> {} rolled back: {:?}", from_key, to.identifier_key, outcome);
            tx.rollback().await?;
            return Ok(outcome);
        };

        // Lỗi ở leg credit (overflow, IO) -> `?` trả về sớm, tx drop và rollback
        let to_balance = Self::credit_in(&mut tx, to, currency, amount).await?;
        tx.commit().await?;

        let from_remaining = if to.identifier_key == from_key {
            to_balance
        } else {
            from_remaining
        };
        Ok(TransferOutcome::Completed {
            from_remaining,
            to_balance,
        })
    }
}

#[async_trait]
impl OrderStore for SqliteStore {
    async fn create_order(&self, order: &PaymentOrder) -> PersistenceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recharge_orders
                (out_trade_no, user_id, uid, product_id, currency, amount_minor, credits, pay_type, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order.out_trade_no)
        .bind(&order.identifier_key)
        .bind(order.account_id.map(|id| id.value()))
        .bind(order.product_id)
        .bind(&order.currency)
        .bind(order.amount_minor)
        .bind(order.credits)
        .bind(&order.pay_type)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                PersistenceError::already_exists("Order", &order.out_trade_no)
            }
            other => PersistenceError::Database(other),
        })?;
        Ok(())
    }

    async fn get_order(&self, out_trade_no: &str) -> PersistenceResult<Option<PaymentOrder>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM recharge_orders WHERE out_trade_no = ?")
            .bind(out_trade_no)
            .fetch_optional(&self.pool)
            .await?
            .map(PaymentOrder::try_from)
            .transpose()
    }

    async fn transition(
        &self,
        out_trade_no: &str,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> PersistenceResult<bool> {
        let result = sqlx::query(
            "UPDATE recharge_orders SET status = ?, updated_at = ? WHERE out_trade_no = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(at)
        .bind(out_trade_no)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn settle(
        &self,
        out_trade_no: &str,
        target: &CreditTarget,
        at: DateTime<Utc>,
    ) -> PersistenceResult<SettleOutcome> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query_as::<_, (String, i64)>(
            r#"
            UPDATE recharge_orders
            SET status = 'success', updated_at = ?, uid = COALESCE(uid, ?)
            WHERE out_trade_no = ? AND status = 'pending'
            RETURNING currency, credits
            "#,
        )
        .bind(at)
        .bind(target.account_id.map(|id| id.value()))
        .bind(out_trade_no)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((currency, credits)) = claimed else {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM recharge_orders WHERE out_trade_no = ?")
                    .bind(out_trade_no)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;

            return match status {
                None => Ok(SettleOutcome::Missing),
                Some(s) => OrderStatus::from_str(&s)
                    .map(SettleOutcome::NotPending)
                    .ok_or(PersistenceError::InvalidEnumValue {
                        field: "status".to_string(),
                        value: s,
                    }),
            };
        };

        let balance = Self::credit_in(&mut tx, target, &currency, credits).await?;
        tx.commit().await?;
        Ok(SettleOutcome::Settled { balance })
    }

    async fn list_orders(&self, filter: &OrderFilter) -> PersistenceResult<Vec<PaymentOrder>> {
        let status = filter.status.map(|s| s.as_str());
        let exact = filter.identifier.as_deref();
        let needle = filter.identifier_contains.as_deref();
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT * FROM recharge_orders
            WHERE (? IS NULL OR status = ?)
              AND (? IS NULL OR user_id = ?)
              AND (? IS NULL OR instr(user_id, ?) > 0)
            "#,
        )
        .bind(status)
        .bind(status)
        .bind(exact)
        .bind(exact)
        .bind(needle)
        .bind(needle)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = rows
            .into_iter()
            .map(PaymentOrder::try_from)
            .collect::<PersistenceResult<Vec<_>>>()?;

        // Lọc ngày và sắp xếp ở Rust để không phụ thuộc định dạng TEXT của timestamp
        orders.retain(|o| filter.matches(o));
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.out_trade_no.cmp(&a.out_trade_no))
        });
        if let Some(limit) = filter.limit {
            orders.truncate(limit);
        }
        Ok(orders)
    }

    async fn remove_order(&self, out_trade_no: &str) -> PersistenceResult<bool> {
        let result = sqlx::query("DELETE FROM recharge_orders WHERE out_trade_no = ?")
            .bind(out_trade_no)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ProductCatalog for SqliteStore {
    async fn get_product(&self, id: i64) -> PersistenceResult<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM recharge_products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn list_enabled(&self) -> PersistenceResult<Vec<Product>> {
        sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM recharge_products WHERE enabled = 1 ORDER BY sort_order ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Product::try_from)
        .collect()
    }

    async fn put_product(&self, product: &Product) -> PersistenceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recharge_products
                (id, name, description, currency, credits_per_yuan, min_amount_minor, max_amount_minor, enabled, sort_order)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                currency = excluded.currency,
                credits_per_yuan = excluded.credits_per_yuan,
                min_amount_minor = excluded.min_amount_minor,
                max_amount_minor = excluded.max_amount_minor,
                enabled = excluded.enabled,
                sort_order = excluded.sort_order
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.currency)
        .bind(product.credits_per_yuan.to_string())
        .bind(product.min_amount_minor)
        .bind(product.max_amount_minor)
        .bind(product.enabled)
        .bind(product.sort_order)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Directory for SqliteStore {
    async fn get_account_id(&self, platform: &str, bare_id: &str) -> PersistenceResult<Option<AccountId>> {
        let aid: Option<i64> = sqlx::query_scalar("SELECT aid FROM bindings WHERE platform = ? AND pid = ?")
            .bind(platform)
            .bind(bare_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(aid.map(AccountId))
    }

    async fn provision(&self, platform: &str, bare_id: &str) -> PersistenceResult<AccountId> {
        let mut tx = self.pool.begin().await?;

        // Statement đầu tiên là write để lấy write lock ngay, tránh hai
        // transaction cùng đọc "chưa có" rồi cùng tạo account.
        let created = sqlx::query(
            r#"
            INSERT INTO users (authority, created_at)
            SELECT 1, CURRENT_TIMESTAMP
            WHERE NOT EXISTS (SELECT 1 FROM bindings WHERE platform = ? AND pid = ?)
            "#,
        )
        .bind(platform)
        .bind(bare_id)
        .execute(&mut *tx)
        .await?;

        let account_id = if created.rows_affected() == 1 {
            let aid = created.last_insert_rowid();
            sqlx::query("INSERT INTO bindings (platform, pid, aid) VALUES (?, ?, ?)")
                .bind(platform)
                .bind(bare_id)
                .bind(aid)
                .execute(&mut *tx)
                .await?;
            debug!("Created account {} for {}:{}", aid, platform, bare_id);
            aid
        } else {
            sqlx::query_scalar("SELECT aid FROM bindings WHERE platform = ? AND pid = ?")
                .bind(platform)
                .bind(bare_id)
                .fetch_one(&mut *tx)
                .await?
        };

        tx.commit().await?;
        Ok(AccountId(account_id))
    }
}

#[async_trait]
impl BindingTable for SqliteStore {
    async fn list_bindings(&self, account_id: AccountId) -> PersistenceResult<Vec<Binding>> {
        let rows = sqlx::query_as::<_, BindingRow>(
            "SELECT platform, pid, aid FROM bindings WHERE aid = ? ORDER BY platform, pid",
        )
        .bind(account_id.value())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Binding::from).collect())
    }

    async fn lookup_account(&self, identifier: &str) -> PersistenceResult<Option<AccountId>> {
        let aid: Option<i64> =
            sqlx::query_scalar("SELECT aid FROM bindings WHERE pid = ? ORDER BY platform LIMIT 1")
                .bind(identifier)
                .fetch_optional(&self.pool)
                .await?;
        Ok(aid.map(AccountId))
    }
}
