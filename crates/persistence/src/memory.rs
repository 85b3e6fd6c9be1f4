//! In-memory store
//!
//! Một adapter cho mọi store trait, toàn bộ state nằm sau một
//! `tokio::sync::Mutex`. Không có `.await` nào bên trong critical section,
//! nên mỗi thao tác là nguyên tử với các thao tác khác trên cùng store.

use crate::error::{PersistenceError, PersistenceResult};
use crate::traits::{BalanceStore, BindingTable, Directory, OrderStore, ProductCatalog};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use monetary_core::{
    AccountId, BalanceRecord, Binding, CreditTarget, DebitOutcome, OrderFilter, OrderStatus,
    PaymentOrder, Product, SettleOutcome, TransferOutcome,
};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    /// (identifier_key, currency) -> record
    balances: BTreeMap<(String, String), BalanceRecord>,
    orders: BTreeMap<String, PaymentOrder>,
    products: BTreeMap<i64, Product>,
    /// (platform, identifier) -> binding
    bindings: BTreeMap<(String, String), Binding>,
    last_account_id: i64,
}

impl State {
    fn apply_credit(&mut self, target: &CreditTarget, currency: &str, amount: i64) -> PersistenceResult<i64> {
        let key = (target.identifier_key.clone(), currency.to_string());
        match self.balances.get_mut(&key) {
            Some(record) => {
                record.value = record
                    .value
                    .checked_add(amount)
                    .ok_or_else(|| PersistenceError::overflow(&target.identifier_key, currency))?;
                if record.account_id.is_none() {
                    record.account_id = target.account_id;
                }
                Ok(record.value)
            }
            None => {
                let record = BalanceRecord::new(&target.identifier_key, target.account_id, currency, amount);
                self.balances.insert(key, record);
                Ok(amount)
            }
        }
    }

    fn credit_preview(&self, target: &CreditTarget, currency: &str, amount: i64) -> PersistenceResult<i64> {
        let current = self
            .balances
            .get(&(target.identifier_key.clone(), currency.to_string()))
            .map(|r| r.value)
            .unwrap_or(0);
        current
            .checked_add(amount)
            .ok_or_else(|| PersistenceError::overflow(&target.identifier_key, currency))
    }
}

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thêm binding trực tiếp (giả lập directory bên ngoài)
    pub async fn bind(&self, identifier: &str, platform: &str, account_id: AccountId) {
        let mut state = self.state.lock().await;
        state.last_account_id = state.last_account_id.max(account_id.value());
        state.bindings.insert(
            (platform.to_string(), identifier.to_string()),
            Binding::new(identifier, platform, account_id),
        );
    }

    /// Ghi thẳng một balance record (dùng để seed record legacy)
    pub async fn insert_record(&self, record: BalanceRecord) {
        let mut state = self.state.lock().await;
        state
            .balances
            .insert((record.identifier_key.clone(), record.currency.clone()), record);
    }

    /// Snapshot toàn bộ balance records
    pub async fn records(&self) -> Vec<BalanceRecord> {
        self.state.lock().await.balances.values().cloned().collect()
    }
}

#[async_trait]
impl BalanceStore for MemoryStore {
    async fn get_by_account(
        &self,
        account_id: AccountId,
        currency: &str,
    ) -> PersistenceResult<Option<BalanceRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .balances
            .values()
            .find(|r| r.account_id == Some(account_id) && r.currency == currency)
            .cloned())
    }

    async fn get(&self, identifier_key: &str, currency: &str) -> PersistenceResult<Option<BalanceRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .balances
            .get(&(identifier_key.to_string(), currency.to_string()))
            .cloned())
    }

    async fn link_account(
        &self,
        identifier_key: &str,
        currency: &str,
        account_id: AccountId,
    ) -> PersistenceResult<bool> {
        let mut state = self.state.lock().await;
        match state
            .balances
            .get_mut(&(identifier_key.to_string(), currency.to_string()))
        {
            Some(record) if record.account_id.is_none() => {
                record.account_id = Some(account_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn credit(&self, target: &CreditTarget, currency: &str, amount: i64) -> PersistenceResult<i64> {
        let mut state = self.state.lock().await;
        state.apply_credit(target, currency, amount)
    }

    async fn debit(&self, identifier_key: &str, currency: &str, amount: i64) -> PersistenceResult<DebitOutcome> {
        let mut state = self.state.lock().await;
        let Some(record) = state
            .balances
            .get_mut(&(identifier_key.to_string(), currency.to_string()))
        else {
            return Ok(DebitOutcome::Missing);
        };

        if record.value < amount {
            return Ok(DebitOutcome::Insufficient {
                available: record.value,
            });
        }
        record.value -= amount;
        Ok(DebitOutcome::Debited {
            remaining: record.value,
        })
    }

    async fn transfer(
        &self,
        from_key: &str,
        to: &CreditTarget,
        currency: &str,
        amount: i64,
    ) -> PersistenceResult<TransferOutcome> {
        let mut state = self.state.lock().await;
        let from_id = (from_key.to_string(), currency.to_string());

        let available = match state.balances.get(&from_id) {
            Some(record) => record.value,
            None => return Ok(TransferOutcome::SourceMissing),
        };
        if available < amount {
            return Ok(TransferOutcome::Insufficient { available });
        }
        if to.identifier_key == from_key {
            return Ok(TransferOutcome::Completed {
                from_remaining: available,
                to_balance: available,
            });
        }

        // Kiểm tra overflow trước khi mutate để không có trạng thái nửa vời
        state.credit_preview(to, currency, amount)?;

        let from_remaining = match state.balances.get_mut(&from_id) {
            Some(record) => {
                record.value -= amount;
                record.value
            }
            None => return Ok(TransferOutcome::SourceMissing),
        };
        let to_balance = state.apply_credit(to, currency, amount)?;

        Ok(TransferOutcome::Completed {
            from_remaining,
            to_balance,
        })
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_order(&self, order: &PaymentOrder) -> PersistenceResult<()> {
        let mut state = self.state.lock().await;
        if state.orders.contains_key(&order.out_trade_no) {
            return Err(PersistenceError::already_exists("Order", &order.out_trade_no));
        }
        state.orders.insert(order.out_trade_no.clone(), order.clone());
        Ok(())
    }

    async fn get_order(&self, out_trade_no: &str) -> PersistenceResult<Option<PaymentOrder>> {
        Ok(self.state.lock().await.orders.get(out_trade_no).cloned())
    }

    async fn transition(
        &self,
        out_trade_no: &str,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> PersistenceResult<bool> {
        let mut state = self.state.lock().await;
        match state.orders.get_mut(out_trade_no) {
            Some(order) if order.status == from => {
                order.status = to;
                order.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn settle(
        &self,
        out_trade_no: &str,
        target: &CreditTarget,
        at: DateTime<Utc>,
    ) -> PersistenceResult<SettleOutcome> {
        let mut state = self.state.lock().await;
        let (currency, credits) = match state.orders.get(out_trade_no) {
            None => return Ok(SettleOutcome::Missing),
            Some(order) if order.status != OrderStatus::Pending => {
                return Ok(SettleOutcome::NotPending(order.status))
            }
            Some(order) => (order.currency.clone(), order.credits),
        };

        state.credit_preview(target, &currency, credits)?;
        let balance = state.apply_credit(target, &currency, credits)?;
        if let Some(order) = state.orders.get_mut(out_trade_no) {
            order.status = OrderStatus::Success;
            order.updated_at = at;
            if order.account_id.is_none() {
                order.account_id = target.account_id;
            }
        }
        Ok(SettleOutcome::Settled { balance })
    }

    async fn list_orders(&self, filter: &OrderFilter) -> PersistenceResult<Vec<PaymentOrder>> {
        let state = self.state.lock().await;
        let mut orders: Vec<PaymentOrder> = state
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
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
        Ok(self.state.lock().await.orders.remove(out_trade_no).is_some())
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn get_product(&self, id: i64) -> PersistenceResult<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn list_enabled(&self) -> PersistenceResult<Vec<Product>> {
        let state = self.state.lock().await;
        let mut products: Vec<Product> = state.products.values().filter(|p| p.enabled).cloned().collect();
        products.sort_by_key(|p| (p.sort_order, p.id));
        Ok(products)
    }

    async fn put_product(&self, product: &Product) -> PersistenceResult<()> {
        self.state
            .lock()
            .await
            .products
            .insert(product.id, product.clone());
        Ok(())
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn get_account_id(&self, platform: &str, bare_id: &str) -> PersistenceResult<Option<AccountId>> {
        let state = self.state.lock().await;
        Ok(state
            .bindings
            .get(&(platform.to_string(), bare_id.to_string()))
            .map(|b| b.account_id))
    }

    async fn provision(&self, platform: &str, bare_id: &str) -> PersistenceResult<AccountId> {
        let mut state = self.state.lock().await;
        let key = (platform.to_string(), bare_id.to_string());
        if let Some(existing) = state.bindings.get(&key) {
            return Ok(existing.account_id);
        }

        state.last_account_id += 1;
        let account_id = AccountId(state.last_account_id);
        state.bindings.insert(key, Binding::new(bare_id, platform, account_id));
        Ok(account_id)
    }
}

#[async_trait]
impl BindingTable for MemoryStore {
    async fn list_bindings(&self, account_id: AccountId) -> PersistenceResult<Vec<Binding>> {
        let state = self.state.lock().await;
        Ok(state
            .bindings
            .values()
            .filter(|b| b.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn lookup_account(&self, identifier: &str) -> PersistenceResult<Option<AccountId>> {
        let state = self.state.lock().await;
        Ok(state
            .bindings
            .values()
            .find(|b| b.identifier == identifier)
            .map(|b| b.account_id))
    }
}
