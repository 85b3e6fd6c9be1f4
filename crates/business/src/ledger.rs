//! Ledger operations - balance, credit, debit, transfer
//!
//! LedgerService resolves every `AccountRef` once at entry, then issues a
//! single atomic store call for the mutation.

use crate::error::{BusinessError, BusinessResult};
use crate::identity::IdentityResolver;
use crate::services::ServiceContext;
use monetary_core::{
    extract_bare_id, AccountId, AccountRef, BalanceRecord, CreditTarget, DebitOutcome, TransferOutcome,
};
use tracing::info;

/// Transfer result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReceipt {
    pub from_remaining: i64,
    pub to_balance: i64,
}

/// Where a reference points in the balance table.
#[derive(Debug, Clone)]
struct Located {
    /// Existing record, if any
    record: Option<BalanceRecord>,
    /// Key and back-reference to create a record under
    target: CreditTarget,
    /// Resolved account, if the reference maps to one
    account_id: Option<AccountId>,
}

impl Located {
    fn key(&self) -> &str {
        self.record
            .as_ref()
            .map(|r| r.identifier_key.as_str())
            .unwrap_or(self.target.identifier_key.as_str())
    }

    fn same_owner(&self, other: &Located) -> bool {
        match (self.account_id, other.account_id) {
            (Some(a), Some(b)) => a == b,
            _ => self.key() == other.key(),
        }
    }
}

/// Ledger Service - balance reads and mutations per currency
pub struct LedgerService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> LedgerService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    fn resolver(&self) -> IdentityResolver<'a> {
        IdentityResolver::new(self.ctx)
    }

    /// Probe raw then bare identifier, without resolving an account
    async fn probe_identifier(&self, identifier: &str, currency: &str) -> BusinessResult<Option<BalanceRecord>> {
        let bare = extract_bare_id(identifier);
        let mut keys = vec![identifier];
        if bare != identifier {
            keys.push(bare);
        }

        for key in keys {
            let found = self
                .ctx
                .bounded("balances.get", self.ctx.balances().get(key, currency))
                .await?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    async fn locate_account(&self, account_id: AccountId, currency: &str) -> BusinessResult<Located> {
        let lookup = self.resolver().find_balance_record(account_id, currency).await?;
        // No bindings at all: the account id itself becomes the key
        let key = lookup.identifier_key.unwrap_or_else(|| account_id.to_string());
        Ok(Located {
            record: lookup.record,
            target: CreditTarget::new(&key, Some(account_id)),
            account_id: Some(account_id),
        })
    }

    async fn locate(&self, account: &AccountRef, currency: &str) -> BusinessResult<Located> {
        match account {
            AccountRef::Canonical(id) => self.locate_account(*id, currency).await,
            AccountRef::External(identifier) => {
                let platform = self.ctx.config().default_platform.as_str();
                let resolved = self
                    .resolver()
                    .resolve_account_id(identifier, Some(platform))
                    .await?;
                match resolved {
                    Some(id) => self.locate_account(id, currency).await,
                    None => Ok(Located {
                        record: self.probe_identifier(identifier, currency).await?,
                        target: CreditTarget::new(extract_bare_id(identifier), None),
                        account_id: None,
                    }),
                }
            }
        }
    }

    /// Balance of `account` in `currency`; 0 when no record exists
    pub async fn get_balance(&self, account: &AccountRef, currency: &str) -> BusinessResult<i64> {
        let located = self.locate(account, currency).await?;
        Ok(located.record.map(|r| r.value).unwrap_or(0))
    }

    /// Add `amount` to the account's record, creating it when absent.
    /// Returns the new balance.
    pub async fn credit(&self, account: &AccountRef, amount: i64, currency: &str) -> BusinessResult<i64> {
        if amount < 0 {
            return Err(BusinessError::InvalidAmount(format!(
                "Credit amount must not be negative: {}",
                amount
            )));
        }

        let located = self.locate(account, currency).await?;
        let target = match &located.record {
            Some(record) => CreditTarget::new(&record.identifier_key, located.account_id),
            None => located.target.clone(),
        };

        self.ctx
            .bounded("balances.credit", self.ctx.balances().credit(&target, currency, amount))
            .await
    }

    /// Subtract `amount` if the record exists and covers it.
    /// Returns the remaining balance.
    pub async fn debit(&self, account: &AccountRef, amount: i64, currency: &str) -> BusinessResult<i64> {
        if amount < 0 {
            return Err(BusinessError::InvalidAmount(format!(
                "Debit amount must not be negative: {}",
                amount
            )));
        }

        let located = self.locate(account, currency).await?;
        let Some(record) = located.record else {
            return Err(BusinessError::record_not_found(account, currency));
        };

        let outcome = self
            .ctx
            .bounded(
                "balances.debit",
                self.ctx.balances().debit(&record.identifier_key, currency, amount),
            )
            .await?;

        match outcome {
            DebitOutcome::Debited { remaining } => Ok(remaining),
            DebitOutcome::Insufficient { available } => {
                Err(BusinessError::insufficient_balance(amount, available, currency))
            }
            DebitOutcome::Missing => Err(BusinessError::record_not_found(account, currency)),
        }
    }

    /// Move `amount` from one account to another in one store transaction.
    pub async fn transfer(
        &self,
        from: &AccountRef,
        to: &AccountRef,
        amount: i64,
        currency: &str,
    ) -> BusinessResult<TransferReceipt> {
        if amount <= 0 {
            return Err(BusinessError::InvalidAmount(format!(
                "Transfer amount must be positive: {}",
                amount
            )));
        }
        if from == to {
            return Err(BusinessError::SelfTransfer(from.to_string()));
        }

        let source = self.locate(from, currency).await?;
        let dest = self.locate(to, currency).await?;
        if source.same_owner(&dest) {
            return Err(BusinessError::SelfTransfer(from.to_string()));
        }

        // Missing source record counts as a zero balance
        let Some(source_record) = source.record else {
            return Err(BusinessError::insufficient_balance(amount, 0, currency));
        };
        let dest_target = match &dest.record {
            Some(record) => CreditTarget::new(&record.identifier_key, dest.account_id),
            None => dest.target.clone(),
        };

        let outcome = self
            .ctx
            .bounded(
                "balances.transfer",
                self.ctx
                    .balances()
                    .transfer(&source_record.identifier_key, &dest_target, currency, amount),
            )
            .await?;

        match outcome {
            TransferOutcome::Completed {
                from_remaining,
                to_balance,
            } => {
                info!("Transfer {} {} from {} to {}", amount, currency, from, to);
                Ok(TransferReceipt {
                    from_remaining,
                    to_balance,
                })
            }
            TransferOutcome::Insufficient { available } => {
                Err(BusinessError::insufficient_balance(amount, available, currency))
            }
            TransferOutcome::SourceMissing => Err(BusinessError::insufficient_balance(amount, 0, currency)),
        }
    }

    /// Target for a payment-path credit: the bare identifier, carrying the
    /// resolved account when there is one.
    pub async fn identifier_target(
        &self,
        identifier: &str,
        known_account: Option<AccountId>,
    ) -> BusinessResult<CreditTarget> {
        let bare = extract_bare_id(identifier);
        let account_id = match known_account {
            Some(id) => Some(id),
            None => self.resolver().resolve_account_id(bare, None).await?,
        };
        Ok(CreditTarget::new(bare, account_id))
    }

    /// Payment-path credit under the bare identifier
    pub async fn credit_by_identifier(&self, identifier: &str, amount: i64, currency: &str) -> BusinessResult<i64> {
        if amount < 0 {
            return Err(BusinessError::InvalidAmount(format!(
                "Credit amount must not be negative: {}",
                amount
            )));
        }

        let target = self.identifier_target(identifier, None).await?;
        self.ctx
            .bounded("balances.credit", self.ctx.balances().credit(&target, currency, amount))
            .await
    }

    /// Balance by identifier: raw key first, then bare key; 0 when absent
    pub async fn balance_by_identifier(&self, identifier: &str, currency: &str) -> BusinessResult<i64> {
        Ok(self
            .probe_identifier(identifier, currency)
            .await?
            .map(|r| r.value)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::LedgerConfig;
    use monetary_persistence::{BalanceStore, MemoryStore};
    use std::sync::Arc;

    fn setup() -> (ServiceContext, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ctx = ServiceContext::new(store.clone(), LedgerConfig::default());
        (ctx, store)
    }

    #[tokio::test]
    async fn test_credit_then_debit() {
        let (ctx, store) = setup();
        store.bind("10001", "onebot", AccountId(1)).await;
        let ledger = LedgerService::new(&ctx);
        let alice = AccountRef::canonical(1);

        assert_eq!(ledger.get_balance(&alice, "default").await.unwrap(), 0);
        assert_eq!(ledger.credit(&alice, 30, "default").await.unwrap(), 30);
        assert_eq!(ledger.credit(&alice, 20, "default").await.unwrap(), 50);
        assert_eq!(ledger.debit(&alice, 15, "default").await.unwrap(), 35);

        let err = ledger.debit(&alice, 100, "default").await.unwrap_err();
        assert!(matches!(
            err,
            BusinessError::InsufficientBalance {
                requested: 100,
                available: 35,
                ..
            }
        ));

        // Record was created under the bare id of the first binding
        let record = store.get("10001", "default").await.unwrap().unwrap();
        assert_eq!(record.account_id, Some(AccountId(1)));
    }

    #[tokio::test]
    async fn test_negative_amounts_rejected() {
        let (ctx, _) = setup();
        let ledger = LedgerService::new(&ctx);
        let a = AccountRef::external("a");

        assert!(matches!(
            ledger.credit(&a, -1, "default").await,
            Err(BusinessError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.debit(&a, -1, "default").await,
            Err(BusinessError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.transfer(&a, &AccountRef::external("b"), 0, "default").await,
            Err(BusinessError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn test_debit_missing_record() {
        let (ctx, _) = setup();
        let ledger = LedgerService::new(&ctx);

        let err = ledger
            .debit(&AccountRef::external("ghost"), 1, "default")
            .await
            .unwrap_err();
        assert!(matches!(err, BusinessError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn test_account_without_bindings_uses_id_as_key() {
        let (ctx, store) = setup();
        let ledger = LedgerService::new(&ctx);

        ledger.credit(&AccountRef::canonical(42), 5, "default").await.unwrap();
        let record = store.get("42", "default").await.unwrap().unwrap();
        assert_eq!(record.account_id, Some(AccountId(42)));
        assert_eq!(ledger.get_balance(&AccountRef::canonical(42), "default").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_self_transfer_after_resolution() {
        let (ctx, store) = setup();
        store.bind("10001", "onebot", AccountId(1)).await;
        let ledger = LedgerService::new(&ctx);

        let err = ledger
            .transfer(
                &AccountRef::canonical(1),
                &AccountRef::external("onebot:10001"),
                5,
                "default",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BusinessError::SelfTransfer(_)));

        let err = ledger
            .transfer(&AccountRef::external("x"), &AccountRef::external("x"), 5, "default")
            .await
            .unwrap_err();
        assert!(matches!(err, BusinessError::SelfTransfer(_)));
    }

    #[tokio::test]
    async fn test_credit_by_identifier_attaches_account() {
        let (ctx, store) = setup();
        store.bind("10001", "onebot", AccountId(9)).await;
        store
            .insert_record(BalanceRecord::new("10001", None, "gold", 10))
            .await;
        let ledger = LedgerService::new(&ctx);

        assert_eq!(
            ledger.credit_by_identifier("onebot:10001", 50, "gold").await.unwrap(),
            60
        );
        let record = store.get("10001", "gold").await.unwrap().unwrap();
        assert_eq!(record.account_id, Some(AccountId(9)));

        assert_eq!(ledger.balance_by_identifier("onebot:10001", "gold").await.unwrap(), 60);
        assert_eq!(ledger.balance_by_identifier("nobody", "gold").await.unwrap(), 0);
    }
}
