//! Integration tests for the ledger
//!
//! Each scenario runs against the in-memory adapter and a SQLite file.

use async_trait::async_trait;
use monetary_business::{BusinessError, IdentityResolver, LedgerConfig, LedgerService, ServiceContext};
use monetary_core::{AccountId, AccountRef, BalanceRecord, CreditTarget, DebitOutcome, TransferOutcome};
use monetary_persistence::{BalanceStore, MemoryStore, PersistenceResult, SqliteStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn sqlite_ctx(dir: &TempDir) -> (ServiceContext, Arc<SqliteStore>) {
    let url = format!("sqlite:{}", dir.path().join("ledger.db").display());
    let store = Arc::new(SqliteStore::connect(&url, Duration::from_secs(5)).await.unwrap());
    (ServiceContext::new(store.clone(), LedgerConfig::default()), store)
}

fn memory_ctx() -> (ServiceContext, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (ServiceContext::new(store.clone(), LedgerConfig::default()), store)
}

async fn alice_and_bob(ctx: &ServiceContext) {
    let ledger = LedgerService::new(ctx);
    let alice = AccountRef::external("alice");
    let bob = AccountRef::external("bob");

    assert_eq!(ledger.get_balance(&alice, "default").await.unwrap(), 0);
    assert_eq!(ledger.credit(&alice, 100, "default").await.unwrap(), 100);

    let err = ledger.debit(&alice, 150, "default").await.unwrap_err();
    assert!(err.is_insufficient_balance());
    assert_eq!(ledger.get_balance(&alice, "default").await.unwrap(), 100);

    assert_eq!(ledger.debit(&alice, 40, "default").await.unwrap(), 60);

    let receipt = ledger.transfer(&alice, &bob, 60, "default").await.unwrap();
    assert_eq!(receipt.from_remaining, 0);
    assert_eq!(receipt.to_balance, 60);
    assert_eq!(ledger.get_balance(&alice, "default").await.unwrap(), 0);
    assert_eq!(ledger.get_balance(&bob, "default").await.unwrap(), 60);

    // Currencies are separate partitions
    assert_eq!(ledger.get_balance(&bob, "gold").await.unwrap(), 0);
}

/// Test: credit 100 → debit 150 fails → debit 40 → transfer 60
#[tokio::test]
async fn test_alice_and_bob_memory() {
    let (ctx, _) = memory_ctx();
    alice_and_bob(&ctx).await;
}

#[tokio::test]
async fn test_alice_and_bob_sqlite() {
    let temp_dir = TempDir::new().unwrap();
    let (ctx, _) = sqlite_ctx(&temp_dir).await;
    alice_and_bob(&ctx).await;
}

/// Test: a failed transfer moves nothing
#[tokio::test]
async fn test_transfer_insufficient_leaves_both_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let (ctx, _) = sqlite_ctx(&temp_dir).await;
    let ledger = LedgerService::new(&ctx);
    let alice = AccountRef::external("alice");
    let bob = AccountRef::external("bob");

    ledger.credit(&alice, 10, "default").await.unwrap();
    ledger.credit(&bob, 5, "default").await.unwrap();

    let err = ledger.transfer(&alice, &bob, 11, "default").await.unwrap_err();
    assert!(matches!(
        err,
        BusinessError::InsufficientBalance {
            requested: 11,
            available: 10,
            ..
        }
    ));
    assert_eq!(ledger.get_balance(&alice, "default").await.unwrap(), 10);
    assert_eq!(ledger.get_balance(&bob, "default").await.unwrap(), 5);

    // Missing source behaves like a zero balance
    let err = ledger
        .transfer(&AccountRef::external("carol"), &bob, 1, "default")
        .await
        .unwrap_err();
    assert!(matches!(err, BusinessError::InsufficientBalance { available: 0, .. }));
}

/// Test: two concurrent debits of 60 against 100, exactly one succeeds
#[tokio::test]
async fn test_concurrent_debits() {
    let temp_dir = TempDir::new().unwrap();
    let (ctx, _) = sqlite_ctx(&temp_dir).await;
    let ctx = Arc::new(ctx);
    let alice = AccountRef::canonical(1);

    LedgerService::new(&ctx).credit(&alice, 100, "default").await.unwrap();

    let spawn_debit = |ctx: Arc<ServiceContext>, who: AccountRef| {
        tokio::spawn(async move { LedgerService::new(&ctx).debit(&who, 60, "default").await })
    };
    let a = spawn_debit(ctx.clone(), alice.clone());
    let b = spawn_debit(ctx.clone(), alice.clone());
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_insufficient_balance()))
            .count(),
        1
    );
    assert_eq!(LedgerService::new(&ctx).get_balance(&alice, "default").await.unwrap(), 40);
}

/// Test: concurrent credits all land
#[tokio::test]
async fn test_concurrent_credits_sum() {
    let (ctx, store) = memory_ctx();
    let ctx = Arc::new(ctx);

    let handles: Vec<_> = (1..=10)
        .map(|n| {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                LedgerService::new(&ctx)
                    .credit(&AccountRef::external("alice"), n, "default")
                    .await
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.get("alice", "default").await.unwrap().unwrap().value, 55);
}

/// Test: legacy rows under drifted identifiers converge on the account
#[tokio::test]
async fn test_identity_convergence() {
    let (ctx, store) = memory_ctx();
    store.bind("10001", "onebot", AccountId(7)).await;
    store.bind("onebot:10001", "discord", AccountId(7)).await;
    // Historical drift: two currencies, two different key variants, no back-reference
    store
        .insert_record(BalanceRecord::new("onebot:10001", None, "default", 25))
        .await;
    store
        .insert_record(BalanceRecord::new("10001", None, "gold", 3))
        .await;

    let resolver = IdentityResolver::new(&ctx);
    for currency in ["default", "gold"] {
        assert!(store.get_by_account(AccountId(7), currency).await.unwrap().is_none());
        let lookup = resolver.find_balance_record(AccountId(7), currency).await.unwrap();
        assert!(lookup.record.is_some());
        // Second lookup hits directly by account id
        assert!(store.get_by_account(AccountId(7), currency).await.unwrap().is_some());
    }

    let ledger = LedgerService::new(&ctx);
    let by_id = AccountRef::canonical(7);
    assert_eq!(ledger.get_balance(&by_id, "default").await.unwrap(), 25);
    assert_eq!(ledger.get_balance(&by_id, "gold").await.unwrap(), 3);
    assert_eq!(
        ledger
            .get_balance(&AccountRef::external("onebot:10001"), "default")
            .await
            .unwrap(),
        25
    );
}

/// Test: overflow is reported, never wrapped
#[tokio::test]
async fn test_credit_overflow() {
    let temp_dir = TempDir::new().unwrap();
    let (ctx, store) = sqlite_ctx(&temp_dir).await;
    store
        .insert_record(&BalanceRecord::new("whale", None, "default", i64::MAX - 1))
        .await
        .unwrap();

    let err = LedgerService::new(&ctx)
        .credit(&AccountRef::external("whale"), 2, "default")
        .await
        .unwrap_err();
    assert!(matches!(err, BusinessError::BalanceOverflow { .. }));
}

/// Balance store that never answers in time
struct StalledBalances;

#[async_trait]
impl BalanceStore for StalledBalances {
    async fn get_by_account(&self, _: AccountId, _: &str) -> PersistenceResult<Option<BalanceRecord>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(None)
    }

    async fn get(&self, _: &str, _: &str) -> PersistenceResult<Option<BalanceRecord>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(None)
    }

    async fn link_account(&self, _: &str, _: &str, _: AccountId) -> PersistenceResult<bool> {
        Ok(false)
    }

    async fn credit(&self, _: &CreditTarget, _: &str, _: i64) -> PersistenceResult<i64> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(0)
    }

    async fn debit(&self, _: &str, _: &str, _: i64) -> PersistenceResult<DebitOutcome> {
        Ok(DebitOutcome::Missing)
    }

    async fn transfer(&self, _: &str, _: &CreditTarget, _: &str, _: i64) -> PersistenceResult<TransferOutcome> {
        Ok(TransferOutcome::SourceMissing)
    }
}

/// Test: a stalled store surfaces as a transient timeout
#[tokio::test]
async fn test_store_timeout_is_transient() {
    let store = Arc::new(MemoryStore::new());
    let ctx = ServiceContext::new(
        store,
        LedgerConfig {
            op_timeout: Duration::from_millis(20),
            ..Default::default()
        },
    )
    .with_balances(Arc::new(StalledBalances));

    let err = LedgerService::new(&ctx)
        .credit(&AccountRef::external("alice"), 1, "default")
        .await
        .unwrap_err();
    assert!(matches!(err, BusinessError::Timeout(_)));
    assert!(err.is_transient());
}
