//! Identity resolution - external identifiers to canonical accounts
//!
//! IdentityResolver looks identifiers up in the directory and binding
//! table, provisions accounts on the payment path, and converges legacy
//! balance records onto their account.

use crate::error::{BusinessError, BusinessResult};
use crate::services::ServiceContext;
use monetary_core::{candidate_keys, extract_bare_id, AccountId, BalanceRecord};
use tracing::{debug, info};

/// Result of `find_balance_record`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLookup {
    /// Existing record, with `account_id` filled in
    pub record: Option<BalanceRecord>,
    /// Key of the record, or the key to create one under
    pub identifier_key: Option<String>,
}

/// Identity resolver
pub struct IdentityResolver<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Resolve an identifier to an account.
    ///
    /// Order: directory `(platform_hint, bare)` when a hint is given, then
    /// binding lookup by raw identifier, then by bare identifier.
    pub async fn resolve_account_id(
        &self,
        identifier: &str,
        platform_hint: Option<&str>,
    ) -> BusinessResult<Option<AccountId>> {
        let bare = extract_bare_id(identifier);

        if let Some(platform) = platform_hint {
            let found = self
                .ctx
                .bounded("directory.get_account_id", self.ctx.directory().get_account_id(platform, bare))
                .await?;
            if found.is_some() {
                return Ok(found);
            }
        }

        let found = self
            .ctx
            .bounded("bindings.lookup", self.ctx.bindings().lookup_account(identifier))
            .await?;
        if found.is_some() || bare == identifier {
            return Ok(found);
        }

        self.ctx
            .bounded("bindings.lookup", self.ctx.bindings().lookup_account(bare))
            .await
    }

    /// Resolve, or create a directory account on `platform`.
    ///
    /// Provisioning is idempotent in the directory, so a retry after a
    /// lost response lands on the same account.
    pub async fn resolve_or_provision(&self, identifier: &str, platform: &str) -> BusinessResult<AccountId> {
        let bare = extract_bare_id(identifier);
        if bare.is_empty() {
            return Err(BusinessError::ProvisioningFailed {
                identifier: identifier.to_string(),
                reason: "empty identifier".to_string(),
            });
        }

        if let Some(id) = self.resolve_account_id(bare, Some(platform)).await? {
            return Ok(id);
        }

        info!("Provisioning account for {}:{}", platform, bare);
        let provisioned = self
            .ctx
            .bounded("directory.provision", self.ctx.directory().provision(platform, bare))
            .await;

        match provisioned {
            Ok(id) => Ok(id),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => Err(BusinessError::ProvisioningFailed {
                identifier: identifier.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Find the balance record of an account.
    ///
    /// Direct lookup by account id first; on miss, probe the candidate keys
    /// built from the account's bindings and backfill the first hit. On a
    /// total miss, `identifier_key` is the bare id of the first binding.
    pub async fn find_balance_record(&self, account_id: AccountId, currency: &str) -> BusinessResult<RecordLookup> {
        let direct = self
            .ctx
            .bounded("balances.get_by_account", self.ctx.balances().get_by_account(account_id, currency))
            .await?;
        if let Some(record) = direct {
            let identifier_key = Some(record.identifier_key.clone());
            return Ok(RecordLookup {
                record: Some(record),
                identifier_key,
            });
        }

        let bindings = self
            .ctx
            .bounded("bindings.list", self.ctx.bindings().list_bindings(account_id))
            .await?;
        let Some(first) = bindings.first() else {
            return Ok(RecordLookup {
                record: None,
                identifier_key: None,
            });
        };

        for key in candidate_keys(&bindings) {
            let found = self
                .ctx
                .bounded("balances.get", self.ctx.balances().get(&key, currency))
                .await?;
            let Some(record) = found else { continue };

            if record.is_unlinked() {
                let linked = self
                    .ctx
                    .bounded(
                        "balances.link_account",
                        self.ctx.balances().link_account(&key, currency, account_id),
                    )
                    .await?;
                debug!("Backfill {}/{} -> #{} (written: {})", key, currency, account_id, linked);
            }

            return Ok(RecordLookup {
                record: Some(record.with_account(account_id)),
                identifier_key: Some(key),
            });
        }

        Ok(RecordLookup {
            record: None,
            identifier_key: Some(extract_bare_id(&first.identifier).to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::LedgerConfig;
    use monetary_persistence::{BalanceStore, MemoryStore};
    use std::sync::Arc;

    async fn setup() -> (ServiceContext, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ctx = ServiceContext::new(store.clone(), LedgerConfig::default());
        (ctx, store)
    }

    #[tokio::test]
    async fn test_resolve_order() {
        let (ctx, store) = setup().await;
        store.bind("onebot:10001", "discord", AccountId(3)).await;
        store.bind("20002", "onebot", AccountId(4)).await;
        let resolver = IdentityResolver::new(&ctx);

        // raw binding lookup
        assert_eq!(
            resolver.resolve_account_id("onebot:10001", None).await.unwrap(),
            Some(AccountId(3))
        );
        // bare fallback
        assert_eq!(
            resolver.resolve_account_id("qq:20002", None).await.unwrap(),
            Some(AccountId(4))
        );
        // directory via hint
        assert_eq!(
            resolver.resolve_account_id("20002", Some("onebot")).await.unwrap(),
            Some(AccountId(4))
        );
        assert_eq!(resolver.resolve_account_id("nobody", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let (ctx, _store) = setup().await;
        let resolver = IdentityResolver::new(&ctx);

        let first = resolver.resolve_or_provision("onebot:555", "onebot").await.unwrap();
        let second = resolver.resolve_or_provision("555", "onebot").await.unwrap();
        assert_eq!(first, second);

        assert!(matches!(
            resolver.resolve_or_provision("onebot:", "onebot").await,
            Err(BusinessError::ProvisioningFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_find_balance_record_converges_legacy_row() {
        let (ctx, store) = setup().await;
        store.bind("10001", "onebot", AccountId(7)).await;
        store
            .insert_record(BalanceRecord::new("onebot:10001", None, "default", 40))
            .await;
        let resolver = IdentityResolver::new(&ctx);

        let lookup = resolver.find_balance_record(AccountId(7), "default").await.unwrap();
        assert_eq!(lookup.identifier_key.as_deref(), Some("onebot:10001"));
        assert_eq!(lookup.record.unwrap().account_id, Some(AccountId(7)));

        // After one pass the direct lookup hits
        let direct = store.get_by_account(AccountId(7), "default").await.unwrap();
        assert_eq!(direct.unwrap().identifier_key, "onebot:10001");
    }

    #[tokio::test]
    async fn test_find_balance_record_total_miss() {
        let (ctx, store) = setup().await;
        store.bind("onebot:10001", "onebot", AccountId(7)).await;
        let resolver = IdentityResolver::new(&ctx);

        let lookup = resolver.find_balance_record(AccountId(7), "gold").await.unwrap();
        assert!(lookup.record.is_none());
        assert_eq!(lookup.identifier_key.as_deref(), Some("10001"));

        let unbound = resolver.find_balance_record(AccountId(99), "gold").await.unwrap();
        assert_eq!(unbound.identifier_key, None);
    }
}
