//! Service context and shared configuration
//!
//! `ServiceContext` carries the store capabilities every service needs,
//! plus the per-operation timeout applied to each store call.

use crate::error::{BusinessError, BusinessResult};
use monetary_epay::{GatewayConfig, SignatureCodec};
use monetary_persistence::{
    BalanceStore, BindingTable, Directory, OrderStore, PersistenceResult, ProductCatalog,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default platform used for directory lookups and provisioning
pub const DEFAULT_PLATFORM: &str = "onebot";

/// Default per-operation store timeout
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Ledger configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub default_platform: String,
    pub op_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_platform: DEFAULT_PLATFORM.to_string(),
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }
}

/// Context for business operations - contains store access
#[derive(Clone)]
pub struct ServiceContext {
    balances: Arc<dyn BalanceStore>,
    orders: Arc<dyn OrderStore>,
    products: Arc<dyn ProductCatalog>,
    directory: Arc<dyn Directory>,
    bindings: Arc<dyn BindingTable>,
    config: LedgerConfig,
}

impl ServiceContext {
    /// Create from one adapter implementing every capability
    pub fn new<S>(store: Arc<S>, config: LedgerConfig) -> Self
    where
        S: BalanceStore + OrderStore + ProductCatalog + Directory + BindingTable + 'static,
    {
        Self {
            balances: store.clone(),
            orders: store.clone(),
            products: store.clone(),
            directory: store.clone(),
            bindings: store,
            config,
        }
    }

    /// Replace the balance store (e.g. to wrap it)
    pub fn with_balances(mut self, balances: Arc<dyn BalanceStore>) -> Self {
        self.balances = balances;
        self
    }

    pub fn balances(&self) -> &dyn BalanceStore {
        self.balances.as_ref()
    }

    pub fn orders(&self) -> &dyn OrderStore {
        self.orders.as_ref()
    }

    pub fn products(&self) -> &dyn ProductCatalog {
        self.products.as_ref()
    }

    pub fn directory(&self) -> &dyn Directory {
        self.directory.as_ref()
    }

    pub fn bindings(&self) -> &dyn BindingTable {
        self.bindings.as_ref()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Run one store call under the configured timeout.
    ///
    /// An elapsed timeout becomes `BusinessError::Timeout(op)`.
    pub async fn bounded<T, F>(&self, op: &str, fut: F) -> BusinessResult<T>
    where
        F: Future<Output = PersistenceResult<T>>,
    {
        match tokio::time::timeout(self.config.op_timeout, fut).await {
            Ok(result) => result.map_err(BusinessError::from),
            Err(_) => Err(BusinessError::Timeout(op.to_string())),
        }
    }
}

/// Gateway config plus the loaded signature keys.
#[derive(Debug, Clone)]
pub struct PaymentGateway {
    config: GatewayConfig,
    codec: SignatureCodec,
}

impl PaymentGateway {
    pub fn new(config: GatewayConfig, codec: SignatureCodec) -> Self {
        Self { config, codec }
    }

    /// Load keys from the config strings
    pub fn from_config(config: GatewayConfig) -> Self {
        let codec = SignatureCodec::from_key_material(&config.merchant_private_key, &config.platform_public_key);
        Self { config, codec }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn codec(&self) -> &SignatureCodec {
        &self.codec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monetary_persistence::{MemoryStore, PersistenceError};

    #[tokio::test]
    async fn test_bounded_times_out() {
        let ctx = ServiceContext::new(
            Arc::new(MemoryStore::new()),
            LedgerConfig {
                op_timeout: Duration::from_millis(10),
                ..Default::default()
            },
        );

        let err = ctx
            .bounded("slow", async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, PersistenceError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BusinessError::Timeout(ref op) if op == "slow"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_gateway_without_keys() {
        let gateway = PaymentGateway::from_config(GatewayConfig::default());
        assert!(!gateway.codec().can_sign());
        assert_eq!(gateway.config().base_path, "/recharge");
    }
}
