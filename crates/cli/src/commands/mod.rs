//! Command handlers

pub mod ledger;
pub mod orders;
pub mod products;

use anyhow::Result;
use monetary_business::{LedgerConfig, PaymentGateway, ServiceContext};
use monetary_epay::GatewayConfig;
use monetary_persistence::SqliteStore;
use std::path::Path;
use std::sync::Arc;

use crate::db;

/// Opened store plus the services built on it
pub struct App {
    pub store: Arc<SqliteStore>,
    pub ctx: ServiceContext,
    pub gateway: PaymentGateway,
}

impl App {
    pub async fn open(db_path: &Path, ledger: LedgerConfig, gateway: GatewayConfig) -> Result<Self> {
        let store = Arc::new(db::open(db_path, ledger.op_timeout).await?);
        let ctx = ServiceContext::new(store.clone(), ledger);
        Ok(Self {
            store,
            ctx,
            gateway: PaymentGateway::from_config(gateway),
        })
    }

    pub async fn close(self) {
        self.store.close().await;
    }
}
