//! # Monetary Business
//!
//! Business logic layer - identity resolution, ledger operations, payment
//! order reconciliation and the admin console.
//!
//! ```rust,ignore
//! let ctx = ServiceContext::new(Arc::new(store), LedgerConfig::default());
//! let ledger = LedgerService::new(&ctx);
//! ledger.credit(&AccountRef::external("alice"), 100, "default").await?;
//! ```

pub mod admin;
pub mod catalog;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod orders;
pub mod services;

pub use admin::{AdminConsole, OrderPage, OrderQuery, SessionStore};
pub use catalog::CatalogService;
pub use error::{BusinessError, BusinessResult};
pub use identity::{IdentityResolver, RecordLookup};
pub use ledger::{LedgerService, TransferReceipt};
pub use orders::{
    generate_out_trade_no, notification_reply, Completion, CreateOrder, CreatedOrder, OrderPipeline,
    ReturnSummary, UserSummary,
};
pub use services::{LedgerConfig, PaymentGateway, ServiceContext, DEFAULT_OP_TIMEOUT, DEFAULT_PLATFORM};
