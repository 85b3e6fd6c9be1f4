//! # Monetary Persistence
//!
//! Persistence layer cho Monetary: store traits và hai adapter.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Store traits                          │
//! │  BalanceStore  OrderStore  ProductCatalog  Directory  ...    │
//! │        ┌──────────────┐            ┌──────────────┐          │
//! │        │ SqliteStore  │            │ MemoryStore  │          │
//! │        │   (sqlx)     │            │   (tests)    │          │
//! │        └──────────────┘            └──────────────┘          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use monetary_persistence::{BalanceStore, SqliteStore};
//!
//! let store = SqliteStore::connect("sqlite:monetary.db", Duration::from_secs(5)).await?;
//! let record = store.get("10001", "default").await?;
//! ```

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use error::{PersistenceError, PersistenceResult};
pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, StoreCounts};
pub use traits::{BalanceStore, BindingTable, Directory, OrderStore, ProductCatalog};
