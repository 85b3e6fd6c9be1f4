//! SQLite persistence module
//!
//! `SqliteStore` implement mọi store trait trên SQLite qua sqlx.

pub mod schema;
pub mod store;

pub use schema::{BalanceRow, BindingRow, OrderRow, ProductRow, SCHEMA};
pub use store::{SqliteStore, StoreCounts};
