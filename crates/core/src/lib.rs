//! # Monetary Core
//!
//! Domain types cho Monetary: identity references, balance records,
//! payment orders và product catalog.

pub mod balance;
pub mod error;
pub mod identity;
pub mod order;
pub mod product;

pub use balance::{BalanceRecord, CreditTarget, DebitOutcome, TransferOutcome, DEFAULT_CURRENCY};
pub use error::{CoreError, CoreResult};
pub use identity::{candidate_keys, extract_bare_id, AccountId, AccountRef, Binding};
pub use order::{OrderFilter, OrderStats, OrderStatus, PaymentOrder, SettleOutcome};
pub use product::{credits_for, parse_money, to_minor_units, Product, MIN_ORDER_AMOUNT};
