//! # Monetary Epay
//!
//! Epay gateway protocol: gateway config, RSA-SHA256 signature codec,
//! outbound pay form and inbound notification fields.
//!
//! ```rust,ignore
//! use monetary_epay::{build_pay_form, GatewayConfig, PayRequest, SignatureCodec};
//!
//! let codec = SignatureCodec::from_key_material(&config.merchant_private_key, &config.platform_public_key);
//! let form = build_pay_form(&config, &codec, &request, Utc::now())?;
//! if codec.verify(&notification_params) { /* ... */ }
//! ```

pub mod config;
pub mod error;
pub mod form;
pub mod keys;
pub mod notify;
pub mod sign;

pub use config::{GatewayConfig, DEFAULT_BASE_PATH};
pub use error::{EpayError, EpayResult};
pub use form::{build_pay_form, escape_html, PayForm, PayRequest};
pub use keys::{load_private_key, load_public_key};
pub use notify::{params_from_pairs, Notification, REPLY_FAIL, REPLY_SUCCESS, TRADE_SUCCESS};
pub use sign::{canonicalize, sign, verify, Params, SignatureCodec, TIMESTAMP_WINDOW_SECS};
