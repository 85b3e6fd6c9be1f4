//! Epay errors

use thiserror::Error;

/// Lỗi khi nạp key hoặc ký request.
///
/// Verify không bao giờ trả lỗi: mọi trường hợp hỏng đều là `false`.
#[derive(Debug, Error)]
pub enum EpayError {
    #[error("Invalid {which} key: {reason}")]
    InvalidKey { which: &'static str, reason: String },

    #[error("Missing {0} key")]
    MissingKey(&'static str),

    #[error("Signing failed: {0}")]
    Signing(String),
}

pub type EpayResult<T> = Result<T, EpayError>;
