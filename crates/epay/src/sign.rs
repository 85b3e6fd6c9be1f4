//! Signature codec for the epay protocol
//!
//! Canonical string: drop `sign`, `sign_type` and blank values, sort keys
//! by byte value, join `key=value` with `&`. Signature: RSA PKCS#1 v1.5
//! over SHA-256 of the canonical string, base64 encoded.

use crate::error::{EpayError, EpayResult};
use crate::keys::{load_private_key, load_public_key};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::collections::BTreeMap;
use tracing::warn;

/// Request/notification parameters. `BTreeMap` keeps keys in byte order.
pub type Params = BTreeMap<String, String>;

/// Maximum allowed clock skew for the `timestamp` field, in seconds
pub const TIMESTAMP_WINDOW_SECS: i64 = 300;

/// Canonical string to sign
pub fn canonicalize(params: &Params) -> String {
    params
        .iter()
        .filter(|(k, v)| k.as_str() != "sign" && k.as_str() != "sign_type" && !v.trim().is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign with a private key
pub fn sign(params: &Params, private_key: &RsaPrivateKey) -> EpayResult<String> {
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    sign_with(params, &signing_key)
}

fn sign_with(params: &Params, signing_key: &SigningKey<Sha256>) -> EpayResult<String> {
    let signature = signing_key
        .try_sign(canonicalize(params).as_bytes())
        .map_err(|e| EpayError::Signing(e.to_string()))?;
    Ok(STANDARD.encode(signature.to_bytes()))
}

/// Verify with a public key at `now`. Fails closed.
pub fn verify(params: &Params, public_key: &RsaPublicKey, now: DateTime<Utc>) -> bool {
    let verifying_key = VerifyingKey::<Sha256>::new(public_key.clone());
    verify_with(params, &verifying_key, now)
}

fn timestamp_is_fresh(params: &Params, now: DateTime<Utc>) -> bool {
    // A blank timestamp is absent, as in the canonical string
    match params.get("timestamp").map(|raw| raw.trim()).filter(|raw| !raw.is_empty()) {
        None => true,
        // Unparsable timestamps are rejected rather than ignored
        Some(raw) => match raw.parse::<i64>() {
            Ok(ts) => now.timestamp().abs_diff(ts) <= TIMESTAMP_WINDOW_SECS as u64,
            Err(_) => false,
        },
    }
}

fn verify_with(params: &Params, verifying_key: &VerifyingKey<Sha256>, now: DateTime<Utc>) -> bool {
    let Some(encoded) = params.get("sign").filter(|s| !s.is_empty()) else {
        return false;
    };
    if !timestamp_is_fresh(params, now) {
        return false;
    }
    let Ok(bytes) = STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(signature) = Signature::try_from(bytes.as_slice()) else {
        return false;
    };
    verifying_key
        .verify(canonicalize(params).as_bytes(), &signature)
        .is_ok()
}

/// Holds the merchant signing key and the gateway verifying key.
///
/// Either key may be absent: signing then fails with `MissingKey`,
/// verification always returns `false`.
#[derive(Debug, Clone, Default)]
pub struct SignatureCodec {
    signing_key: Option<SigningKey<Sha256>>,
    verifying_key: Option<VerifyingKey<Sha256>>,
}

impl SignatureCodec {
    pub fn new(merchant_private_key: Option<RsaPrivateKey>, platform_public_key: Option<RsaPublicKey>) -> Self {
        Self {
            signing_key: merchant_private_key.map(SigningKey::<Sha256>::new),
            verifying_key: platform_public_key.map(VerifyingKey::<Sha256>::new),
        }
    }

    /// Load both keys from config strings. Malformed keys are logged and
    /// left out.
    pub fn from_key_material(merchant_private_key: &str, platform_public_key: &str) -> Self {
        let private = match load_private_key(merchant_private_key) {
            Ok(key) => Some(key),
            Err(EpayError::MissingKey(_)) => None,
            Err(e) => {
                warn!("Ignoring merchant key: {}", e);
                None
            }
        };
        let public = match load_public_key(platform_public_key) {
            Ok(key) => Some(key),
            Err(EpayError::MissingKey(_)) => None,
            Err(e) => {
                warn!("Ignoring platform key: {}", e);
                None
            }
        };
        Self::new(private, public)
    }

    pub fn can_sign(&self) -> bool {
        self.signing_key.is_some()
    }

    pub fn sign(&self, params: &Params) -> EpayResult<String> {
        let key = self
            .signing_key
            .as_ref()
            .ok_or(EpayError::MissingKey("merchant private"))?;
        sign_with(params, key)
    }

    pub fn verify(&self, params: &Params) -> bool {
        self.verify_at(params, Utc::now())
    }

    pub fn verify_at(&self, params: &Params, now: DateTime<Utc>) -> bool {
        match &self.verifying_key {
            Some(key) => verify_with(params, key, now),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{load_private_key, load_public_key};
    use chrono::Duration;

    const MERCHANT_PRIVATE: &str = include_str!("../tests/fixtures/merchant_private.pem");
    const MERCHANT_PUBLIC: &str = include_str!("../tests/fixtures/merchant_public.pem");
    const PLATFORM_PUBLIC: &str = include_str!("../tests/fixtures/platform_public.pem");

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_canonicalize_filters_and_sorts() {
        let p = params(&[
            ("type", "alipay"),
            ("sign", "xxx"),
            ("sign_type", "RSA"),
            ("empty", "   "),
            ("money", "5.00"),
            ("Zeta", "1"),
            ("out_trade_no", "NL123"),
        ]);
        assert_eq!(canonicalize(&p), "Zeta=1&money=5.00&out_trade_no=NL123&type=alipay");
    }

    #[test]
    fn test_sign_is_deterministic_and_verifies() {
        let private = load_private_key(MERCHANT_PRIVATE).unwrap();
        let public = load_public_key(MERCHANT_PUBLIC).unwrap();
        let now = Utc::now();
        let mut p = params(&[("out_trade_no", "NL1"), ("money", "1.00")]);
        p.insert("timestamp".to_string(), now.timestamp().to_string());

        let first = sign(&p, &private).unwrap();
        assert_eq!(first, sign(&p, &private).unwrap());

        p.insert("sign".to_string(), first);
        p.insert("sign_type".to_string(), "RSA".to_string());
        assert!(verify(&p, &public, now));
    }

    #[test]
    fn test_verify_fails_closed() {
        let private = load_private_key(MERCHANT_PRIVATE).unwrap();
        let public = load_public_key(MERCHANT_PUBLIC).unwrap();
        let other = load_public_key(PLATFORM_PUBLIC).unwrap();
        let now = Utc::now();

        let mut p = params(&[("out_trade_no", "NL1"), ("money", "1.00")]);
        let signature = sign(&p, &private).unwrap();

        // Missing signature
        assert!(!verify(&p, &public, now));

        p.insert("sign".to_string(), signature.clone());
        assert!(verify(&p, &public, now));
        assert!(!verify(&p, &other, now));

        // Tampered field
        let mut tampered = p.clone();
        tampered.insert("money".to_string(), "100.00".to_string());
        assert!(!verify(&tampered, &public, now));

        // Malformed base64
        let mut garbled = p.clone();
        garbled.insert("sign".to_string(), "%%%".to_string());
        assert!(!verify(&garbled, &public, now));
    }

    #[test]
    fn test_timestamp_window() {
        let private = load_private_key(MERCHANT_PRIVATE).unwrap();
        let public = load_public_key(MERCHANT_PUBLIC).unwrap();
        let now = Utc::now();

        let signed_at = |ts: String| {
            let mut p = params(&[("out_trade_no", "NL1")]);
            p.insert("timestamp".to_string(), ts);
            let s = sign(&p, &private).unwrap();
            p.insert("sign".to_string(), s);
            p
        };

        let fresh = signed_at((now - Duration::seconds(299)).timestamp().to_string());
        assert!(verify(&fresh, &public, now));

        let stale = signed_at((now - Duration::seconds(301)).timestamp().to_string());
        assert!(!verify(&stale, &public, now));

        let future = signed_at((now + Duration::seconds(301)).timestamp().to_string());
        assert!(!verify(&future, &public, now));

        let garbage = signed_at("soon".to_string());
        assert!(!verify(&garbage, &public, now));
    }

    #[test]
    fn test_extreme_timestamps_fail_closed() {
        let private = load_private_key(MERCHANT_PRIVATE).unwrap();
        let public = load_public_key(MERCHANT_PUBLIC).unwrap();
        let now = Utc::now();

        for ts in [i64::MIN, i64::MAX] {
            let mut p = params(&[("out_trade_no", "NL1"), ("timestamp", ts.to_string().as_str())]);
            let s = sign(&p, &private).unwrap();
            p.insert("sign".to_string(), s);
            assert!(!verify(&p, &public, now));

            // Unsigned garbage is rejected the same way
            p.insert("sign".to_string(), "AAAA".to_string());
            assert!(!verify(&p, &public, now));
        }
    }

    #[test]
    fn test_blank_timestamp_is_absent() {
        let private = load_private_key(MERCHANT_PRIVATE).unwrap();
        let public = load_public_key(MERCHANT_PUBLIC).unwrap();

        let mut p = params(&[("out_trade_no", "NL1"), ("timestamp", " ")]);
        let s = sign(&p, &private).unwrap();
        p.insert("sign".to_string(), s);
        assert!(verify(&p, &public, Utc::now()));
    }

    #[test]
    fn test_codec_without_keys() {
        let codec = SignatureCodec::from_key_material("", "garbage");
        assert!(!codec.can_sign());
        assert!(matches!(
            codec.sign(&Params::new()),
            Err(EpayError::MissingKey(_))
        ));
        assert!(!codec.verify(&params(&[("sign", "abc")])));
    }
}
