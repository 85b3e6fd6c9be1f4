//! RSA key loading
//!
//! Key material comes from config as PEM (PKCS#8 / SPKI, or PKCS#1 for
//! private keys) or as the bare base64 body of the PEM.

use crate::error::{EpayError, EpayResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

fn is_pem(material: &str) -> bool {
    material.trim_start().starts_with("-----BEGIN")
}

/// Base64 body without whitespace or line breaks
fn decode_body(material: &str, which: &'static str) -> EpayResult<Vec<u8>> {
    let compact: String = material.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).map_err(|e| EpayError::InvalidKey {
        which,
        reason: format!("base64: {}", e),
    })
}

/// Merchant private key, used to sign outbound requests
pub fn load_private_key(material: &str) -> EpayResult<RsaPrivateKey> {
    const WHICH: &str = "merchant private";
    let invalid = |reason: String| EpayError::InvalidKey { which: WHICH, reason };

    if material.trim().is_empty() {
        return Err(EpayError::MissingKey(WHICH));
    }

    if is_pem(material) {
        let pem = material.trim();
        if pem.contains("BEGIN RSA PRIVATE KEY") {
            return RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| invalid(e.to_string()));
        }
        return RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| invalid(e.to_string()));
    }

    let der = decode_body(material, WHICH)?;
    RsaPrivateKey::from_pkcs8_der(&der)
        .or_else(|_| RsaPrivateKey::from_pkcs1_der(&der))
        .map_err(|e| invalid(e.to_string()))
}

/// Gateway public key, used to verify inbound notifications
pub fn load_public_key(material: &str) -> EpayResult<RsaPublicKey> {
    const WHICH: &str = "platform public";
    let invalid = |reason: String| EpayError::InvalidKey { which: WHICH, reason };

    if material.trim().is_empty() {
        return Err(EpayError::MissingKey(WHICH));
    }

    if is_pem(material) {
        return RsaPublicKey::from_public_key_pem(material.trim()).map_err(|e| invalid(e.to_string()));
    }

    let der = decode_body(material, WHICH)?;
    RsaPublicKey::from_public_key_der(&der).map_err(|e| invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE_PEM: &str = include_str!("../tests/fixtures/merchant_private.pem");
    const PUBLIC_PEM: &str = include_str!("../tests/fixtures/merchant_public.pem");

    fn body_of(pem: &str) -> String {
        pem.lines().filter(|l| !l.starts_with("-----")).collect()
    }

    #[test]
    fn test_load_pem_and_bare_body() {
        let from_pem = load_private_key(PRIVATE_PEM).unwrap();
        let from_body = load_private_key(&body_of(PRIVATE_PEM)).unwrap();
        assert_eq!(from_pem, from_body);

        let public = load_public_key(PUBLIC_PEM).unwrap();
        assert_eq!(load_public_key(&body_of(PUBLIC_PEM)).unwrap(), public);
        assert_eq!(RsaPublicKey::from(&from_pem), public);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(load_public_key(""), Err(EpayError::MissingKey(_))));
        assert!(matches!(
            load_public_key("not base64 !!"),
            Err(EpayError::InvalidKey { .. })
        ));
        assert!(matches!(
            load_private_key("AAAA"),
            Err(EpayError::InvalidKey { .. })
        ));
    }
}
