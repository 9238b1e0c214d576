//! Keyed MAC (HMAC-SHA256) with constant-time verification (spec §4.8, §4.6).
//!
//! Used directly by the audit log (each entry's `mac` field) and available
//! for any component that needs tamper-evidence without full asymmetric
//! signing. Key handling follows `zeroize` hygiene: the key is wiped when
//! dropped.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// An HMAC-SHA256 key. Must be at least 32 bytes (spec §4.8).
#[derive(Clone)]
pub struct Hmac256Key(Vec<u8>);

impl Hmac256Key {
    /// Wrap raw key bytes.
    ///
    /// # Errors
    /// Returns [`Error::MissingKey`] if `bytes` is shorter than 32 bytes.
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 32 {
            return Err(Error::MissingKey);
        }
        Ok(Self(bytes))
    }

    /// Generate a fresh, cryptographically random 32-byte key.
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::Rng::random(&mut rand::rng());
        Self(bytes.to_vec())
    }
}

impl Drop for Hmac256Key {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Compute `HMAC-SHA256(key, message)`, hex-encoded.
///
/// # Errors
/// Returns [`Error::CryptoFailure`] if the underlying HMAC cannot be keyed
/// (practically unreachable for `Hmac<Sha256>`, which accepts any key
/// length, but kept fallible so callers don't need to special-case it).
pub fn compute_mac(key: &Hmac256Key, message: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(&key.0).map_err(|_| Error::CryptoFailure)?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Recompute the MAC over `message` and compare it against `expected` in
/// constant time.
///
/// # Errors
/// Returns [`Error::IntegrityFailure`] on mismatch, [`Error::CryptoFailure`]
/// if the MAC could not be computed at all.
pub fn verify_mac(key: &Hmac256Key, message: &[u8], expected: &str) -> Result<()> {
    let computed = compute_mac(key, message)?;
    if super::constant_time_eq(computed.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(Error::IntegrityFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_roundtrips() {
        let key = Hmac256Key::generate();
        let mac = compute_mac(&key, b"hello world").unwrap();
        verify_mac(&key, b"hello world", &mac).unwrap();
    }

    #[test]
    fn tampered_message_fails_verification() {
        let key = Hmac256Key::generate();
        let mac = compute_mac(&key, b"hello world").unwrap();
        let result = verify_mac(&key, b"hello world!", &mac);
        assert_eq!(result, Err(Error::IntegrityFailure));
    }

    #[test]
    fn short_key_is_rejected() {
        let result = Hmac256Key::new(vec![0u8; 16]);
        assert!(result.is_err());
    }
}
