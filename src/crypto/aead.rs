//! Authenticated encryption: ChaCha20-Poly1305 with a random nonce per
//! message (spec §4.8). Used to seal sensitive metadata at rest (e.g. a
//! PoA's formal-requirements attachments) when a component needs
//! confidentiality, not just integrity (that's the MAC's job, see
//! [`crate::crypto::mac`]).

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

/// AEAD-specific failure. Deliberately does not implement `Display` beyond a
/// generic message — no plaintext, key, or nonce detail ever leaks here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AeadError {
    /// Encryption or decryption failed (wrong key, tampered ciphertext, or
    /// truncated input).
    #[error("AEAD operation failed")]
    Failed,
    /// Key material was not exactly 32 bytes.
    #[error("AEAD key must be 32 bytes")]
    InvalidKeyLength,
}

/// A 32-byte ChaCha20-Poly1305 key, zeroized on drop.
pub struct AeadKey([u8; 32]);

impl AeadKey {
    /// Wrap raw key bytes.
    ///
    /// # Errors
    /// Returns [`AeadError::InvalidKeyLength`] if `bytes.len() != 32`.
    pub fn new(bytes: &[u8]) -> Result<Self, AeadError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| AeadError::InvalidKeyLength)?;
        Ok(Self(arr))
    }

    /// Generate a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl Drop for AeadKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Encrypt `plaintext`, returning `nonce || ciphertext` (nonce is 12 bytes,
/// prepended so [`decrypt`] is self-contained).
///
/// # Errors
/// Returns [`AeadError::Failed`] if the cipher rejects the operation.
pub fn encrypt(key: &AeadKey, plaintext: &[u8]) -> Result<Vec<u8>, AeadError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));
    let mut nonce_bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| AeadError::Failed)?;

    let mut out = Vec::with_capacity(12 + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a buffer produced by [`encrypt`].
///
/// # Errors
/// Returns [`AeadError::Failed`] if the buffer is too short, the tag does
/// not verify, or the key is wrong.
pub fn decrypt(key: &AeadKey, sealed: &[u8]) -> Result<Vec<u8>, AeadError> {
    if sealed.len() < 12 {
        return Err(AeadError::Failed);
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(12);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher.decrypt(nonce, ciphertext).map_err(|_| AeadError::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_succeeds() {
        let key = AeadKey::generate();
        let sealed = encrypt(&key, b"top secret poa clause").unwrap();
        let opened = decrypt(&key, &sealed).unwrap();
        assert_eq!(opened, b"top secret poa clause");
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let key1 = AeadKey::generate();
        let key2 = AeadKey::generate();
        let sealed = encrypt(&key1, b"data").unwrap();
        assert_eq!(decrypt(&key2, &sealed), Err(AeadError::Failed));
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let key = AeadKey::generate();
        let mut sealed = encrypt(&key, b"data").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert_eq!(decrypt(&key, &sealed), Err(AeadError::Failed));
    }

    #[test]
    fn nonces_differ_across_calls() {
        let key = AeadKey::generate();
        let a = encrypt(&key, b"data").unwrap();
        let b = encrypt(&key, b"data").unwrap();
        assert_ne!(a, b, "random nonce must vary ciphertext across calls");
    }
}
