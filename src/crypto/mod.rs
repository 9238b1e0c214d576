//! Cryptographic primitives (spec §4.8).
//!
//! Every subsystem that needs randomness, a keyed MAC, authenticated
//! encryption, a KDF, or asymmetric signing goes through this module so the
//! choice of algorithm and parameters lives in exactly one place.

pub mod aead;
pub mod kdf;
pub mod mac;
pub mod random;
pub mod signing;

pub use aead::{AeadError, decrypt, encrypt};
pub use kdf::{KdfParams, derive_key};
pub use mac::{Hmac256Key, compute_mac, verify_mac};
pub use random::{generate_id, generate_nonce, generate_token_value};
pub use signing::KeyManager;

/// Constant-time byte-slice equality. Used anywhere a secret is compared
/// against attacker-controlled input (MACs, token values, API keys).
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_detects_equal_and_unequal() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
