//! Asymmetric token signing: RSA-2048 / RS256 (spec §4.8), with a
//! `RotateKeys()` hook that retains the previous public key for a grace
//! window so in-flight tokens signed just before rotation still validate
//! (load new material, keep the old material valid until the caller
//! decides to drop it). Uses `jsonwebtoken`'s `aws_lc_rs` backend for RS256
//! (avoids the `rsa` crate's RUSTSEC-2023-0071 timing side channel).
//!
//! Key *generation* is explicitly out of scope (spec §1 Non-goals: "key
//! management ceremony beyond rotation hooks") — `KeyManager` is
//! constructed from caller-supplied PEM material and only orchestrates
//! sign/verify/rotate.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use parking_lot::RwLock;
use serde::{Serialize, de::DeserializeOwned};

use crate::{Error, Result};

struct KeyState {
    signing_key: EncodingKey,
    current_public: DecodingKey,
    /// Previous public key, retained for one rotation's grace window.
    previous_public: Option<DecodingKey>,
}

/// Owns the current signing keypair and the previous public key (if any):
/// reads take a read lock, rotation takes a write lock (spec §5 "Key
/// material: read under RLock; rotation under WLock").
pub struct KeyManager {
    state: Arc<RwLock<KeyState>>,
}

impl KeyManager {
    /// Build a manager from a PKCS#1 RSA private key PEM and its matching
    /// SPKI public key PEM.
    ///
    /// # Errors
    /// Returns [`Error::CryptoFailure`] if either PEM fails to parse.
    pub fn from_rsa_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(private_pem).map_err(|_| Error::CryptoFailure)?;
        let current_public = DecodingKey::from_rsa_pem(public_pem).map_err(|_| Error::CryptoFailure)?;
        Ok(Self {
            state: Arc::new(RwLock::new(KeyState {
                signing_key,
                current_public,
                previous_public: None,
            })),
        })
    }

    /// Sign `claims` as a compact JWS using RS256.
    ///
    /// # Errors
    /// Returns [`Error::CryptoFailure`] if signing fails.
    pub fn sign<C: Serialize>(&self, claims: &C) -> Result<String> {
        let state = self.state.read();
        encode(&Header::new(Algorithm::RS256), claims, &state.signing_key)
            .map_err(|_| Error::CryptoFailure)
    }

    /// Verify and decode `token`, trying the current public key first and
    /// falling back to the previous one (grace window after rotation).
    ///
    /// # Errors
    /// Returns [`Error::InvalidToken`] if neither key validates the token.
    pub fn verify<C: DeserializeOwned>(&self, token: &str) -> Result<C> {
        let state = self.state.read();
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false; // token-level expiry is the issuer's job (spec §4.1), not the JWS layer's.
        validation.validate_aud = false; // audience is matched explicitly by the caller (spec §4.1), not this layer.

        if let Ok(data) = decode::<C>(token, &state.current_public, &validation) {
            return Ok(data.claims);
        }
        if let Some(prev) = &state.previous_public
            && let Ok(data) = decode::<C>(token, prev, &validation)
        {
            return Ok(data.claims);
        }
        Err(Error::InvalidToken)
    }

    /// Rotate to a new keypair, retaining the current public key as the
    /// "previous" one for exactly one rotation's grace window.
    ///
    /// # Errors
    /// Returns [`Error::CryptoFailure`] if the new PEM material fails to parse.
    pub fn rotate_keys(&self, new_private_pem: &[u8], new_public_pem: &[u8]) -> Result<()> {
        let new_signing_key =
            EncodingKey::from_rsa_pem(new_private_pem).map_err(|_| Error::CryptoFailure)?;
        let new_public = DecodingKey::from_rsa_pem(new_public_pem).map_err(|_| Error::CryptoFailure)?;

        let mut state = self.state.write();
        let retiring_public = std::mem::replace(&mut state.current_public, new_public);
        state.signing_key = new_signing_key;
        state.previous_public = Some(retiring_public);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const PRIV1: &[u8] = include_bytes!("../../tests/fixtures/rsa_priv1_pkcs1.pem");
    const PUB1: &[u8] = include_bytes!("../../tests/fixtures/rsa_pub1_spki.pem");
    const PRIV2: &[u8] = include_bytes!("../../tests/fixtures/rsa_priv2_pkcs1.pem");
    const PUB2: &[u8] = include_bytes!("../../tests/fixtures/rsa_pub2_spki.pem");
    const PRIV3: &[u8] = include_bytes!("../../tests/fixtures/rsa_priv3_pkcs1.pem");
    const PUB3: &[u8] = include_bytes!("../../tests/fixtures/rsa_pub3_spki.pem");

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct TestClaims {
        sub: String,
        exp: i64,
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let km = KeyManager::from_rsa_pem(PRIV1, PUB1).unwrap();
        let claims = TestClaims { sub: "client-1".into(), exp: 9_999_999_999 };
        let token = km.sign(&claims).unwrap();
        let decoded: TestClaims = km.verify(&token).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn verify_rejects_token_from_unrelated_key() {
        let km1 = KeyManager::from_rsa_pem(PRIV1, PUB1).unwrap();
        let km2 = KeyManager::from_rsa_pem(PRIV2, PUB2).unwrap();
        let claims = TestClaims { sub: "client-1".into(), exp: 9_999_999_999 };
        let token = km1.sign(&claims).unwrap();
        let result: Result<TestClaims> = km2.verify(&token);
        assert!(result.is_err());
    }

    #[test]
    fn rotation_keeps_previous_key_valid_for_grace_window() {
        let km = KeyManager::from_rsa_pem(PRIV1, PUB1).unwrap();
        let claims = TestClaims { sub: "client-1".into(), exp: 9_999_999_999 };
        let old_token = km.sign(&claims).unwrap();

        km.rotate_keys(PRIV2, PUB2).unwrap();

        // Old token still verifies against the retained previous public key.
        let decoded: TestClaims = km.verify(&old_token).unwrap();
        assert_eq!(decoded, claims);

        // New signatures use the new key and also verify.
        let new_token = km.sign(&claims).unwrap();
        let decoded2: TestClaims = km.verify(&new_token).unwrap();
        assert_eq!(decoded2, claims);
    }

    #[test]
    fn a_second_rotation_drops_the_original_key() {
        let km = KeyManager::from_rsa_pem(PRIV1, PUB1).unwrap();
        let claims = TestClaims { sub: "client-1".into(), exp: 9_999_999_999 };
        let token_v1 = km.sign(&claims).unwrap();

        km.rotate_keys(PRIV2, PUB2).unwrap();
        km.rotate_keys(PRIV3, PUB3).unwrap();

        let result: Result<TestClaims> = km.verify(&token_v1);
        assert!(result.is_err(), "key 1 should have been evicted after two rotations");
    }
}
