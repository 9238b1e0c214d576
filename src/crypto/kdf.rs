//! Key derivation via Argon2id (spec §4.8 defaults: t=1, m=64MiB, p=4,
//! outLen=32), used when a symmetric key must be derived from a
//! lower-entropy secret (e.g. an operator-supplied passphrase for the audit
//! HMAC key) rather than generated directly.

use argon2::{Algorithm, Argon2, Params, Version};

use crate::Error;

/// Argon2id parameters. Defaults match spec §4.8 exactly; override only for
/// tests, where the real parameters would make the suite too slow.
#[derive(Debug, Clone, Copy)]
pub struct KdfParams {
    /// Iterations (`t`).
    pub iterations: u32,
    /// Memory cost in KiB (`m`). Spec default is 64MiB = 65536 KiB.
    pub memory_kib: u32,
    /// Parallelism (`p`).
    pub parallelism: u32,
    /// Output key length in bytes.
    pub output_len: usize,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: 1,
            memory_kib: 64 * 1024,
            parallelism: 4,
            output_len: 32,
        }
    }
}

/// Derive a key from `secret` and `salt` using Argon2id.
///
/// # Errors
/// Returns [`Error::CryptoFailure`] if the parameters are invalid or
/// derivation otherwise fails.
pub fn derive_key(secret: &[u8], salt: &[u8], params: KdfParams) -> Result<Vec<u8>, Error> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(params.output_len),
    )
    .map_err(|_| Error::CryptoFailure)?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);
    let mut out = vec![0u8; params.output_len];
    argon2
        .hash_password_into(secret, salt, &mut out)
        .map_err(|_| Error::CryptoFailure)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> KdfParams {
        KdfParams {
            iterations: 1,
            memory_kib: 8 * 1024,
            parallelism: 1,
            output_len: 32,
        }
    }

    #[test]
    fn derivation_is_deterministic_for_same_inputs() {
        let a = derive_key(b"correct horse battery staple", b"fixed-salt-1234", fast_params()).unwrap();
        let b = derive_key(b"correct horse battery staple", b"fixed-salt-1234", fast_params()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn different_salts_produce_different_keys() {
        let a = derive_key(b"same secret", b"salt-aaaaaaaaaa1", fast_params()).unwrap();
        let b = derive_key(b"same secret", b"salt-bbbbbbbbbb1", fast_params()).unwrap();
        assert_ne!(a, b);
    }
}
