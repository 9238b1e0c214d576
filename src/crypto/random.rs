//! Secure random generation for ids, nonces, and token values: a UUID v4
//! for opaque identifiers and a 256-bit URL-safe-base64 random string for
//! the bearer-like token value, both drawn from `rand`'s OS-backed RNG.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;

/// Generate a UUID v4 suitable for a token `id` (JTI), a request id
/// component, or a PoA/grant identifier.
#[must_use]
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate the opaque token `value`: 256 bits of CSPRNG output, URL-safe
/// base64 encoded, prefixed so it is greppable/detectable by secret
/// scanners.
#[must_use]
pub fn generate_token_value() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    format!("poa_{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a 128-bit random nonce component, hex-encoded. Combined by
/// callers (e.g. the issuer) with a sequence counter and a timestamp to form
/// a full request id (spec §4.1 step 1).
#[must_use]
pub fn generate_nonce() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_id_produces_distinct_uuids() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn generate_token_value_has_256_bits_of_entropy_and_prefix() {
        let v = generate_token_value();
        assert!(v.starts_with("poa_"));
        assert!(v.len() > 40);
        assert_ne!(generate_token_value(), generate_token_value());
    }

    #[test]
    fn generate_nonce_is_32_hex_chars() {
        let n = generate_nonce();
        assert_eq!(n.len(), 32);
        assert!(n.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
