//! Password / invitation-secret stretching.
//!
//! Argon2id with default parameters and a fixed domain salt. The salt is
//! fixed on purpose: both ends of an invitation must re-derive the same
//! key material from nothing but the shared secret.

use argon2::Argon2;

use super::keys::SymmetricKey;
use crate::error::{Error, Result};

const STRETCH_SALT: &[u8] = b"sigil/stretch/v1";

/// Stretch a low-entropy secret into 32 bytes of key material.
///
/// Deliberately slow; call once per secret and cache the result.
pub fn stretch(secret: &[u8]) -> Result<SymmetricKey> {
    let mut out = [0u8; 32];
    Argon2::default()
        .hash_password_into(secret, STRETCH_SALT, &mut out)
        .map_err(|e| Error::invalid(format!("key stretch failed: {e}")))?;
    Ok(SymmetricKey(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(stretch(b"hello").unwrap(), stretch(b"hello").unwrap());
    }

    #[test]
    fn distinct_inputs_distinct_outputs() {
        assert_ne!(stretch(b"hello").unwrap(), stretch(b"world").unwrap());
    }
}
