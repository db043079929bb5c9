//! OS randomness helpers.

use rand::rngs::OsRng;
use rand::RngCore;

use super::keys::SymmetricKey;

/// Fill a fresh buffer with `n` random bytes.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; n];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate 32 random bytes.
pub fn random_32() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate a random symmetric key.
pub fn random_key() -> SymmetricKey {
    SymmetricKey(random_32())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_length() {
        assert_eq!(random_bytes(16).len(), 16);
        assert_eq!(random_bytes(0).len(), 0);
    }

    #[test]
    fn not_constant() {
        assert_ne!(random_32(), random_32());
    }
}
