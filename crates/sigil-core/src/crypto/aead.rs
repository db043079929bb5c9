//! Symmetric authenticated encryption.
//!
//! XChaCha20-Poly1305 with a fresh 24-byte nonce prefixed to the
//! ciphertext. The extended nonce makes random nonces safe without
//! per-key counters.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;

use super::keys::SymmetricKey;
use crate::error::{Error, Result};

const NONCE_LEN: usize = 24;

/// Encrypt a payload under a symmetric key.
pub fn aead_encrypt(plaintext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| Error::decryption("AEAD encryption failed"))?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a payload produced by [`aead_encrypt`].
pub fn aead_decrypt(bytes: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
    if bytes.len() < NONCE_LEN {
        return Err(Error::decryption("AEAD payload shorter than nonce"));
    }
    let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::decryption("AEAD authentication failed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::random::random_key;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = random_key();
        let sealed = aead_encrypt(b"payload", &key).unwrap();
        assert_eq!(aead_decrypt(&sealed, &key).unwrap(), b"payload");
    }

    #[test]
    fn wrong_key_rejected() {
        let sealed = aead_encrypt(b"payload", &random_key()).unwrap();
        assert!(aead_decrypt(&sealed, &random_key()).is_err());
    }

    #[test]
    fn truncated_payload_rejected() {
        let key = random_key();
        let sealed = aead_encrypt(b"payload", &key).unwrap();
        assert!(aead_decrypt(&sealed[..10], &key).is_err());
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let key = random_key();
        let mut sealed = aead_encrypt(b"payload", &key).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(aead_decrypt(&sealed, &key).is_err());
    }
}
