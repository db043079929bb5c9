//! Asymmetric authenticated encryption (sealed boxes).
//!
//! `seal` binds sender and recipient: the payload key is derived from the
//! X25519 shared secret of (sender secret, recipient public), so only the
//! recipient can open it and only against the claimed sender's public key.

use serde::{Deserialize, Serialize};

use super::aead::{aead_decrypt, aead_encrypt};
use super::keys::{EncryptionPublicKey, EncryptionSecretKey, SymmetricKey};
use super::random::random_32;
use crate::error::Result;
use crate::hash::{domain, hash};

/// An X25519 keypair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKeypair {
    /// Public key, safe to publish.
    pub public: EncryptionPublicKey,
    /// Secret key, never posted to the graph.
    pub secret: EncryptionSecretKey,
}

impl EncryptionKeypair {
    /// Derive a keypair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let secret = x25519_dalek::StaticSecret::from(*seed);
        let public = x25519_dalek::PublicKey::from(&secret);
        Self {
            public: EncryptionPublicKey(public.to_bytes()),
            secret: EncryptionSecretKey(*seed),
        }
    }

    /// Generate a keypair from fresh OS randomness.
    pub fn generate() -> Self {
        Self::from_seed(&random_32())
    }
}

fn shared_key(secret: &EncryptionSecretKey, public: &EncryptionPublicKey) -> SymmetricKey {
    let secret = x25519_dalek::StaticSecret::from(secret.0);
    let public = x25519_dalek::PublicKey::from(public.0);
    let shared = secret.diffie_hellman(&public);
    SymmetricKey(hash(domain::SEAL, shared.as_bytes()).to_bytes())
}

/// Seal a payload to a recipient, authenticated by the sender.
pub fn seal(
    plaintext: &[u8],
    recipient_public: &EncryptionPublicKey,
    sender_secret: &EncryptionSecretKey,
) -> Result<Vec<u8>> {
    let key = shared_key(sender_secret, recipient_public);
    aead_encrypt(plaintext, &key)
}

/// Open a sealed payload as the recipient, verifying the sender.
pub fn unseal(
    sealed: &[u8],
    sender_public: &EncryptionPublicKey,
    recipient_secret: &EncryptionSecretKey,
) -> Result<Vec<u8>> {
    let key = shared_key(recipient_secret, sender_public);
    aead_decrypt(sealed, &key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_round_trip() {
        let sender = EncryptionKeypair::generate();
        let recipient = EncryptionKeypair::generate();
        let sealed = seal(b"secret payload", &recipient.public, &sender.secret).unwrap();
        let opened = unseal(&sealed, &sender.public, &recipient.secret).unwrap();
        assert_eq!(opened, b"secret payload");
    }

    #[test]
    fn wrong_recipient_cannot_open() {
        let sender = EncryptionKeypair::generate();
        let recipient = EncryptionKeypair::generate();
        let eve = EncryptionKeypair::generate();
        let sealed = seal(b"secret payload", &recipient.public, &sender.secret).unwrap();
        assert!(unseal(&sealed, &sender.public, &eve.secret).is_err());
    }

    #[test]
    fn wrong_claimed_sender_rejected() {
        let sender = EncryptionKeypair::generate();
        let recipient = EncryptionKeypair::generate();
        let eve = EncryptionKeypair::generate();
        let sealed = seal(b"secret payload", &recipient.public, &sender.secret).unwrap();
        assert!(unseal(&sealed, &eve.public, &recipient.secret).is_err());
    }

    #[test]
    fn ciphertext_is_randomized() {
        let sender = EncryptionKeypair::generate();
        let recipient = EncryptionKeypair::generate();
        let a = seal(b"payload", &recipient.public, &sender.secret).unwrap();
        let b = seal(b"payload", &recipient.public, &sender.secret).unwrap();
        assert_ne!(a, b, "fresh nonce per seal");
    }

    #[test]
    fn seed_derivation_is_deterministic() {
        let a = EncryptionKeypair::from_seed(&random_32());
        let b = EncryptionKeypair::from_seed(&a.secret.0);
        assert_eq!(a.public, b.public);
    }
}
