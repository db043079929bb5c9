//! Ed25519 signing and verification.

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};

use super::keys::{Signature, SignaturePublicKey, SignatureSecretKey};
use super::random::random_32;
use crate::error::{Error, Result};

/// An Ed25519 keypair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeypair {
    /// Verifying key, safe to publish.
    pub public: SignaturePublicKey,
    /// Signing key, never posted to the graph.
    pub secret: SignatureSecretKey,
}

impl SigningKeypair {
    /// Derive a keypair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing = ed25519_dalek::SigningKey::from_bytes(seed);
        Self {
            public: SignaturePublicKey(signing.verifying_key().to_bytes()),
            secret: SignatureSecretKey(*seed),
        }
    }

    /// Generate a keypair from fresh OS randomness.
    pub fn generate() -> Self {
        Self::from_seed(&random_32())
    }
}

/// Sign a payload with an Ed25519 secret key.
pub fn sign(payload: &[u8], secret: &SignatureSecretKey) -> Signature {
    let signing = ed25519_dalek::SigningKey::from_bytes(&secret.0);
    Signature(signing.sign(payload).to_bytes())
}

/// Verify an Ed25519 signature against a payload and public key.
///
/// Returns `false` both for a bad signature and for a public key that is
/// not a valid curve point.
pub fn verify(payload: &[u8], signature: &Signature, public: &SignaturePublicKey) -> bool {
    let Ok(verifying) = ed25519_dalek::VerifyingKey::from_bytes(&public.0) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying.verify(payload, &sig).is_ok()
}

/// Verify, surfacing an error with context on failure.
pub fn verify_or_err(
    payload: &[u8],
    signature: &Signature,
    public: &SignaturePublicKey,
    context: &str,
) -> Result<()> {
    if verify(payload, signature, public) {
        Ok(())
    } else {
        Err(Error::invalid_signature(context.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let keypair = SigningKeypair::generate();
        let sig = sign(b"message", &keypair.secret);
        assert!(verify(b"message", &sig, &keypair.public));
    }

    #[test]
    fn tampered_payload_rejected() {
        let keypair = SigningKeypair::generate();
        let sig = sign(b"message", &keypair.secret);
        assert!(!verify(b"massage", &sig, &keypair.public));
    }

    #[test]
    fn wrong_key_rejected() {
        let alice = SigningKeypair::generate();
        let eve = SigningKeypair::generate();
        let sig = sign(b"message", &alice.secret);
        assert!(!verify(b"message", &sig, &eve.public));
    }

    #[test]
    fn seed_derivation_is_deterministic() {
        let a = SigningKeypair::from_seed(&[9u8; 32]);
        let b = SigningKeypair::from_seed(&[9u8; 32]);
        assert_eq!(a.public, b.public);
    }
}
