//! Keysets: paired signing and encryption keys under a scoped identity.

use serde::{Deserialize, Serialize};
use sigil_core::hash::domain;
use sigil_core::{
    hash, random_32, stretch, EncryptionKeypair, EncryptionPublicKey, Result, SignaturePublicKey,
    SigningKeypair, SymmetricKey,
};

use crate::scope::{KeyManifest, KeyMetadata, KeyScope};

/// A full keyset with secrets. Never posted to the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyset {
    /// Namespace of the keyset.
    pub scope: KeyScope,
    /// Name within the namespace.
    pub name: String,
    /// Rotation generation.
    pub generation: u32,
    /// Ed25519 keypair.
    pub signature: SigningKeypair,
    /// X25519 keypair.
    pub encryption: EncryptionKeypair,
}

impl Keyset {
    /// Create a keyset, stretching `seed` when supplied or drawing fresh
    /// randomness otherwise.
    pub fn create(metadata: KeyMetadata, seed: Option<&[u8]>) -> Result<Self> {
        let material = match seed {
            Some(seed) => stretch(seed)?,
            None => SymmetricKey(random_32()),
        };
        Ok(Self::from_material(metadata, &material))
    }

    /// Derive a keyset deterministically from 32 bytes of key material.
    ///
    /// The signing and encryption seeds are split under distinct domain
    /// tags so the two keypairs are unrelated.
    pub fn from_material(metadata: KeyMetadata, material: &SymmetricKey) -> Self {
        let signature_seed = hash(domain::SIGNATURE, material.as_bytes());
        let encryption_seed = hash(domain::ENCRYPTION, material.as_bytes());
        Self {
            scope: metadata.scope,
            name: metadata.name,
            generation: metadata.generation,
            signature: SigningKeypair::from_seed(signature_seed.as_bytes()),
            encryption: EncryptionKeypair::from_seed(encryption_seed.as_bytes()),
        }
    }

    /// The metadata triple identifying this keyset.
    pub fn metadata(&self) -> KeyMetadata {
        KeyMetadata {
            scope: self.scope,
            name: self.name.clone(),
            generation: self.generation,
        }
    }

    /// The lockbox addressing form of this keyset.
    pub fn manifest(&self) -> KeyManifest {
        KeyManifest {
            scope: self.scope,
            name: self.name.clone(),
            generation: self.generation,
            public_key: self.encryption.public,
        }
    }

    /// Strip secrets, leaving the postable public form.
    pub fn redact(&self) -> PublicKeyset {
        PublicKeyset {
            scope: self.scope,
            name: self.name.clone(),
            generation: self.generation,
            signature: self.signature.public,
            encryption: self.encryption.public,
        }
    }

    /// Mint the replacement keyset at the next generation with fresh keys.
    pub fn rotated(&self) -> Result<Keyset> {
        Keyset::create(self.metadata().next_generation(), None)
    }
}

/// The public half of a keyset, as posted on the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyset {
    /// Namespace of the keyset.
    pub scope: KeyScope,
    /// Name within the namespace.
    pub name: String,
    /// Rotation generation.
    pub generation: u32,
    /// Ed25519 verifying key.
    pub signature: SignaturePublicKey,
    /// X25519 public key.
    pub encryption: EncryptionPublicKey,
}

impl PublicKeyset {
    /// The metadata triple identifying this keyset.
    pub fn metadata(&self) -> KeyMetadata {
        KeyMetadata {
            scope: self.scope,
            name: self.name.clone(),
            generation: self.generation,
        }
    }

    /// The lockbox addressing form of this keyset.
    pub fn manifest(&self) -> KeyManifest {
        KeyManifest {
            scope: self.scope,
            name: self.name.clone(),
            generation: self.generation,
            public_key: self.encryption,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_creation_is_deterministic() {
        let a = Keyset::create(KeyMetadata::team(), Some(b"a-seed")).unwrap();
        let b = Keyset::create(KeyMetadata::team(), Some(b"a-seed")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unseeded_creation_is_random() {
        let a = Keyset::create(KeyMetadata::team(), None).unwrap();
        let b = Keyset::create(KeyMetadata::team(), None).unwrap();
        assert_ne!(a.signature.public, b.signature.public);
    }

    #[test]
    fn signing_and_encryption_keys_differ() {
        let keyset = Keyset::create(KeyMetadata::team(), Some(b"seed")).unwrap();
        assert_ne!(
            keyset.signature.secret.0, keyset.encryption.secret.0,
            "domain tags split the derivation"
        );
    }

    #[test]
    fn redact_strips_secrets() {
        let keyset = Keyset::create(KeyMetadata::admin(), Some(b"seed")).unwrap();
        let public = keyset.redact();
        assert_eq!(public.signature, keyset.signature.public);
        assert_eq!(public.metadata(), keyset.metadata());
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains(&keyset.signature.secret.to_string()));
    }

    #[test]
    fn rotation_advances_generation() {
        let keyset = Keyset::create(KeyMetadata::team(), None).unwrap();
        let next = keyset.rotated().unwrap();
        assert_eq!(next.generation, 1);
        assert!(next.metadata().same_scope(&keyset.metadata()));
        assert_ne!(next.encryption.public, keyset.encryption.public);
    }
}
