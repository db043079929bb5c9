//! Lockboxes: sealed keyset distribution.
//!
//! A lockbox sealed to keyset R holding keyset C means any holder of R's
//! secret encryption key can recover C in full. The sender side uses a
//! single-use ephemeral keypair so lockboxes carry no long-lived sender
//! identity.

use serde::{Deserialize, Serialize};
use sigil_core::{canonical, encoding, seal, unseal, EncryptionKeypair, EncryptionPublicKey, EncryptionSecretKey, Error, Result};

use crate::keyset::{Keyset, PublicKeyset};
use crate::scope::KeyManifest;

/// A keyset sealed to a recipient keyset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockbox {
    /// Single-use ephemeral public key the payload was sealed with.
    pub encryption_key: EncryptionPublicKey,
    /// Which keyset can open this lockbox.
    pub recipient: KeyManifest,
    /// Which keyset is inside.
    pub contents: KeyManifest,
    /// Sealed serialized keyset.
    #[serde(with = "encoding::b64")]
    pub encrypted_payload: Vec<u8>,
}

impl Lockbox {
    /// Seal `contents` to `recipient`.
    pub fn create(contents: &Keyset, recipient: &PublicKeyset) -> Result<Lockbox> {
        let ephemeral = EncryptionKeypair::generate();
        let payload = canonical::to_vec(contents)?;
        let encrypted_payload = seal(&payload, &recipient.encryption, &ephemeral.secret)?;
        Ok(Lockbox {
            encryption_key: ephemeral.public,
            recipient: recipient.manifest(),
            contents: contents.manifest(),
            encrypted_payload,
        })
    }

    /// Seal `contents` to a recipient known only by manifest.
    ///
    /// Rotation reseals to holders recorded in earlier lockboxes, where
    /// only the recipient's manifest (not its full public keyset) is
    /// available.
    pub fn create_for_manifest(contents: &Keyset, recipient: &KeyManifest) -> Result<Lockbox> {
        let ephemeral = EncryptionKeypair::generate();
        let payload = canonical::to_vec(contents)?;
        let encrypted_payload = seal(&payload, &recipient.public_key, &ephemeral.secret)?;
        Ok(Lockbox {
            encryption_key: ephemeral.public,
            recipient: recipient.clone(),
            contents: contents.manifest(),
            encrypted_payload,
        })
    }

    /// Open with the recipient's secret encryption key.
    pub fn open(&self, recipient_secret: &EncryptionSecretKey) -> Result<Keyset> {
        let payload = unseal(&self.encrypted_payload, &self.encryption_key, recipient_secret)
            .map_err(|_| {
                Error::decryption(format!(
                    "lockbox for {:?}/{} could not be opened",
                    self.contents.scope, self.contents.name
                ))
            })?;
        let keyset: Keyset = canonical::from_slice(&payload)?;
        if keyset.manifest() != self.contents {
            return Err(Error::invalid(
                "lockbox contents do not match the advertised manifest",
            ));
        }
        Ok(keyset)
    }

    /// Reissue this lockbox to the same recipient key with rotated contents.
    ///
    /// The new contents must be the next generation of the same scope.
    pub fn rotate(&self, new_contents: &Keyset) -> Result<Lockbox> {
        if !new_contents
            .metadata()
            .same_scope(&self.contents.metadata())
            || new_contents.generation != self.contents.generation + 1
        {
            return Err(Error::invalid(format!(
                "rotated lockbox contents must be {:?}/{} at generation {}",
                self.contents.scope,
                self.contents.name,
                self.contents.generation + 1
            )));
        }
        let ephemeral = EncryptionKeypair::generate();
        let payload = canonical::to_vec(new_contents)?;
        let encrypted_payload = seal(&payload, &self.recipient.public_key, &ephemeral.secret)?;
        Ok(Lockbox {
            encryption_key: ephemeral.public,
            recipient: self.recipient.clone(),
            contents: new_contents.manifest(),
            encrypted_payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::KeyMetadata;

    fn member_keys(name: &str) -> Keyset {
        Keyset::create(KeyMetadata::member(name), None).unwrap()
    }

    #[test]
    fn create_and_open() {
        let team = Keyset::create(KeyMetadata::team(), None).unwrap();
        let alice = member_keys("alice");
        let lockbox = Lockbox::create(&team, &alice.redact()).unwrap();
        let opened = lockbox.open(&alice.encryption.secret).unwrap();
        assert_eq!(opened, team);
    }

    #[test]
    fn wrong_recipient_cannot_open() {
        let team = Keyset::create(KeyMetadata::team(), None).unwrap();
        let alice = member_keys("alice");
        let eve = member_keys("eve");
        let lockbox = Lockbox::create(&team, &alice.redact()).unwrap();
        assert!(lockbox.open(&eve.encryption.secret).is_err());
    }

    #[test]
    fn rotate_keeps_recipient() {
        let team = Keyset::create(KeyMetadata::team(), None).unwrap();
        let alice = member_keys("alice");
        let lockbox = Lockbox::create(&team, &alice.redact()).unwrap();

        let rotated_team = team.rotated().unwrap();
        let rotated = lockbox.rotate(&rotated_team).unwrap();
        assert_eq!(rotated.recipient, lockbox.recipient);
        assert_eq!(rotated.contents.generation, 1);
        assert_eq!(rotated.open(&alice.encryption.secret).unwrap(), rotated_team);
    }

    #[test]
    fn rotate_rejects_generation_skip() {
        let team = Keyset::create(KeyMetadata::team(), None).unwrap();
        let alice = member_keys("alice");
        let lockbox = Lockbox::create(&team, &alice.redact()).unwrap();

        let skipped = Keyset::create(KeyMetadata::team().with_generation(5), None).unwrap();
        assert!(lockbox.rotate(&skipped).is_err());
    }
}
