//! Invitation creation and validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use sigil_core::hash::domain;
use sigil_core::{
    aead_decrypt, aead_encrypt, canonical, encoding, hash, Error, Result, SignaturePublicKey,
    SymmetricKey,
};

use crate::proof::ProofOfInvitation;
use crate::seed::derive_signing_keypair;

/// Whether an invitation admits a new member or a new device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationType {
    /// Admits a new member to the team.
    Member,
    /// Admits a new device for an existing member.
    Device,
}

/// Public invitation identifier, derived from the seed's signing key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InvitationId(pub String);

impl InvitationId {
    pub(crate) fn derive(public_key: &SignaturePublicKey) -> Self {
        Self(encoding::encode(
            hash(domain::INVITATION_ID, public_key.as_bytes()).as_bytes(),
        ))
    }

    /// View as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvitationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The sealed invitation body, visible only to team members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationPayload {
    /// Member or device invitation.
    pub invitation_type: InvitationType,
    /// User name (member invitations) or device id (device invitations).
    pub name: String,
    /// The seed-derived public signing key.
    pub public_key: SignaturePublicKey,
    /// Roles granted on admission (member invitations only).
    pub roles: Vec<String>,
    /// Unix-ms expiration, 0 for none.
    pub expiration: u64,
    /// Maximum number of admissions, 0 for unlimited.
    pub max_uses: u32,
}

/// Inputs to [`Invitation::create`].
#[derive(Debug, Clone)]
pub struct InvitationOptions {
    /// Member or device invitation.
    pub invitation_type: InvitationType,
    /// User name (member invitations) or device id (device invitations).
    pub name: String,
    /// The shared secret. Normalized before stretching.
    pub seed: String,
    /// Roles granted on admission.
    pub roles: Vec<String>,
    /// Unix-ms expiration, 0 for none.
    pub expiration: u64,
    /// Maximum number of admissions, 0 for unlimited.
    pub max_uses: u32,
}

impl InvitationOptions {
    /// A single-use, non-expiring member invitation.
    pub fn member(name: impl Into<String>, seed: impl Into<String>) -> Self {
        Self {
            invitation_type: InvitationType::Member,
            name: name.into(),
            seed: seed.into(),
            roles: Vec::new(),
            expiration: 0,
            max_uses: 1,
        }
    }

    /// A single-use, non-expiring device invitation.
    pub fn device(device_id: impl Into<String>, seed: impl Into<String>) -> Self {
        Self {
            invitation_type: InvitationType::Device,
            name: device_id.into(),
            seed: seed.into(),
            roles: Vec::new(),
            expiration: 0,
            max_uses: 1,
        }
    }
}

/// The posted, public form of an invitation.
///
/// The body is sealed under the team key; outsiders see only the id, the
/// derived public signing key, and the use/expiry limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    /// Public invitation id.
    pub id: InvitationId,
    /// Member or device invitation.
    pub invitation_type: InvitationType,
    /// AEAD-sealed [`InvitationPayload`].
    #[serde(with = "encoding::b64")]
    pub encrypted_payload: Vec<u8>,
    /// The seed-derived public signing key proofs are checked against.
    pub public_signing_key: SignaturePublicKey,
    /// Maximum number of admissions, 0 for unlimited.
    pub max_uses: u32,
    /// Unix-ms expiration, 0 for none.
    pub expiration: u64,
}

impl Invitation {
    /// Mint an invitation from a shared seed, sealed under the team key.
    pub fn create(team_key: &SymmetricKey, options: InvitationOptions) -> Result<Invitation> {
        let keypair = derive_signing_keypair(&options.seed)?;
        let id = InvitationId::derive(&keypair.public);
        let payload = InvitationPayload {
            invitation_type: options.invitation_type,
            name: options.name,
            public_key: keypair.public,
            roles: options.roles,
            expiration: options.expiration,
            max_uses: options.max_uses,
        };
        let encrypted_payload = aead_encrypt(&canonical::to_vec(&payload)?, team_key)?;
        Ok(Invitation {
            id,
            invitation_type: options.invitation_type,
            encrypted_payload,
            public_signing_key: keypair.public,
            max_uses: options.max_uses,
            expiration: options.expiration,
        })
    }

    /// Open the sealed body with the team key.
    pub fn open_payload(&self, team_key: &SymmetricKey) -> Result<InvitationPayload> {
        let bytes = aead_decrypt(&self.encrypted_payload, team_key)
            .map_err(|_| Error::decryption(format!("invitation {} body", self.id)))?;
        canonical::from_slice(&bytes)
    }

    /// Check a proof of this invitation.
    ///
    /// Verifies that the sealed body matches the posted key, that the
    /// invitation has not expired at `now`, that the principal in the
    /// proof is the invited one, and that the proof signature verifies
    /// against the seed-derived key. Use/revocation bookkeeping lives in
    /// team state, not here.
    pub fn validate(
        &self,
        proof: &ProofOfInvitation,
        team_key: &SymmetricKey,
        now: u64,
    ) -> Result<()> {
        let payload = self.open_payload(team_key)?;
        if payload.public_key != self.public_signing_key {
            return Err(Error::graph_corrupt(format!(
                "invitation {} body does not match its posted key",
                self.id
            )));
        }
        if self.expiration != 0 && now > self.expiration {
            return Err(Error::InvitationExpired {
                id: self.id.to_string(),
            });
        }
        if proof.id != self.id {
            return Err(Error::InvitationNotFound {
                id: proof.id.to_string(),
            });
        }
        if proof.invitation_type != payload.invitation_type
            || proof.payload.name != payload.name
        {
            return Err(Error::name_mismatch(format!(
                "proof names {:?} but invitation {} was issued for {:?}",
                proof.payload.name, self.id, payload.name
            )));
        }
        proof.verify(&self.public_signing_key)
    }
}
