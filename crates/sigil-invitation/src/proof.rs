//! Proofs of invitation.

use serde::{Deserialize, Serialize};
use sigil_core::{canonical, sign, verify, Error, Result, Signature, SignaturePublicKey};
use sigil_keyset::{Device, Lockbox, PublicDevice, PublicKeyset, User};

use crate::invitation::{InvitationId, InvitationType};
use crate::seed::derive_signing_keypair;

/// Public info for the principal being admitted: a member's user name and
/// keys, or a device's id and keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalInfo {
    /// User name or device id.
    pub name: String,
    /// The principal's public keyset.
    pub keys: PublicKeyset,
    /// The device being enrolled alongside the principal: a joining
    /// member's first device, or the device itself for device invitations.
    pub device: Option<PublicDevice>,
    /// Lockboxes only the invitee can mint (their member keys sealed to
    /// their own device), posted with the admission.
    pub lockboxes: Vec<Lockbox>,
}

/// What the proof signature covers.
#[derive(Serialize)]
struct ProofBody<'a> {
    id: &'a InvitationId,
    invitation_type: InvitationType,
    payload: &'a PrincipalInfo,
}

/// An invitee's proof that they know the invitation seed.
///
/// The signature is made with the seed-derived secret key and binds the
/// invitee's public principal info, so it can be relayed by anyone without
/// letting them substitute a different principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfInvitation {
    /// Id of the invitation being claimed.
    pub id: InvitationId,
    /// Member or device admission.
    pub invitation_type: InvitationType,
    /// The principal to admit.
    pub payload: PrincipalInfo,
    /// Signature by the seed-derived key over id, type, and principal.
    pub signature: Signature,
}

impl ProofOfInvitation {
    /// Accept a member invitation, enrolling the invitee's first device.
    ///
    /// The invitee holds both their member and device secrets, so only
    /// they can seal the member-to-device lockbox the admission needs.
    pub fn accept_member(seed: &str, user: &User, device: &Device) -> Result<Self> {
        let payload = PrincipalInfo {
            name: user.user_name.clone(),
            keys: user.public_keys(),
            device: Some(device.redact()),
            lockboxes: vec![Lockbox::create(&user.keys, &device.keys.redact())?],
        };
        Self::accept(seed, InvitationType::Member, payload)
    }

    /// Accept a device invitation for one of the inviting member's own
    /// devices. The member-to-device lockbox is sealed by the owner when
    /// the device is admitted.
    pub fn accept_device(seed: &str, device: &Device) -> Result<Self> {
        let payload = PrincipalInfo {
            name: device.device_id.as_str().to_string(),
            keys: device.keys.redact(),
            device: Some(device.redact()),
            lockboxes: Vec::new(),
        };
        Self::accept(seed, InvitationType::Device, payload)
    }

    /// Accept an invitation: re-derive the keypair from the seed and sign
    /// the joining principal's public info.
    pub fn accept(
        seed: &str,
        invitation_type: InvitationType,
        payload: PrincipalInfo,
    ) -> Result<Self> {
        let keypair = derive_signing_keypair(seed)?;
        let id = InvitationId::derive(&keypair.public);
        let body = ProofBody {
            id: &id,
            invitation_type,
            payload: &payload,
        };
        let signature = sign(&canonical::to_vec(&body)?, &keypair.secret);
        Ok(Self {
            id,
            invitation_type,
            payload,
            signature,
        })
    }

    /// Verify the proof signature against the posted invitation key.
    pub fn verify(&self, public_key: &SignaturePublicKey) -> Result<()> {
        let body = ProofBody {
            id: &self.id,
            invitation_type: self.invitation_type,
            payload: &self.payload,
        };
        let bytes = canonical::to_vec(&body)?;
        if verify(&bytes, &self.signature, public_key) {
            Ok(())
        } else {
            Err(Error::invalid_signature(format!(
                "proof of invitation {} by {}",
                self.id, self.payload.name
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_keyset::{KeyMetadata, Keyset};

    fn principal(name: &str) -> PrincipalInfo {
        let keys = Keyset::create(KeyMetadata::member(name), None).unwrap();
        PrincipalInfo {
            name: name.into(),
            keys: keys.redact(),
            device: None,
            lockboxes: Vec::new(),
        }
    }

    #[test]
    fn proof_binds_the_principal() {
        let proof =
            ProofOfInvitation::accept("some-seed", InvitationType::Member, principal("bob"))
                .unwrap();
        let derived = crate::seed::derive_signing_keypair("some-seed").unwrap();
        proof.verify(&derived.public).unwrap();

        // swapping the principal invalidates the signature
        let mut forged = proof;
        forged.payload = principal("eve");
        assert!(forged.verify(&derived.public).is_err());
    }
}
