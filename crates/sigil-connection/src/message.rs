//! Connection wire messages.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sigil_core::{canonical, encoding, DeviceId, Hash, Result, Signature};
use sigil_graph::Link;
use sigil_invitation::ProofOfInvitation;
use sigil_keyset::Keyset;
use sigil_team::TeamAction;

/// An identity challenge: sign this exact structure to prove control of
/// the claimed device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Fresh random nonce.
    #[serde(with = "encoding::b64")]
    pub nonce: Vec<u8>,
    /// The claimed user.
    pub user_name: String,
    /// The claimed device.
    pub device_id: DeviceId,
    /// Unix ms at challenge time.
    pub timestamp: u64,
}

/// How a peer claims to be admissible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityClaim {
    /// An enrolled member's device.
    Member {
        /// The claimed device.
        device_id: DeviceId,
    },
    /// A newcomer bearing a proof of invitation.
    Invitee {
        /// The proof, binding the joining principal.
        proof: ProofOfInvitation,
    },
}

/// One round of state-based graph synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Sender's current head.
    pub head: Hash,
    /// Every link hash the sender knows.
    pub known: BTreeSet<Hash>,
    /// Links the sender believes the receiver is missing.
    pub links: BTreeMap<Hash, Link<TeamAction>>,
}

/// The connection protocol messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionMessage {
    /// Ask the peer to claim an identity.
    RequestIdentity,
    /// Claim an identity (or present an invitation).
    ClaimIdentity {
        /// The claim.
        claim: IdentityClaim,
    },
    /// Challenge a claimed device identity.
    ChallengeIdentity {
        /// The challenge to sign.
        challenge: Challenge,
    },
    /// Prove a challenged identity.
    ProveIdentity {
        /// The challenge being answered.
        challenge: Challenge,
        /// Signature over the canonical challenge by the device key.
        proof: Signature,
    },
    /// The peer's identity proof verified.
    AcceptIdentity,
    /// The peer's identity proof failed.
    RejectIdentity {
        /// Why.
        message: String,
    },
    /// An invitation proof verified: here is the team.
    AcceptInvitation {
        /// The admitting side's serialized graph.
        #[serde(with = "encoding::b64")]
        serialized_graph: Vec<u8>,
        /// Team-scope keysets so the newcomer can read team content.
        team_keysets: Vec<Keyset>,
    },
    /// One round of graph synchronization.
    Sync {
        /// The sync summary.
        summary: SyncSummary,
    },
    /// The sender's head moved; the receiver may want to sync.
    LocalUpdate {
        /// The sender's new head.
        head: Hash,
    },
    /// A sealed session-seed contribution.
    Seed {
        /// 32 seed bytes sealed to the receiver's member encryption key.
        #[serde(with = "encoding::b64")]
        encrypted_seed: Vec<u8>,
    },
    /// An application payload under the session key.
    EncryptedMessage {
        /// AEAD ciphertext.
        #[serde(with = "encoding::b64")]
        payload: Vec<u8>,
    },
    /// Orderly shutdown.
    Disconnect {
        /// Why.
        message: String,
    },
    /// A remote failure report.
    Error {
        /// Why.
        message: String,
    },
    /// A local failure report (emitted to the host, never sent).
    LocalError {
        /// Why.
        message: String,
    },
}

impl ConnectionMessage {
    /// Short tag for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            ConnectionMessage::RequestIdentity => "REQUEST_IDENTITY",
            ConnectionMessage::ClaimIdentity { .. } => "CLAIM_IDENTITY",
            ConnectionMessage::ChallengeIdentity { .. } => "CHALLENGE_IDENTITY",
            ConnectionMessage::ProveIdentity { .. } => "PROVE_IDENTITY",
            ConnectionMessage::AcceptIdentity => "ACCEPT_IDENTITY",
            ConnectionMessage::RejectIdentity { .. } => "REJECT_IDENTITY",
            ConnectionMessage::AcceptInvitation { .. } => "ACCEPT_INVITATION",
            ConnectionMessage::Sync { .. } => "SYNC",
            ConnectionMessage::LocalUpdate { .. } => "LOCAL_UPDATE",
            ConnectionMessage::Seed { .. } => "SEED",
            ConnectionMessage::EncryptedMessage { .. } => "ENCRYPTED_MESSAGE",
            ConnectionMessage::Disconnect { .. } => "DISCONNECT",
            ConnectionMessage::Error { .. } => "ERROR",
            ConnectionMessage::LocalError { .. } => "LOCAL_ERROR",
        }
    }
}

/// A connection message with its per-sender sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberedConnectionMessage {
    /// Monotone per-sender index, starting at 0.
    pub index: u32,
    /// The wrapped message.
    pub message: ConnectionMessage,
}

/// Serialize a numbered message for the transport.
pub fn serialize_message(message: &NumberedConnectionMessage) -> Result<Vec<u8>> {
    canonical::to_vec(message)
}

/// Deserialize a numbered message from the transport.
pub fn deserialize_message(bytes: &[u8]) -> Result<NumberedConnectionMessage> {
    canonical::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_round_trip_with_type_tags() {
        let messages = vec![
            ConnectionMessage::RequestIdentity,
            ConnectionMessage::AcceptIdentity,
            ConnectionMessage::RejectIdentity {
                message: "bad proof".into(),
            },
            ConnectionMessage::Disconnect {
                message: "done".into(),
            },
        ];
        for (index, message) in messages.into_iter().enumerate() {
            let numbered = NumberedConnectionMessage {
                index: index as u32,
                message,
            };
            let bytes = serialize_message(&numbered).unwrap();
            assert_eq!(deserialize_message(&bytes).unwrap(), numbered);
        }
    }

    #[test]
    fn tags_match_wire_names() {
        let json = serde_json::to_string(&ConnectionMessage::RequestIdentity).unwrap();
        assert_eq!(json, r#"{"type":"REQUEST_IDENTITY"}"#);
    }
}
