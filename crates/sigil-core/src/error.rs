//! Unified error type for the Sigil workspace.
//!
//! One enum covers every failure kind the system surfaces. Reducer
//! validators, the keyring, the invitation protocol, and the connection
//! state machine all report through these variants so hosts can match on
//! kind without tracking per-crate error types.

use serde::{Deserialize, Serialize};

/// Unified error type for all Sigil operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
    /// The author of an action lacks the admin role it requires.
    #[error("not an admin: {message}")]
    NotAdmin {
        /// Which member attempted what
        message: String,
    },

    /// A member, role, device, or key was not found.
    #[error("not found: {message}")]
    NotFound {
        /// What was looked up
        message: String,
    },

    /// A member with the same name already exists.
    #[error("already a member: {message}")]
    AlreadyMember {
        /// The conflicting name
        message: String,
    },

    /// A signature failed verification against the claimed key.
    #[error("invalid signature: {message}")]
    InvalidSignature {
        /// Where verification failed
        message: String,
    },

    /// The signature graph itself is inconsistent; the fold cannot continue.
    #[error("graph corrupt: {message}")]
    GraphCorrupt {
        /// What broke
        message: String,
    },

    /// No posted invitation matches the presented id.
    #[error("invitation {id} not found")]
    InvitationNotFound {
        /// The invitation id
        id: String,
    },

    /// The invitation was revoked before the proof arrived.
    #[error("invitation {id} has been revoked")]
    InvitationRevoked {
        /// The invitation id
        id: String,
    },

    /// The invitation was already consumed by an earlier admission.
    #[error("invitation {id} has already been used")]
    InvitationUsed {
        /// The invitation id
        id: String,
    },

    /// The invitation's expiration passed before the proof arrived.
    #[error("invitation {id} has expired")]
    InvitationExpired {
        /// The invitation id
        id: String,
    },

    /// The principal named in a proof does not match the invitation.
    #[error("name mismatch: {message}")]
    NameMismatch {
        /// The mismatched names
        message: String,
    },

    /// A connection phase exceeded its deadline.
    #[error("timed out: {message}")]
    Timeout {
        /// Which phase timed out
        message: String,
    },

    /// A peer sent a message the protocol does not allow in this state.
    #[error("protocol violation: {message}")]
    ProtocolViolation {
        /// What arrived and what was expected
        message: String,
    },

    /// AEAD or sealed-box decryption failed.
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Which payload failed
        message: String,
    },

    /// A requested keyset is not reachable from the principal's keyring.
    #[error("key not reachable: {message}")]
    KeyNotReachable {
        /// Which (scope, name) was requested
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {message}")]
    Serialization {
        /// The underlying codec error
        message: String,
    },

    /// Invalid input or state.
    #[error("invalid: {message}")]
    Invalid {
        /// What was invalid
        message: String,
    },
}

impl Error {
    /// Create a not-admin error.
    pub fn not_admin(message: impl Into<String>) -> Self {
        Self::NotAdmin {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an already-member error.
    pub fn already_member(message: impl Into<String>) -> Self {
        Self::AlreadyMember {
            message: message.into(),
        }
    }

    /// Create an invalid-signature error.
    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self::InvalidSignature {
            message: message.into(),
        }
    }

    /// Create a graph-corrupt error.
    pub fn graph_corrupt(message: impl Into<String>) -> Self {
        Self::GraphCorrupt {
            message: message.into(),
        }
    }

    /// Create a name-mismatch error.
    pub fn name_mismatch(message: impl Into<String>) -> Self {
        Self::NameMismatch {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a protocol-violation error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    /// Create a decryption-failed error.
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Create a key-not-reachable error.
    pub fn key_not_reachable(message: impl Into<String>) -> Self {
        Self::KeyNotReachable {
            message: message.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an invalid-input error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Whether this error kind is fatal for a graph fold.
    ///
    /// Validator rejections halt state computation at the offending link;
    /// a corrupt graph or bad signature aborts the whole fold.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::GraphCorrupt { .. } | Self::InvalidSignature { .. }
        )
    }
}

/// Standard result type for Sigil operations.
pub type Result<T> = std::result::Result<T, Error>;
