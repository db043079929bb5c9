//! # Sigil Invitation
//!
//! Keybase-style seed invitations. An admin mints an invitation from a
//! shared secret: the secret is stretched into a single-use signing
//! keypair, the invitation body is sealed under the team key, and only the
//! derived public key and an id are posted in the clear. The invitee
//! re-derives the keypair from the same secret and proves knowledge by
//! signing their public principal info; any member can check that proof
//! against the posted invitation.

#![forbid(unsafe_code)]

pub mod invitation;
pub mod proof;
pub mod seed;

pub use invitation::{Invitation, InvitationId, InvitationOptions, InvitationPayload, InvitationType};
pub use proof::{PrincipalInfo, ProofOfInvitation};
pub use seed::{normalize_seed, random_seed};
