//! # Sigil Team
//!
//! Team state and the operations that change it. A team is nothing but its
//! signature graph: membership, roles, devices, invitations, and the
//! lockboxes that distribute keys are all recovered by folding a pure
//! reducer over the graph's deterministic linearization. Every replica
//! that knows the same links computes the same team.
//!
//! The fold runs policy first (per-action validators over the state
//! reduced so far), then effect (a pure state transformer). Removing a
//! principal rotates every scope it could see and reissues lockboxes to
//! the remaining holders, so departed members keep only the history they
//! already had.

#![forbid(unsafe_code)]

pub mod actions;
pub mod reducer;
pub mod resolver;
pub mod rotation;
pub mod state;
pub mod team;
pub mod validators;

pub use actions::TeamAction;
pub use reducer::{reduce, reduce_sequence};
pub use resolver::MembershipResolver;
pub use rotation::{plan_rotation, scopes_to_rotate, RotationPlan};
pub use state::{Member, PostedInvitation, Role, Server, TeamState};
pub use team::{EncryptedEnvelope, InviteOptions, SignedEnvelope, Team, TeamEvent};
