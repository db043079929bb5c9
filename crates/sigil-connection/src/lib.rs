//! # Sigil Connection
//!
//! The pairwise connection protocol. Two peers mutually authenticate
//! (device challenge for enrolled members, proof of invitation for
//! newcomers), converge their graphs by exchanging known-hash summaries,
//! negotiate a session key from sealed seed contributions, and then carry
//! application payloads over an AEAD channel.
//!
//! The machine is sans-io: the host owns the transport, feeds inbound
//! messages through [`Connection::deliver`], drives timeouts with
//! [`Connection::tick`], and drains [`Connection::take_outbox`] /
//! [`Connection::take_events`] after each call.

#![forbid(unsafe_code)]

pub mod machine;
pub mod message;
pub mod sync;

pub use machine::{Connection, ConnectionConfig, ConnectionEvent, Phase};
pub use message::{
    Challenge, ConnectionMessage, IdentityClaim, NumberedConnectionMessage, SyncSummary,
};
pub use sync::links_to_send;
