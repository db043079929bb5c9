//! # Sigil Keyset
//!
//! Typed key material for Sigil principals. A keyset pairs a signing
//! keypair with an encryption keypair under a `(scope, name, generation)`
//! identity. Lockboxes distribute full keysets to other principals by
//! sealing them to the recipient's encryption key, and a keyring is the
//! transitive closure of keysets a principal can open.
//!
//! The scheme tolerates removal by rotation: when a principal is removed,
//! every scope it could see is reissued at generation+1 and fresh lockboxes
//! are posted for the remaining holders.

#![forbid(unsafe_code)]

pub mod context;
pub mod keyring;
pub mod keyset;
pub mod lockbox;
pub mod scope;

pub use context::{Device, InviteeContext, LocalContext, MemberContext, PublicDevice, ServerContext, User};
pub use keyring::Keyring;
pub use keyset::{Keyset, PublicKeyset};
pub use lockbox::Lockbox;
pub use scope::{KeyManifest, KeyMetadata, KeyScope, ADMIN_ROLE, TEAM_SCOPE_NAME};
