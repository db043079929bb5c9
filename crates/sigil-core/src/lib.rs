//! # Sigil Core
//!
//! Foundation crate for the Sigil workspace. Everything here is pure and
//! synchronous: error types, base64 encoding helpers, canonical
//! serialization, domain-tagged hashing, the cryptographic primitives
//! facade, and the identity types shared by every other crate.
//!
//! Higher layers (keysets, the signature graph, the team reducer, the
//! connection protocol) build on these types and never reach around them to
//! the underlying crypto crates directly.

#![forbid(unsafe_code)]

pub mod canonical;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod hash;
pub mod identity;
pub mod time;

pub use error::{Error, Result};
pub use hash::{domain, hash, Hash};

pub use crypto::aead::{aead_decrypt, aead_encrypt};
pub use crypto::keys::{
    EncryptionPublicKey, EncryptionSecretKey, Signature, SignaturePublicKey, SignatureSecretKey,
    SymmetricKey,
};
pub use crypto::random::{random_32, random_bytes, random_key};
pub use crypto::seal::{seal, unseal, EncryptionKeypair};
pub use crypto::sign::{sign, verify, verify_or_err, SigningKeypair};
pub use crypto::stretch::stretch;
pub use identity::{device_id, DeviceId, DeviceInfo, Host};
