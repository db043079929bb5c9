//! Domain-tagged hashing and the content hash type.
//!
//! All hashing in Sigil goes through [`hash`], which derives a 32-byte
//! digest under a caller-supplied domain tag. The tag binds each use site
//! (link addressing, device ids, invitation ids, session keys) so digests
//! from one context can never collide with another. This module is the
//! single point where the algorithm is selected; currently BLAKE3.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::encoding;
use crate::error::Error;

/// Domain tags used across the workspace.
///
/// Hashes under different tags are computationally unrelated even for
/// identical input.
pub mod domain {
    /// Content address of a graph link.
    pub const LINK: &str = "link";
    /// Device id derivation from user id and device name.
    pub const DEVICE_ID: &str = "device_id";
    /// Invitation id derivation from the derived signing public key.
    pub const INVITATION_ID: &str = "invitation_id";
    /// Branch ordering for the deterministic merge resolver.
    pub const DETERMINISTIC_SORT: &str = "DETERMINISTIC_SORT";
    /// Session key derivation from the two connection seeds.
    pub const SESSION: &str = "session";
    /// Sealed-box key derivation from the X25519 shared secret.
    pub const SEAL: &str = "seal";
    /// Signature keypair seed derivation from stretched key material.
    pub const SIGNATURE: &str = "signature";
    /// Encryption keypair seed derivation from stretched key material.
    pub const ENCRYPTION: &str = "encryption";
    /// Identity challenge binding.
    pub const CHALLENGE: &str = "challenge";
    /// Symmetric AEAD key derivation from a scope's encryption secret.
    pub const SCOPE_AEAD: &str = "scope_aead";
}

/// Hash arbitrary bytes to a 32-byte digest under a domain tag.
pub fn hash(domain: &str, data: &[u8]) -> Hash {
    Hash(blake3::derive_key(domain, data))
}

/// A 32-byte content hash.
///
/// Serializes as a URL-safe unpadded base64 string, which also makes it
/// usable as a JSON map key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// View the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Consume into the raw digest bytes.
    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encoding::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", &encoding::encode(self.0)[..8])
    }
}

impl FromStr for Hash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(encoding::decode_array(s)?))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encoding::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
