//! Byte-newtype key and signature types.
//!
//! Fixed-size wrappers around raw key material. Public material is `Copy`;
//! secret material is not, and zeroizes on request. Everything serializes
//! as a URL-safe unpadded base64 string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

use crate::encoding;
use crate::error::Error;

macro_rules! base64_serde {
    ($name:ident, $len:expr) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&encoding::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), &encoding::encode(self.0)[..8])
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes: [u8; $len] = encoding::decode_array(s)?;
                Ok(Self(bytes))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&encoding::encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

macro_rules! public_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Construct from raw bytes.
            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Convert to the raw byte array.
            pub fn to_bytes(&self) -> [u8; $len] {
                self.0
            }

            /// View the raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Try to construct from a slice of the exact length.
            pub fn try_from_slice(bytes: &[u8]) -> Result<Self, Error> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| {
                    Error::serialization(concat!(
                        stringify!($name),
                        " must be exactly ",
                        stringify!($len),
                        " bytes"
                    ))
                })?;
                Ok(Self(arr))
            }
        }

        base64_serde!($name, $len);
    };
}

macro_rules! secret_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Zeroize)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Construct from raw bytes.
            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// View the raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        base64_serde!($name, $len);
    };
}

public_bytes!(
    /// Ed25519 signature over canonical bytes.
    Signature,
    64
);

public_bytes!(
    /// Ed25519 verifying key.
    SignaturePublicKey,
    32
);

public_bytes!(
    /// X25519 public key.
    EncryptionPublicKey,
    32
);

secret_bytes!(
    /// Ed25519 signing key.
    SignatureSecretKey,
    32
);

secret_bytes!(
    /// X25519 secret key.
    EncryptionSecretKey,
    32
);

secret_bytes!(
    /// 32-byte symmetric AEAD key.
    SymmetricKey,
    32
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_serde_round_trip() {
        let key = SignaturePublicKey::from_bytes([7u8; 32]);
        let json = serde_json::to_string(&key).unwrap();
        let back: SignaturePublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
    }

    #[test]
    fn secret_key_zeroizes() {
        let mut key = SymmetricKey::from_bytes([0xaa; 32]);
        key.zeroize();
        assert_eq!(key.0, [0u8; 32]);
    }

    #[test]
    fn try_from_slice_length_checked() {
        assert!(SignaturePublicKey::try_from_slice(&[1u8; 31]).is_err());
        assert!(SignaturePublicKey::try_from_slice(&[1u8; 32]).is_ok());
    }

    #[test]
    fn debug_does_not_print_full_material() {
        let key = SignatureSecretKey::from_bytes([0x5a; 32]);
        let debug = format!("{key:?}");
        assert!(debug.len() < 40);
    }
}
