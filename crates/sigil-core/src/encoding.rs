//! Base64 encoding helpers.
//!
//! Every key, signature, and hash that leaves the process is URL-safe
//! unpadded base64. This module is the single place that picks the engine.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::{Error, Result};

/// Encode bytes as URL-safe unpadded base64.
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode URL-safe unpadded base64 into bytes.
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| Error::serialization(format!("invalid base64: {e}")))
}

/// Decode base64 into a fixed-size array.
pub fn decode_array<const N: usize>(encoded: &str) -> Result<[u8; N]> {
    let bytes = decode(encoded)?;
    bytes.as_slice().try_into().map_err(|_| {
        Error::serialization(format!(
            "expected {N} bytes of base64, got {}",
            bytes.len()
        ))
    })
}

/// Trait for types with a base64 string representation.
pub trait ToBase64 {
    /// Convert to a URL-safe unpadded base64 string.
    fn to_base64(&self) -> String;
}

impl ToBase64 for Vec<u8> {
    fn to_base64(&self) -> String {
        encode(self)
    }
}

impl ToBase64 for [u8] {
    fn to_base64(&self) -> String {
        encode(self)
    }
}

impl<const N: usize> ToBase64 for [u8; N] {
    fn to_base64(&self) -> String {
        encode(self)
    }
}

/// Serde adapter serializing `Vec<u8>` fields as base64 strings.
///
/// Use as `#[serde(with = "sigil_core::encoding::b64")]`.
pub mod b64 {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as a base64 string.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    /// Deserialize bytes from a base64 string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let bytes = vec![0u8, 1, 2, 255, 254];
        let encoded = encode(&bytes);
        assert_eq!(decode(&encoded).unwrap(), bytes);
    }

    #[test]
    fn url_safe_no_padding() {
        // 0xfb 0xff encodes to characters outside the standard alphabet
        let encoded = encode([0xfbu8, 0xff, 0x00]);
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn decode_array_rejects_wrong_length() {
        let encoded = encode([1u8, 2, 3]);
        assert!(decode_array::<32>(&encoded).is_err());
    }
}
