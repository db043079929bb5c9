//! Canonical serialization for signed and hashed content.
//!
//! Signatures and content hashes bind the canonical JSON form of a value:
//! struct fields in declaration order, map keys sorted (all maps in signed
//! structures are `BTreeMap`). Two processes serializing the same value
//! produce identical bytes, which is what makes link hashes and signature
//! checks portable across peers.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};
use crate::hash::{hash, Hash};

/// Serialize a value to its canonical byte form.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::serialization(e.to_string()))
}

/// Deserialize a value from canonical bytes.
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::serialization(e.to_string()))
}

/// Serialize a value canonically and hash it under a domain tag.
pub fn hash_canonical<T: Serialize>(domain: &str, value: &T) -> Result<Hash> {
    Ok(hash(domain, &to_vec(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::domain;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        numbers: Vec<u32>,
        tags: BTreeMap<String, String>,
    }

    fn sample() -> Sample {
        let mut tags = BTreeMap::new();
        tags.insert("zeta".into(), "1".into());
        tags.insert("alpha".into(), "2".into());
        Sample {
            name: "sample".into(),
            numbers: vec![3, 1, 2],
            tags,
        }
    }

    #[test]
    fn round_trip() {
        let value = sample();
        let bytes = to_vec(&value).unwrap();
        assert_eq!(from_slice::<Sample>(&bytes).unwrap(), value);
    }

    #[test]
    fn map_keys_sorted() {
        let bytes = to_vec(&sample()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let alpha = text.find("alpha").unwrap();
        let zeta = text.find("zeta").unwrap();
        assert!(alpha < zeta, "BTreeMap keys serialize in sorted order");
    }

    #[test]
    fn canonical_hash_is_stable() {
        let a = hash_canonical(domain::LINK, &sample()).unwrap();
        let b = hash_canonical(domain::LINK, &sample()).unwrap();
        assert_eq!(a, b);
    }
}
