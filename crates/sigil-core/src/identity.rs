//! Device and server identity primitives.
//!
//! A device id is derived, not assigned: hashing the owning user id and the
//! device name means every peer computes the same id for the same device
//! without coordination.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::encoding;
use crate::hash::{domain, hash};

/// Base64-encoded derived device identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// View as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Derive the id for a device from its owner and name.
pub fn device_id(user_id: &str, device_name: &str) -> DeviceId {
    let input = format!("{user_id}::{device_name}");
    DeviceId(encoding::encode(
        hash(domain::DEVICE_ID, input.as_bytes()).as_bytes(),
    ))
}

/// Naming info for a device, prior to key material being attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Id of the user the device belongs to.
    pub user_id: String,
    /// Human-readable device name, unique per user.
    pub device_name: String,
}

impl DeviceInfo {
    /// Create naming info for a device.
    pub fn new(user_id: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            device_name: device_name.into(),
        }
    }

    /// The derived device id.
    pub fn id(&self) -> DeviceId {
        device_id(&self.user_id, &self.device_name)
    }
}

/// A server is addressed by its host name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Host(pub String);

impl Host {
    /// View as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_is_deterministic() {
        assert_eq!(device_id("alice", "laptop"), device_id("alice", "laptop"));
    }

    #[test]
    fn device_id_binds_both_parts() {
        let base = device_id("alice", "laptop");
        assert_ne!(base, device_id("alice", "phone"));
        assert_ne!(base, device_id("bob", "laptop"));
        // separator prevents ambiguous concatenation
        assert_ne!(device_id("a", "blaptop"), device_id("ab", "laptop"));
    }
}
