//! Key scopes and keyset identity.

use serde::{Deserialize, Serialize};
use sigil_core::{DeviceId, EncryptionPublicKey, Host};

/// Name of the single team-wide scope.
pub const TEAM_SCOPE_NAME: &str = "TEAM";

/// Name of the admin role every team carries.
pub const ADMIN_ROLE: &str = "admin";

/// Namespace a keyset belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyScope {
    /// Keys shared by the whole team.
    Team,
    /// Keys shared by holders of one role.
    Role,
    /// A member's personal keys.
    Member,
    /// A single device's keys.
    Device,
    /// A server principal's keys.
    Server,
    /// Single-use keys (lockbox senders, invitations).
    Ephemeral,
}

/// Identity of a keyset: scope, name, and rotation generation.
///
/// Two keysets with equal metadata are the same keys; rotation mints a new
/// metadata at generation+1 rather than mutating the old one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyMetadata {
    /// Namespace of the keyset.
    pub scope: KeyScope,
    /// Name within the namespace (role name, user name, device id, host).
    pub name: String,
    /// Monotone rotation counter, starting at 0.
    pub generation: u32,
}

impl KeyMetadata {
    /// Metadata at generation 0.
    pub fn new(scope: KeyScope, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
            generation: 0,
        }
    }

    /// The team-wide scope.
    pub fn team() -> Self {
        Self::new(KeyScope::Team, TEAM_SCOPE_NAME)
    }

    /// A role scope.
    pub fn role(name: impl Into<String>) -> Self {
        Self::new(KeyScope::Role, name)
    }

    /// The admin role scope.
    pub fn admin() -> Self {
        Self::role(ADMIN_ROLE)
    }

    /// A member scope.
    pub fn member(user_name: impl Into<String>) -> Self {
        Self::new(KeyScope::Member, user_name)
    }

    /// A device scope.
    pub fn device(device_id: &DeviceId) -> Self {
        Self::new(KeyScope::Device, device_id.as_str())
    }

    /// A server scope.
    pub fn server(host: &Host) -> Self {
        Self::new(KeyScope::Server, host.as_str())
    }

    /// An ephemeral scope.
    pub fn ephemeral() -> Self {
        Self::new(KeyScope::Ephemeral, "EPHEMERAL")
    }

    /// Same metadata at a specific generation.
    pub fn with_generation(mut self, generation: u32) -> Self {
        self.generation = generation;
        self
    }

    /// Same scope and name at the next generation.
    pub fn next_generation(&self) -> Self {
        self.clone().with_generation(self.generation + 1)
    }

    /// Whether this names the same `(scope, name)` ignoring generation.
    pub fn same_scope(&self, other: &KeyMetadata) -> bool {
        self.scope == other.scope && self.name == other.name
    }
}

/// Addressing form used inside lockboxes: metadata plus the public
/// encryption key that identifies the concrete keyset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyManifest {
    /// Namespace of the keyset.
    pub scope: KeyScope,
    /// Name within the namespace.
    pub name: String,
    /// Rotation generation.
    pub generation: u32,
    /// The keyset's public encryption key.
    pub public_key: EncryptionPublicKey,
}

impl KeyManifest {
    /// The metadata triple of this manifest.
    pub fn metadata(&self) -> KeyMetadata {
        KeyMetadata {
            scope: self.scope,
            name: self.name.clone(),
            generation: self.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_helpers() {
        let meta = KeyMetadata::team();
        assert_eq!(meta.generation, 0);
        let next = meta.next_generation();
        assert_eq!(next.generation, 1);
        assert!(meta.same_scope(&next));
        assert_ne!(meta, next);
    }

    #[test]
    fn scope_serializes_screaming() {
        let json = serde_json::to_string(&KeyScope::Ephemeral).unwrap();
        assert_eq!(json, "\"EPHEMERAL\"");
    }
}
