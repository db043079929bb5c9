//! Local party contexts.
//!
//! A context selects who the local process is when a team is instantiated
//! or a connection starts: an enrolled member on one of their devices, a
//! server principal, or an invitee who has nothing but an invitation seed
//! yet.

use serde::{Deserialize, Serialize};
use sigil_core::{device_id, DeviceId, Host, Result};

use crate::keyset::{Keyset, PublicKeyset};
use crate::scope::KeyMetadata;

/// A user and their personal (member-scope) keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user name within the team.
    pub user_name: String,
    /// Member-scope keyset.
    pub keys: Keyset,
}

impl User {
    /// Create a user with fresh or seeded member keys.
    pub fn create(user_name: impl Into<String>, seed: Option<&[u8]>) -> Result<Self> {
        let user_name = user_name.into();
        let keys = Keyset::create(KeyMetadata::member(&user_name), seed)?;
        Ok(Self { user_name, keys })
    }

    /// The postable public form of the member keys.
    pub fn public_keys(&self) -> PublicKeyset {
        self.keys.redact()
    }
}

/// A device with its secret keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Derived device id.
    pub device_id: DeviceId,
    /// Id of the owning user.
    pub user_id: String,
    /// Human-readable device name, unique per user.
    pub device_name: String,
    /// Device-scope keyset.
    pub keys: Keyset,
}

impl Device {
    /// Create a device for a user, deriving its id and keys.
    pub fn create(
        user_id: impl Into<String>,
        device_name: impl Into<String>,
        seed: Option<&[u8]>,
    ) -> Result<Self> {
        let user_id = user_id.into();
        let device_name = device_name.into();
        let device_id = device_id(&user_id, &device_name);
        let keys = Keyset::create(KeyMetadata::device(&device_id), seed)?;
        Ok(Self {
            device_id,
            user_id,
            device_name,
            keys,
        })
    }

    /// Strip secrets, leaving the form posted on the graph.
    pub fn redact(&self) -> PublicDevice {
        PublicDevice {
            device_id: self.device_id.clone(),
            device_name: self.device_name.clone(),
            keys: self.keys.redact(),
        }
    }
}

/// Public info for an enrolled device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicDevice {
    /// Derived device id.
    pub device_id: DeviceId,
    /// Human-readable device name.
    pub device_name: String,
    /// Public half of the device keys.
    pub keys: PublicKeyset,
}

/// Context for an enrolled member on one of their devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberContext {
    /// The local user.
    pub user: User,
    /// The device this process runs on.
    pub device: Device,
}

/// Context for a server principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerContext {
    /// The server's host name.
    pub host: Host,
    /// Server-scope keyset.
    pub keys: Keyset,
}

/// Context for a peer that holds only an invitation seed so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteeContext {
    /// The joining user.
    pub user: User,
    /// The device they are joining from.
    pub device: Device,
    /// The shared invitation secret.
    pub invitation_seed: String,
}

/// Who the local process is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalContext {
    /// An enrolled member.
    Member(MemberContext),
    /// A server principal.
    Server(ServerContext),
    /// A not-yet-admitted invitee.
    Invitee(InviteeContext),
}

impl LocalContext {
    /// The device signing identity for this context, if it has one.
    pub fn device(&self) -> Option<&Device> {
        match self {
            LocalContext::Member(ctx) => Some(&ctx.device),
            LocalContext::Invitee(ctx) => Some(&ctx.device),
            LocalContext::Server(_) => None,
        }
    }

    /// The user name this context acts as.
    pub fn user_name(&self) -> &str {
        match self {
            LocalContext::Member(ctx) => &ctx.user.user_name,
            LocalContext::Invitee(ctx) => &ctx.user.user_name,
            LocalContext::Server(ctx) => ctx.host.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::KeyScope;

    #[test]
    fn device_keys_are_device_scoped() {
        let device = Device::create("alice", "laptop", None).unwrap();
        assert_eq!(device.keys.scope, KeyScope::Device);
        assert_eq!(device.keys.name, device.device_id.as_str());
    }

    #[test]
    fn context_accessors() {
        let user = User::create("alice", None).unwrap();
        let device = Device::create("alice", "laptop", None).unwrap();
        let ctx = LocalContext::Member(MemberContext { user, device });
        assert_eq!(ctx.user_name(), "alice");
        assert!(ctx.device().is_some());
    }
}
