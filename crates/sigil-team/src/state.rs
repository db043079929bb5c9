//! Team state and selectors.
//!
//! `TeamState` is derived data: it is recomputed from the graph and never
//! persisted. All maps are `BTreeMap` so iteration order, and therefore
//! anything computed from it, is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sigil_core::{DeviceId, Error, Host, Result};
use sigil_graph::LinkContext;
use sigil_invitation::{Invitation, InvitationId};
use sigil_keyset::{KeyScope, Lockbox, PublicDevice, PublicKeyset, ADMIN_ROLE};

/// Permission granted by the admin role.
pub const PERMISSION_ADMIN: &str = "admin";

/// An enrolled team member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Unique user name.
    pub user_name: String,
    /// Member-scope public keys at the current generation.
    pub keys: PublicKeyset,
    /// Roles this member holds.
    pub roles: BTreeSet<String>,
    /// Devices enrolled for this member.
    pub devices: BTreeMap<DeviceId, PublicDevice>,
}

impl Member {
    /// Whether this member holds the named role.
    pub fn has_role(&self, role_name: &str) -> bool {
        self.roles.contains(role_name)
    }
}

/// A named role with its permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role name.
    pub role_name: String,
    /// Permission strings granted by the role.
    pub permissions: BTreeSet<String>,
}

impl Role {
    /// A role with no permissions beyond key access.
    pub fn new(role_name: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            permissions: BTreeSet::new(),
        }
    }

    /// The built-in admin role.
    pub fn admin() -> Self {
        Self {
            role_name: ADMIN_ROLE.to_string(),
            permissions: BTreeSet::from([PERMISSION_ADMIN.to_string()]),
        }
    }

    /// Whether the role grants admin permission.
    pub fn is_admin(&self) -> bool {
        self.role_name == ADMIN_ROLE || self.permissions.contains(PERMISSION_ADMIN)
    }
}

/// A server principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Host name addressing the server.
    pub host: Host,
    /// Server-scope public keys.
    pub keys: PublicKeyset,
}

/// An invitation as recorded in team state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedInvitation {
    /// The posted invitation.
    pub invitation: Invitation,
    /// Set by `REVOKE_INVITATION`.
    pub revoked: bool,
    /// Number of admissions so far.
    pub uses: u32,
}

impl PostedInvitation {
    /// Whether the invitation has no admissions left.
    pub fn used(&self) -> bool {
        self.invitation.max_uses != 0 && self.uses >= self.invitation.max_uses
    }
}

/// The state of a team, as reduced from its graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamState {
    /// Team name, fixed at the root.
    pub team_name: String,
    /// Authorship info of the root link.
    pub root_context: Option<LinkContext>,
    /// Enrolled members by user name.
    pub members: BTreeMap<String, Member>,
    /// Roles by name.
    pub roles: BTreeMap<String, Role>,
    /// Server principals by host.
    pub servers: BTreeMap<String, Server>,
    /// Every lockbox ever posted, in graph order.
    pub lockboxes: Vec<Lockbox>,
    /// Posted invitations by id.
    pub invitations: BTreeMap<InvitationId, PostedInvitation>,
    /// Members removed from the team, with their state at removal.
    pub removed_members: BTreeMap<String, Member>,
    /// Devices removed from the team.
    pub removed_devices: BTreeMap<DeviceId, PublicDevice>,
}

impl TeamState {
    /// The state before the root link.
    pub fn new() -> Self {
        Self::default()
    }

    /// All members, in name order.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Look up a member by user name.
    pub fn member(&self, user_name: &str) -> Result<&Member> {
        self.members
            .get(user_name)
            .ok_or_else(|| Error::not_found(format!("member {user_name}")))
    }

    /// Whether a member with this name is enrolled.
    pub fn has(&self, user_name: &str) -> bool {
        self.members.contains_key(user_name)
    }

    /// All roles, in name order.
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    /// Look up a role by name.
    pub fn role(&self, role_name: &str) -> Result<&Role> {
        self.roles
            .get(role_name)
            .ok_or_else(|| Error::not_found(format!("role {role_name}")))
    }

    /// Whether a member holds a role granting admin permission.
    pub fn member_is_admin(&self, user_name: &str) -> bool {
        self.members
            .get(user_name)
            .map(|member| {
                member
                    .roles
                    .iter()
                    .any(|role| self.roles.get(role).is_some_and(Role::is_admin))
            })
            .unwrap_or(false)
    }

    /// User names of every member holding the named role.
    pub fn members_with_role(&self, role_name: &str) -> Vec<&str> {
        self.members
            .values()
            .filter(|m| m.has_role(role_name))
            .map(|m| m.user_name.as_str())
            .collect()
    }

    /// Find the member owning a device.
    pub fn member_by_device(&self, device_id: &DeviceId) -> Result<&Member> {
        self.members
            .values()
            .find(|m| m.devices.contains_key(device_id))
            .ok_or_else(|| Error::not_found(format!("device {device_id}")))
    }

    /// Look up a device across all members.
    pub fn device(&self, device_id: &DeviceId) -> Result<&PublicDevice> {
        self.members
            .values()
            .find_map(|m| m.devices.get(device_id))
            .ok_or_else(|| Error::not_found(format!("device {device_id}")))
    }

    /// Look up a posted invitation.
    pub fn invitation(&self, id: &InvitationId) -> Result<&PostedInvitation> {
        self.invitations
            .get(id)
            .ok_or_else(|| Error::InvitationNotFound { id: id.to_string() })
    }

    /// The current (highest) key generation of a scope, as witnessed by
    /// posted lockboxes. Scopes with no lockboxes are at generation 0.
    pub fn current_generation(&self, scope: KeyScope, name: &str) -> u32 {
        self.lockboxes
            .iter()
            .filter(|lb| lb.contents.scope == scope && lb.contents.name == name)
            .map(|lb| lb.contents.generation)
            .max()
            .unwrap_or(0)
    }

    /// Lockboxes whose contents are `(scope, name)` at `generation`.
    pub fn lockboxes_for(&self, scope: KeyScope, name: &str, generation: u32) -> Vec<&Lockbox> {
        self.lockboxes
            .iter()
            .filter(|lb| {
                lb.contents.scope == scope
                    && lb.contents.name == name
                    && lb.contents.generation == generation
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_keyset::{KeyMetadata, Keyset};

    fn keyset(meta: KeyMetadata) -> PublicKeyset {
        Keyset::create(meta, None).unwrap().redact()
    }

    fn member(name: &str, roles: &[&str]) -> Member {
        Member {
            user_name: name.into(),
            keys: keyset(KeyMetadata::member(name)),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            devices: BTreeMap::new(),
        }
    }

    #[test]
    fn admin_detection_goes_through_roles() {
        let mut state = TeamState::new();
        state.roles.insert(ADMIN_ROLE.into(), Role::admin());
        state.roles.insert("guest".into(), Role::new("guest"));
        state
            .members
            .insert("alice".into(), member("alice", &[ADMIN_ROLE]));
        state
            .members
            .insert("bob".into(), member("bob", &["guest"]));

        assert!(state.member_is_admin("alice"));
        assert!(!state.member_is_admin("bob"));
        assert!(!state.member_is_admin("nobody"));
    }

    #[test]
    fn selectors_report_missing_entries() {
        let state = TeamState::new();
        assert!(matches!(state.member("x"), Err(Error::NotFound { .. })));
        assert!(matches!(state.role("x"), Err(Error::NotFound { .. })));
    }
}
