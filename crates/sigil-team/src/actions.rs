//! Team actions: the payloads carried by graph links.

use serde::{Deserialize, Serialize};
use sigil_core::{DeviceId, Host};
use sigil_invitation::{Invitation, InvitationId, ProofOfInvitation};
use sigil_keyset::{Lockbox, PublicDevice, PublicKeyset};

use crate::state::{Member, Role, Server};

/// Everything a link can do to team state.
///
/// Each variant pairs with a validator (policy) and a transformer (effect)
/// in the reducer's dispatch table. Secrets never appear here; key
/// distribution rides along as lockboxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeamAction {
    /// Found the team. Only valid as the first link.
    Root {
        /// Team name.
        team_name: String,
        /// The founding member, sole member and admin after this link.
        root_member: Member,
        /// Team and admin keys sealed to the founder, member keys sealed
        /// to the founding device.
        lockboxes: Vec<Lockbox>,
    },

    /// Directly enroll a member whose keys are already known.
    AddMember {
        /// The member to enroll.
        member: Member,
        /// Roles granted on enrollment.
        roles: Vec<String>,
        /// Team and role keys sealed to the new member.
        lockboxes: Vec<Lockbox>,
    },

    /// Remove a member and rotate every scope they could see.
    RemoveMember {
        /// The member to remove.
        user_name: String,
        /// Replacement keys for rotated scopes, sealed to the remaining
        /// holders.
        lockboxes: Vec<Lockbox>,
        /// New public keysets for rotated scopes that appear in state.
        rotated_keys: Vec<PublicKeyset>,
    },

    /// Create a role.
    AddRole {
        /// The role to create.
        role: Role,
        /// Role keys sealed to the admin role.
        lockboxes: Vec<Lockbox>,
    },

    /// Delete a role; members holding it lose it.
    RemoveRole {
        /// Name of the role to delete.
        role_name: String,
        /// Replacement keys for rotated scopes.
        lockboxes: Vec<Lockbox>,
        /// New public keysets for rotated scopes that appear in state.
        rotated_keys: Vec<PublicKeyset>,
    },

    /// Grant a role to a member.
    AddMemberRole {
        /// The member gaining the role.
        user_name: String,
        /// The role granted.
        role_name: String,
        /// Role keys sealed to the member.
        lockboxes: Vec<Lockbox>,
    },

    /// Withdraw a role from a member and rotate the role's keys.
    RemoveMemberRole {
        /// The member losing the role.
        user_name: String,
        /// The role withdrawn.
        role_name: String,
        /// Replacement keys for rotated scopes.
        lockboxes: Vec<Lockbox>,
        /// New public keysets for rotated scopes that appear in state.
        rotated_keys: Vec<PublicKeyset>,
    },

    /// Enroll an additional device for a member.
    AddDevice {
        /// The owning member.
        user_name: String,
        /// The device to enroll.
        device: PublicDevice,
        /// Member keys sealed to the new device.
        lockboxes: Vec<Lockbox>,
    },

    /// Remove a device and rotate every scope it could see.
    RemoveDevice {
        /// The owning member.
        user_name: String,
        /// The device to remove.
        device_id: DeviceId,
        /// Replacement keys for rotated scopes.
        lockboxes: Vec<Lockbox>,
        /// New public keysets for rotated scopes that appear in state.
        rotated_keys: Vec<PublicKeyset>,
    },

    /// Enroll a server principal.
    AddServer {
        /// The server to enroll.
        server: Server,
        /// Team keys sealed to the server.
        lockboxes: Vec<Lockbox>,
    },

    /// Remove a server and rotate every scope it could see.
    RemoveServer {
        /// Host of the server to remove.
        host: Host,
        /// Replacement keys for rotated scopes.
        lockboxes: Vec<Lockbox>,
        /// New public keysets for rotated scopes that appear in state.
        rotated_keys: Vec<PublicKeyset>,
    },

    /// Post an invitation.
    PostInvitation {
        /// The sealed invitation.
        invitation: Invitation,
    },

    /// Revoke a posted invitation.
    RevokeInvitation {
        /// Id of the invitation to revoke.
        id: InvitationId,
    },

    /// Admit an invited member on the strength of their proof.
    AdmitInvitedMember {
        /// The invitee's proof of invitation.
        proof: ProofOfInvitation,
        /// Roles granted on admission.
        roles: Vec<String>,
        /// Team and role keys sealed to the new member, plus the
        /// invitee-supplied member-to-device lockbox.
        lockboxes: Vec<Lockbox>,
    },

    /// Admit an invited device for an existing member.
    AdmitInvitedDevice {
        /// The device's proof of invitation.
        proof: ProofOfInvitation,
        /// The owning member.
        user_name: String,
        /// Member keys sealed to the new device.
        lockboxes: Vec<Lockbox>,
    },

    /// Rotate a scope's keys by choice of a current holder.
    ChangeKeys {
        /// The new public keyset, at the next generation.
        keys: PublicKeyset,
        /// New keys sealed to every current holder.
        lockboxes: Vec<Lockbox>,
    },
}

impl TeamAction {
    /// Short tag for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            TeamAction::Root { .. } => "ROOT",
            TeamAction::AddMember { .. } => "ADD_MEMBER",
            TeamAction::RemoveMember { .. } => "REMOVE_MEMBER",
            TeamAction::AddRole { .. } => "ADD_ROLE",
            TeamAction::RemoveRole { .. } => "REMOVE_ROLE",
            TeamAction::AddMemberRole { .. } => "ADD_MEMBER_ROLE",
            TeamAction::RemoveMemberRole { .. } => "REMOVE_MEMBER_ROLE",
            TeamAction::AddDevice { .. } => "ADD_DEVICE",
            TeamAction::RemoveDevice { .. } => "REMOVE_DEVICE",
            TeamAction::AddServer { .. } => "ADD_SERVER",
            TeamAction::RemoveServer { .. } => "REMOVE_SERVER",
            TeamAction::PostInvitation { .. } => "POST_INVITATION",
            TeamAction::RevokeInvitation { .. } => "REVOKE_INVITATION",
            TeamAction::AdmitInvitedMember { .. } => "ADMIT_INVITED_MEMBER",
            TeamAction::AdmitInvitedDevice { .. } => "ADMIT_INVITED_DEVICE",
            TeamAction::ChangeKeys { .. } => "CHANGE_KEYS",
        }
    }

    /// The lockboxes carried by this action.
    pub fn lockboxes(&self) -> &[Lockbox] {
        match self {
            TeamAction::Root { lockboxes, .. }
            | TeamAction::AddMember { lockboxes, .. }
            | TeamAction::RemoveMember { lockboxes, .. }
            | TeamAction::AddRole { lockboxes, .. }
            | TeamAction::RemoveRole { lockboxes, .. }
            | TeamAction::AddMemberRole { lockboxes, .. }
            | TeamAction::RemoveMemberRole { lockboxes, .. }
            | TeamAction::AddDevice { lockboxes, .. }
            | TeamAction::RemoveDevice { lockboxes, .. }
            | TeamAction::AddServer { lockboxes, .. }
            | TeamAction::RemoveServer { lockboxes, .. }
            | TeamAction::AdmitInvitedMember { lockboxes, .. }
            | TeamAction::AdmitInvitedDevice { lockboxes, .. }
            | TeamAction::ChangeKeys { lockboxes, .. } => lockboxes,
            TeamAction::PostInvitation { .. } | TeamAction::RevokeInvitation { .. } => &[],
        }
    }

    /// User name removed by this action, if it is a member removal.
    pub fn removes_member(&self) -> Option<&str> {
        match self {
            TeamAction::RemoveMember { user_name, .. } => Some(user_name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_serialize_with_type_tags() {
        let action = TeamAction::RevokeInvitation {
            id: InvitationId("inv".into()),
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"type\":\"REVOKE_INVITATION\""));
        let back: TeamAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }
}
