//! Per-action validators (policy).
//!
//! Validators run against the state reduced so far, before the action's
//! effect is applied. They check authorship permissions, uniqueness
//! invariants, invitation bookkeeping, and that removals carry the key
//! rotation they owe. A validator rejection halts the fold at that link.

use sigil_core::{Error, Result};
use sigil_graph::SignedLink;
use sigil_invitation::{InvitationType, ProofOfInvitation};
use sigil_keyset::{KeyScope, Lockbox, ADMIN_ROLE, TEAM_SCOPE_NAME};

use crate::actions::TeamAction;
use crate::rotation::{check_rotation, ScopeName};
use crate::state::{Member, TeamState};

type Link = SignedLink<TeamAction>;

/// A policy check for one action variant.
pub type Validator = fn(&TeamState, &Link) -> Result<()>;

/// The validator registered for an action.
pub fn validator_for(action: &TeamAction) -> Validator {
    match action {
        TeamAction::Root { .. } => validate_root,
        TeamAction::AddMember { .. } => validate_add_member,
        TeamAction::RemoveMember { .. } => validate_remove_member,
        TeamAction::AddRole { .. } => validate_add_role,
        TeamAction::RemoveRole { .. } => validate_remove_role,
        TeamAction::AddMemberRole { .. } => validate_add_member_role,
        TeamAction::RemoveMemberRole { .. } => validate_remove_member_role,
        TeamAction::AddDevice { .. } => validate_add_device,
        TeamAction::RemoveDevice { .. } => validate_remove_device,
        TeamAction::AddServer { .. } => validate_add_server,
        TeamAction::RemoveServer { .. } => validate_remove_server,
        TeamAction::PostInvitation { .. } => validate_post_invitation,
        TeamAction::RevokeInvitation { .. } => validate_revoke_invitation,
        TeamAction::AdmitInvitedMember { .. } => validate_admit_invited_member,
        TeamAction::AdmitInvitedDevice { .. } => validate_admit_invited_device,
        TeamAction::ChangeKeys { .. } => validate_change_keys,
    }
}

/// Run the registered validator for a link's action.
pub fn validate(state: &TeamState, link: &Link) -> Result<()> {
    validator_for(link.payload())(state, link)
}

fn require_admin(state: &TeamState, link: &Link) -> Result<()> {
    let author = &link.author().user_name;
    if state.member_is_admin(author) {
        Ok(())
    } else {
        Err(Error::not_admin(format!(
            "{author} attempted {}",
            link.payload().tag()
        )))
    }
}

fn require_member<'a>(state: &'a TeamState, link: &Link) -> Result<&'a Member> {
    state.member(&link.author().user_name)
}

fn has_lockbox(
    lockboxes: &[Lockbox],
    contents: (KeyScope, &str),
    recipient: (KeyScope, &str),
) -> bool {
    lockboxes.iter().any(|lb| {
        lb.contents.scope == contents.0
            && lb.contents.name == contents.1
            && lb.recipient.scope == recipient.0
            && lb.recipient.name == recipient.1
    })
}

fn require_lockbox(
    lockboxes: &[Lockbox],
    contents: (KeyScope, &str),
    recipient: (KeyScope, &str),
) -> Result<()> {
    if has_lockbox(lockboxes, contents, recipient) {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "missing lockbox sealing {:?}/{} to {:?}/{}",
            contents.0, contents.1, recipient.0, recipient.1
        )))
    }
}

fn principal_scopes(member: &Member) -> Vec<ScopeName> {
    let mut scopes = vec![(KeyScope::Member, member.user_name.clone())];
    scopes.extend(
        member
            .devices
            .keys()
            .map(|id| (KeyScope::Device, id.as_str().to_string())),
    );
    scopes
}

fn check_proof_against_posted(
    state: &TeamState,
    proof: &ProofOfInvitation,
    expected_type: InvitationType,
    timestamp: u64,
) -> Result<()> {
    let posted = state.invitation(&proof.id)?;
    if posted.revoked {
        return Err(Error::InvitationRevoked {
            id: proof.id.to_string(),
        });
    }
    if posted.used() {
        return Err(Error::InvitationUsed {
            id: proof.id.to_string(),
        });
    }
    if posted.invitation.invitation_type != expected_type {
        return Err(Error::invalid(format!(
            "invitation {} does not admit a {expected_type:?}",
            proof.id
        )));
    }
    if posted.invitation.expiration != 0 && timestamp > posted.invitation.expiration {
        return Err(Error::InvitationExpired {
            id: proof.id.to_string(),
        });
    }
    proof.verify(&posted.invitation.public_signing_key)
}

fn validate_root(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::Root {
        root_member,
        lockboxes,
        ..
    } = link.payload()
    else {
        return Err(Error::invalid("wrong action shape"));
    };
    if state.root_context.is_some() || !state.members.is_empty() {
        return Err(Error::invalid("ROOT is only valid as the first link"));
    }
    if link.body.prev().is_some() {
        return Err(Error::invalid("ROOT must be the root link"));
    }
    if root_member.user_name != link.author().user_name {
        return Err(Error::invalid("ROOT must be authored by the root member"));
    }
    if !root_member.roles.contains(ADMIN_ROLE) {
        return Err(Error::invalid("the root member must hold the admin role"));
    }
    if !root_member.devices.contains_key(&link.author().device_id) {
        return Err(Error::invalid(
            "the founding device must be enrolled by ROOT",
        ));
    }
    let member = (KeyScope::Member, root_member.user_name.as_str());
    require_lockbox(lockboxes, (KeyScope::Team, TEAM_SCOPE_NAME), member)?;
    require_lockbox(lockboxes, (KeyScope::Role, ADMIN_ROLE), member)?;
    require_lockbox(
        lockboxes,
        member,
        (KeyScope::Device, link.author().device_id.as_str()),
    )
}

fn validate_add_member(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::AddMember {
        member,
        roles,
        lockboxes,
    } = link.payload()
    else {
        return Err(Error::invalid("wrong action shape"));
    };
    require_admin(state, link)?;
    if state.has(&member.user_name) {
        return Err(Error::already_member(member.user_name.clone()));
    }
    let recipient = (KeyScope::Member, member.user_name.as_str());
    require_lockbox(lockboxes, (KeyScope::Team, TEAM_SCOPE_NAME), recipient)?;
    for role in roles {
        state.role(role)?;
        require_lockbox(lockboxes, (KeyScope::Role, role), recipient)?;
    }
    Ok(())
}

fn validate_remove_member(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::RemoveMember {
        user_name,
        lockboxes,
        ..
    } = link.payload()
    else {
        return Err(Error::invalid("wrong action shape"));
    };
    require_admin(state, link)?;
    if *user_name == link.author().user_name {
        return Err(Error::invalid("a member cannot remove themselves"));
    }
    let member = state.member(user_name)?;
    let scopes = principal_scopes(member);
    check_rotation(state, &scopes, &scopes, &[], lockboxes)
}

fn validate_add_role(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::AddRole { role, lockboxes } = link.payload() else {
        return Err(Error::invalid("wrong action shape"));
    };
    require_admin(state, link)?;
    if state.roles.contains_key(&role.role_name) {
        return Err(Error::invalid(format!(
            "role {} already exists",
            role.role_name
        )));
    }
    require_lockbox(
        lockboxes,
        (KeyScope::Role, role.role_name.as_str()),
        (KeyScope::Role, ADMIN_ROLE),
    )
}

fn validate_remove_role(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::RemoveRole {
        role_name,
        lockboxes,
        ..
    } = link.payload()
    else {
        return Err(Error::invalid("wrong action shape"));
    };
    require_admin(state, link)?;
    state.role(role_name)?;
    if role_name == ADMIN_ROLE {
        return Err(Error::invalid("the admin role cannot be removed"));
    }
    let scope = vec![(KeyScope::Role, role_name.clone())];
    check_rotation(state, &scope, &scope, &[], lockboxes)
}

fn validate_add_member_role(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::AddMemberRole {
        user_name,
        role_name,
        lockboxes,
    } = link.payload()
    else {
        return Err(Error::invalid("wrong action shape"));
    };
    require_admin(state, link)?;
    let member = state.member(user_name)?;
    state.role(role_name)?;
    if member.has_role(role_name) {
        return Err(Error::invalid(format!(
            "{user_name} already holds {role_name}"
        )));
    }
    require_lockbox(
        lockboxes,
        (KeyScope::Role, role_name),
        (KeyScope::Member, user_name),
    )
}

fn validate_remove_member_role(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::RemoveMemberRole {
        user_name,
        role_name,
        lockboxes,
        ..
    } = link.payload()
    else {
        return Err(Error::invalid("wrong action shape"));
    };
    require_admin(state, link)?;
    let member = state.member(user_name)?;
    let role = state.role(role_name)?;
    if !member.has_role(role_name) {
        return Err(Error::not_found(format!(
            "{user_name} does not hold {role_name}"
        )));
    }
    if role.is_admin() && state.members_with_role(role_name).len() <= 1 {
        return Err(Error::invalid("the admin role cannot be emptied"));
    }
    let seeds = vec![(KeyScope::Role, role_name.clone())];
    let excluded = vec![(KeyScope::Member, user_name.clone())];
    check_rotation(state, &seeds, &[], &excluded, lockboxes)
}

fn validate_add_device(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::AddDevice {
        user_name,
        device,
        lockboxes,
    } = link.payload()
    else {
        return Err(Error::invalid("wrong action shape"));
    };
    require_admin(state, link)?;
    state.member(user_name)?;
    if state.device(&device.device_id).is_ok() {
        return Err(Error::invalid(format!(
            "device {} already enrolled",
            device.device_id
        )));
    }
    require_lockbox(
        lockboxes,
        (KeyScope::Member, user_name),
        (KeyScope::Device, device.device_id.as_str()),
    )
}

fn validate_remove_device(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::RemoveDevice {
        user_name,
        device_id,
        lockboxes,
        ..
    } = link.payload()
    else {
        return Err(Error::invalid("wrong action shape"));
    };
    require_admin(state, link)?;
    let member = state.member(user_name)?;
    if !member.devices.contains_key(device_id) {
        return Err(Error::not_found(format!(
            "device {device_id} of {user_name}"
        )));
    }
    let scope = vec![(KeyScope::Device, device_id.as_str().to_string())];
    check_rotation(state, &scope, &scope, &[], lockboxes)
}

fn validate_add_server(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::AddServer { server, lockboxes } = link.payload() else {
        return Err(Error::invalid("wrong action shape"));
    };
    require_admin(state, link)?;
    if state.servers.contains_key(server.host.as_str()) {
        return Err(Error::invalid(format!(
            "server {} already enrolled",
            server.host
        )));
    }
    require_lockbox(
        lockboxes,
        (KeyScope::Team, TEAM_SCOPE_NAME),
        (KeyScope::Server, server.host.as_str()),
    )
}

fn validate_remove_server(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::RemoveServer {
        host, lockboxes, ..
    } = link.payload()
    else {
        return Err(Error::invalid("wrong action shape"));
    };
    require_admin(state, link)?;
    if !state.servers.contains_key(host.as_str()) {
        return Err(Error::not_found(format!("server {host}")));
    }
    let scope = vec![(KeyScope::Server, host.as_str().to_string())];
    check_rotation(state, &scope, &scope, &[], lockboxes)
}

fn validate_post_invitation(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::PostInvitation { invitation } = link.payload() else {
        return Err(Error::invalid("wrong action shape"));
    };
    if state.invitations.contains_key(&invitation.id) {
        return Err(Error::invalid(format!(
            "invitation {} already posted",
            invitation.id
        )));
    }
    match invitation.invitation_type {
        InvitationType::Member => require_admin(state, link),
        // the target device id is inside the sealed payload, so "own
        // devices only" is enforced at ADMIT_INVITED_DEVICE, whose author
        // becomes the device's owner
        InvitationType::Device => require_member(state, link).map(|_| ()),
    }
}

fn validate_revoke_invitation(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::RevokeInvitation { id } = link.payload() else {
        return Err(Error::invalid("wrong action shape"));
    };
    require_admin(state, link)?;
    state.invitation(id).map(|_| ())
}

fn validate_admit_invited_member(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::AdmitInvitedMember {
        proof,
        roles,
        lockboxes,
    } = link.payload()
    else {
        return Err(Error::invalid("wrong action shape"));
    };
    require_member(state, link)?;
    check_proof_against_posted(state, proof, InvitationType::Member, link.body.timestamp())?;
    if state.has(&proof.payload.name) {
        return Err(Error::already_member(proof.payload.name.clone()));
    }
    let Some(device) = &proof.payload.device else {
        return Err(Error::invalid(
            "a member admission must enroll a first device",
        ));
    };
    if state.device(&device.device_id).is_ok() {
        return Err(Error::invalid(format!(
            "device {} already enrolled",
            device.device_id
        )));
    }
    let recipient = (KeyScope::Member, proof.payload.name.as_str());
    require_lockbox(lockboxes, (KeyScope::Team, TEAM_SCOPE_NAME), recipient)?;
    require_lockbox(
        lockboxes,
        recipient,
        (KeyScope::Device, device.device_id.as_str()),
    )?;
    for role in roles {
        state.role(role)?;
        require_lockbox(lockboxes, (KeyScope::Role, role), recipient)?;
    }
    Ok(())
}

fn validate_admit_invited_device(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::AdmitInvitedDevice {
        proof,
        user_name,
        lockboxes,
    } = link.payload()
    else {
        return Err(Error::invalid("wrong action shape"));
    };
    if link.author().user_name != *user_name {
        return Err(Error::invalid(
            "only the owning member can admit their device",
        ));
    }
    state.member(user_name)?;
    check_proof_against_posted(state, proof, InvitationType::Device, link.body.timestamp())?;
    let Some(device) = &proof.payload.device else {
        return Err(Error::invalid("a device admission must carry the device"));
    };
    if device.device_id.as_str() != proof.payload.name {
        return Err(Error::name_mismatch(format!(
            "proof names device {} but encloses {}",
            proof.payload.name, device.device_id
        )));
    }
    if state.device(&device.device_id).is_ok() {
        return Err(Error::invalid(format!(
            "device {} already enrolled",
            device.device_id
        )));
    }
    require_lockbox(
        lockboxes,
        (KeyScope::Member, user_name),
        (KeyScope::Device, device.device_id.as_str()),
    )
}

fn validate_change_keys(state: &TeamState, link: &Link) -> Result<()> {
    let TeamAction::ChangeKeys { keys, lockboxes } = link.payload() else {
        return Err(Error::invalid("wrong action shape"));
    };
    let author = require_member(state, link)?;
    let expected_generation = match keys.scope {
        KeyScope::Member => {
            if keys.name != author.user_name {
                return Err(Error::invalid(
                    "a member may only rotate their own member keys",
                ));
            }
            author.keys.generation + 1
        }
        KeyScope::Team => state.current_generation(KeyScope::Team, TEAM_SCOPE_NAME) + 1,
        KeyScope::Role => {
            if !author.has_role(&keys.name) && !state.member_is_admin(&author.user_name) {
                return Err(Error::not_admin(format!(
                    "{} does not hold role {}",
                    author.user_name, keys.name
                )));
            }
            state.current_generation(KeyScope::Role, &keys.name) + 1
        }
        _ => return Err(Error::invalid("unsupported CHANGE_KEYS scope")),
    };
    if keys.generation != expected_generation {
        return Err(Error::invalid(format!(
            "key generations are monotone: expected {expected_generation}, got {}",
            keys.generation
        )));
    }
    let rotated = lockboxes.iter().any(|lb| {
        lb.contents.scope == keys.scope
            && lb.contents.name == keys.name
            && lb.contents.generation == keys.generation
    });
    if rotated {
        Ok(())
    } else {
        Err(Error::invalid(
            "CHANGE_KEYS must distribute the new keys to current holders",
        ))
    }
}
