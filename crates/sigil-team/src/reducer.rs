//! The team reducer: a pure fold over the linearized graph.
//!
//! Each link passes three gates. Signature verification and author-key
//! checks are fatal on failure (`GraphCorrupt`/`InvalidSignature` abort
//! the fold: the graph itself cannot be trusted). The per-action validator
//! is policy: its rejection halts state computation at the offending link
//! and surfaces the error to the host. The transformer then applies the
//! action; it is infallible on validated input.

use sigil_core::{Error, Result};
use sigil_graph::{LinkBody, SignedLink};
use sigil_keyset::{KeyScope, ADMIN_ROLE};

use crate::actions::TeamAction;
use crate::state::{PostedInvitation, Role, TeamState};
use crate::validators;

type Link = SignedLink<TeamAction>;

/// Check that the signing key carried on the link really is the author's
/// enrolled device key (or the founding device, for the root).
fn check_author(state: &TeamState, link: &Link) -> Result<()> {
    let context = link.author();
    if let LinkBody::Root { .. } = &link.body {
        let TeamAction::Root { root_member, .. } = link.payload() else {
            return Err(Error::graph_corrupt("root link without a ROOT action"));
        };
        let device = root_member.devices.get(&context.device_id).ok_or_else(|| {
            Error::invalid_signature("root link signed by a device ROOT does not enroll")
        })?;
        if device.keys.signature != context.public_key {
            return Err(Error::invalid_signature(
                "root link key does not match the founding device",
            ));
        }
        return Ok(());
    }

    if let Some(member) = state.members.get(&context.user_name) {
        let device = member.devices.get(&context.device_id).ok_or_else(|| {
            Error::invalid_signature(format!(
                "link by {} signed by unenrolled device {}",
                context.user_name, context.device_id
            ))
        })?;
        if device.keys.signature != context.public_key {
            return Err(Error::invalid_signature(format!(
                "link by {} signed with a stale or foreign device key",
                context.user_name
            )));
        }
        Ok(())
    } else if let Some(server) = state.servers.get(&context.user_name) {
        if server.keys.signature != context.public_key {
            return Err(Error::invalid_signature(format!(
                "link by server {} signed with a stale key",
                context.user_name
            )));
        }
        Ok(())
    } else {
        Err(Error::not_found(format!(
            "link author {} is not enrolled",
            context.user_name
        )))
    }
}

/// Reduce one link into the state.
pub fn reduce(state: TeamState, link: &Link) -> Result<TeamState> {
    link.verify_signature()?;
    check_author(&state, link)?;
    validators::validate(&state, link)?;
    Ok(apply(state, link))
}

/// Fold a linearized sequence from the initial state.
pub fn reduce_sequence(links: &[Link]) -> Result<TeamState> {
    let mut state = TeamState::new();
    for link in links {
        state = reduce(state, link).map_err(|e| {
            tracing::warn!(
                action = link.payload().tag(),
                author = %link.author().user_name,
                error = %e,
                "link rejected during fold"
            );
            e
        })?;
    }
    Ok(state)
}

/// Apply a validated action (effect).
fn apply(mut state: TeamState, link: &Link) -> TeamState {
    let action = link.payload();
    match action {
        TeamAction::Root {
            team_name,
            root_member,
            lockboxes,
        } => {
            state.team_name = team_name.clone();
            state.root_context = Some(link.author().clone());
            state.roles.insert(ADMIN_ROLE.to_string(), Role::admin());
            state
                .members
                .insert(root_member.user_name.clone(), root_member.clone());
            state.lockboxes.extend(lockboxes.iter().cloned());
        }

        TeamAction::AddMember {
            member,
            roles,
            lockboxes,
        } => {
            let mut member = member.clone();
            member.roles.extend(roles.iter().cloned());
            state.members.insert(member.user_name.clone(), member);
            state.lockboxes.extend(lockboxes.iter().cloned());
        }

        TeamAction::RemoveMember {
            user_name,
            lockboxes,
            rotated_keys,
        } => {
            if let Some(member) = state.members.remove(user_name) {
                for (id, device) in &member.devices {
                    state.removed_devices.insert(id.clone(), device.clone());
                }
                state.removed_members.insert(user_name.clone(), member);
            }
            state.lockboxes.extend(lockboxes.iter().cloned());
            apply_rotated_keys(&mut state, rotated_keys);
        }

        TeamAction::AddRole { role, lockboxes } => {
            state.roles.insert(role.role_name.clone(), role.clone());
            state.lockboxes.extend(lockboxes.iter().cloned());
        }

        TeamAction::RemoveRole {
            role_name,
            lockboxes,
            rotated_keys,
        } => {
            state.roles.remove(role_name);
            for member in state.members.values_mut() {
                member.roles.remove(role_name);
            }
            state.lockboxes.extend(lockboxes.iter().cloned());
            apply_rotated_keys(&mut state, rotated_keys);
        }

        TeamAction::AddMemberRole {
            user_name,
            role_name,
            lockboxes,
        } => {
            if let Some(member) = state.members.get_mut(user_name) {
                member.roles.insert(role_name.clone());
            }
            state.lockboxes.extend(lockboxes.iter().cloned());
        }

        TeamAction::RemoveMemberRole {
            user_name,
            role_name,
            lockboxes,
            rotated_keys,
        } => {
            if let Some(member) = state.members.get_mut(user_name) {
                member.roles.remove(role_name);
            }
            state.lockboxes.extend(lockboxes.iter().cloned());
            apply_rotated_keys(&mut state, rotated_keys);
        }

        TeamAction::AddDevice {
            user_name,
            device,
            lockboxes,
        } => {
            if let Some(member) = state.members.get_mut(user_name) {
                member
                    .devices
                    .insert(device.device_id.clone(), device.clone());
            }
            state.lockboxes.extend(lockboxes.iter().cloned());
        }

        TeamAction::RemoveDevice {
            user_name,
            device_id,
            lockboxes,
            rotated_keys,
        } => {
            if let Some(member) = state.members.get_mut(user_name) {
                if let Some(device) = member.devices.remove(device_id) {
                    state.removed_devices.insert(device_id.clone(), device);
                }
            }
            state.lockboxes.extend(lockboxes.iter().cloned());
            apply_rotated_keys(&mut state, rotated_keys);
        }

        TeamAction::AddServer { server, lockboxes } => {
            state
                .servers
                .insert(server.host.as_str().to_string(), server.clone());
            state.lockboxes.extend(lockboxes.iter().cloned());
        }

        TeamAction::RemoveServer {
            host,
            lockboxes,
            rotated_keys,
        } => {
            state.servers.remove(host.as_str());
            state.lockboxes.extend(lockboxes.iter().cloned());
            apply_rotated_keys(&mut state, rotated_keys);
        }

        TeamAction::PostInvitation { invitation } => {
            state.invitations.insert(
                invitation.id.clone(),
                PostedInvitation {
                    invitation: invitation.clone(),
                    revoked: false,
                    uses: 0,
                },
            );
        }

        TeamAction::RevokeInvitation { id } => {
            if let Some(posted) = state.invitations.get_mut(id) {
                posted.revoked = true;
            }
        }

        TeamAction::AdmitInvitedMember {
            proof,
            roles,
            lockboxes,
        } => {
            if let Some(posted) = state.invitations.get_mut(&proof.id) {
                posted.uses += 1;
            }
            let mut devices = std::collections::BTreeMap::new();
            if let Some(device) = &proof.payload.device {
                devices.insert(device.device_id.clone(), device.clone());
            }
            state.members.insert(
                proof.payload.name.clone(),
                crate::state::Member {
                    user_name: proof.payload.name.clone(),
                    keys: proof.payload.keys.clone(),
                    roles: roles.iter().cloned().collect(),
                    devices,
                },
            );
            state.lockboxes.extend(lockboxes.iter().cloned());
        }

        TeamAction::AdmitInvitedDevice {
            proof,
            user_name,
            lockboxes,
        } => {
            if let Some(posted) = state.invitations.get_mut(&proof.id) {
                posted.uses += 1;
            }
            if let (Some(member), Some(device)) =
                (state.members.get_mut(user_name), &proof.payload.device)
            {
                member
                    .devices
                    .insert(device.device_id.clone(), device.clone());
            }
            state.lockboxes.extend(lockboxes.iter().cloned());
        }

        TeamAction::ChangeKeys { keys, lockboxes } => {
            match keys.scope {
                KeyScope::Member => {
                    if let Some(member) = state.members.get_mut(&keys.name) {
                        member.keys = keys.clone();
                    }
                }
                KeyScope::Server => {
                    if let Some(server) = state.servers.get_mut(&keys.name) {
                        server.keys = keys.clone();
                    }
                }
                // team and role keys live only in lockboxes
                _ => {}
            }
            state.lockboxes.extend(lockboxes.iter().cloned());
        }
    }
    state
}

fn apply_rotated_keys(state: &mut TeamState, rotated: &[sigil_keyset::PublicKeyset]) {
    for keys in rotated {
        match keys.scope {
            KeyScope::Member => {
                if let Some(member) = state.members.get_mut(&keys.name) {
                    member.keys = keys.clone();
                }
            }
            KeyScope::Server => {
                if let Some(server) = state.servers.get_mut(&keys.name) {
                    server.keys = keys.clone();
                }
            }
            _ => {}
        }
    }
}
