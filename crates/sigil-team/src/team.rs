//! The host-facing team handle.
//!
//! `Team` owns one replica of the graph, the state reduced from it, the
//! local party's keyring, and the listener list. Every mutation funnels
//! through a single serial path: build the action, append a link, reduce,
//! absorb new lockboxes, notify listeners. Connections share the handle
//! behind a mutex and call [`Team::receive_graph`] with whatever their
//! peer sends.

use sigil_core::hash::domain;
use sigil_core::time::now_ms;
use sigil_core::{
    aead_decrypt, aead_encrypt, canonical, encoding, hash, sign, verify, DeviceId, Error, Hash,
    Host, Result, Signature, SymmetricKey,
};
use sigil_graph::{LinkContext, SignatureGraph};
use sigil_invitation::{
    Invitation, InvitationId, InvitationOptions, InvitationType, ProofOfInvitation,
};
use sigil_keyset::{
    KeyMetadata, KeyScope, Keyring, Keyset, Lockbox, MemberContext, PublicDevice, ADMIN_ROLE,
    TEAM_SCOPE_NAME,
};
use serde::{Deserialize, Serialize};

use crate::actions::TeamAction;
use crate::reducer::{reduce, reduce_sequence};
use crate::resolver::MembershipResolver;
use crate::rotation::{plan_rotation, ScopeName};
use crate::state::{Member, Role, Server, TeamState};

/// Separator between the graph and keyring sections of a storage blob.
const BLOB_SEPARATOR: &[u8] = b"\n--sigil-keyring--\n";

/// Events a team emits to its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamEvent {
    /// The graph advanced (local action or remote sync) and state was
    /// re-reduced.
    Updated {
        /// The new head.
        head: Hash,
    },
}

/// Options for minting a member invitation.
#[derive(Debug, Clone, Default)]
pub struct InviteOptions {
    /// Seed to use; a random one is generated when absent.
    pub seed: Option<String>,
    /// Maximum number of admissions, 0 for unlimited. Defaults to 1.
    pub max_uses: Option<u32>,
    /// Unix-ms expiration, 0 for none.
    pub expiration: u64,
}

/// A payload encrypted to the team or to one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Scope the payload is encrypted to.
    pub scope: KeyScope,
    /// Scope name.
    pub name: String,
    /// Key generation used.
    pub generation: u32,
    /// AEAD ciphertext.
    #[serde(with = "encoding::b64")]
    pub ciphertext: Vec<u8>,
}

/// A payload signed with the author's member keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// The signed payload.
    #[serde(with = "encoding::b64")]
    pub payload: Vec<u8>,
    /// Signature over the payload.
    pub signature: Signature,
    /// User name of the signer.
    pub author: String,
}

/// Symmetric AEAD key for a scope, derived from its encryption secret.
pub(crate) fn scope_symmetric(keyset: &Keyset) -> SymmetricKey {
    SymmetricKey(hash(domain::SCOPE_AEAD, keyset.encryption.secret.as_bytes()).to_bytes())
}

type Listener = Box<dyn FnMut(&TeamEvent) + Send>;

/// One replica of a team.
pub struct Team {
    context: MemberContext,
    graph: SignatureGraph<TeamAction>,
    state: TeamState,
    keyring: Keyring,
    listeners: Vec<Listener>,
}

impl Team {
    // ------------------------------------------------------------------
    // construction

    /// Found a new team with fresh team keys.
    pub fn create(team_name: impl Into<String>, context: MemberContext) -> Result<Team> {
        Self::create_with_seed(team_name, context, None)
    }

    /// Found a new team, deriving the team keys from a seed.
    pub fn create_with_seed(
        team_name: impl Into<String>,
        context: MemberContext,
        seed: Option<&[u8]>,
    ) -> Result<Team> {
        let team_keys = Keyset::create(KeyMetadata::team(), seed)?;
        let admin_keys = Keyset::create(KeyMetadata::admin(), None)?;
        let member_public = context.user.public_keys();

        let lockboxes = vec![
            Lockbox::create(&team_keys, &member_public)?,
            Lockbox::create(&admin_keys, &member_public)?,
            Lockbox::create(&context.user.keys, &context.device.keys.redact())?,
        ];
        let root_member = Member {
            user_name: context.user.user_name.clone(),
            keys: member_public,
            roles: [ADMIN_ROLE.to_string()].into(),
            devices: [(context.device.device_id.clone(), context.device.redact())].into(),
        };
        let action = TeamAction::Root {
            team_name: team_name.into(),
            root_member,
            lockboxes,
        };

        let author = LinkContext {
            user_name: context.user.user_name.clone(),
            device_id: context.device.device_id.clone(),
            public_key: context.device.keys.signature.public,
        };
        let graph = SignatureGraph::create(
            action,
            now_ms(),
            author,
            &context.device.keys.signature.secret,
        )?;
        let root_link = graph.signed(&graph.head())?.clone();
        let state = reduce(TeamState::new(), &root_link)?;
        let keyring = Keyring::collect(
            [
                context.user.keys.clone(),
                context.device.keys.clone(),
                team_keys,
                admin_keys,
            ],
            &state.lockboxes,
        );
        tracing::info!(team = %state.team_name, founder = %context.user.user_name, "team created");
        Ok(Team {
            context,
            graph,
            state,
            keyring,
            listeners: Vec::new(),
        })
    }

    /// Instantiate a replica from a received graph plus the keysets handed
    /// over out of band (invitation admission hands over the team keys).
    pub fn join(
        graph: SignatureGraph<TeamAction>,
        handed_keysets: Vec<Keyset>,
        context: MemberContext,
    ) -> Result<Team> {
        graph.validate()?;
        let sequence = graph.sequence(&MembershipResolver)?;
        let state = reduce_sequence(&sequence)?;
        let mut own = vec![context.user.keys.clone(), context.device.keys.clone()];
        own.extend(handed_keysets);
        let keyring = Keyring::collect(own, &state.lockboxes);
        Ok(Team {
            context,
            graph,
            state,
            keyring,
            listeners: Vec::new(),
        })
    }

    /// Restore a team from a storage blob produced by [`Team::save`].
    pub fn load(blob: &[u8], context: MemberContext) -> Result<Team> {
        let split = blob
            .windows(BLOB_SEPARATOR.len())
            .position(|w| w == BLOB_SEPARATOR)
            .ok_or_else(|| Error::serialization("storage blob has no keyring section"))?;
        let graph: SignatureGraph<TeamAction> = canonical::from_slice(&blob[..split])?;
        let mut keyring: Keyring = canonical::from_slice(&blob[split + BLOB_SEPARATOR.len()..])?;

        graph.validate()?;
        let sequence = graph.sequence(&MembershipResolver)?;
        let state = reduce_sequence(&sequence)?;
        keyring.absorb(&state.lockboxes);
        Ok(Team {
            context,
            graph,
            state,
            keyring,
            listeners: Vec::new(),
        })
    }

    /// Serialize graph and keyring into an opaque storage blob.
    pub fn save(&self) -> Result<Vec<u8>> {
        let mut blob = canonical::to_vec(&self.graph)?;
        blob.extend_from_slice(BLOB_SEPARATOR);
        blob.extend_from_slice(&canonical::to_vec(&self.keyring)?);
        Ok(blob)
    }

    // ------------------------------------------------------------------
    // events

    /// Subscribe to team events.
    pub fn subscribe(&mut self, listener: impl FnMut(&TeamEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: TeamEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    // ------------------------------------------------------------------
    // selectors

    /// The team name.
    pub fn name(&self) -> &str {
        &self.state.team_name
    }

    /// The local member's user name.
    pub fn user_name(&self) -> &str {
        &self.context.user.user_name
    }

    /// The local context.
    pub fn context(&self) -> &MemberContext {
        &self.context
    }

    /// The reduced team state.
    pub fn state(&self) -> &TeamState {
        &self.state
    }

    /// The local replica of the graph.
    pub fn graph(&self) -> &SignatureGraph<TeamAction> {
        &self.graph
    }

    /// The current head.
    pub fn head(&self) -> Hash {
        self.graph.head()
    }

    /// The local keyring.
    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    /// All members.
    pub fn members(&self) -> Vec<&Member> {
        self.state.members().collect()
    }

    /// Look up one member.
    pub fn member(&self, user_name: &str) -> Result<&Member> {
        self.state.member(user_name)
    }

    /// Whether a member with this name is enrolled.
    pub fn has(&self, user_name: &str) -> bool {
        self.state.has(user_name)
    }

    /// All roles.
    pub fn roles(&self) -> Vec<&Role> {
        self.state.roles().collect()
    }

    /// Whether a member holds a role granting admin permission.
    pub fn member_is_admin(&self, user_name: &str) -> bool {
        self.state.member_is_admin(user_name)
    }

    /// The current team keyset, secrets included.
    pub fn team_keys(&self) -> Result<&Keyset> {
        self.keyring.current(KeyScope::Team, TEAM_SCOPE_NAME)
    }

    /// The current admin role keyset, secrets included.
    pub fn admin_keys(&self) -> Result<&Keyset> {
        self.keyring.current(KeyScope::Role, ADMIN_ROLE)
    }

    /// Every team-scope keyset held, for handing to an admitted invitee.
    pub fn team_scope_keysets(&self) -> Vec<Keyset> {
        self.keyring
            .keysets()
            .iter()
            .filter(|k| k.scope == KeyScope::Team)
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // the serial mutation path

    fn link_context(&self) -> LinkContext {
        LinkContext {
            user_name: self.context.user.user_name.clone(),
            device_id: self.context.device.device_id.clone(),
            public_key: self.context.device.keys.signature.public,
        }
    }

    /// Append an action, validate it against current state, and commit.
    ///
    /// A rejected action leaves the replica untouched.
    fn post(&mut self, action: TeamAction) -> Result<Hash> {
        let tag = action.tag();
        let mut graph = self.graph.clone();
        let head = graph.append(
            action,
            now_ms(),
            self.link_context(),
            &self.context.device.keys.signature.secret,
        )?;
        let link = graph.signed(&head)?.clone();
        let state = reduce(self.state.clone(), &link)?;

        self.graph = graph;
        self.state = state;
        self.keyring.absorb(&self.state.lockboxes);
        tracing::debug!(action = tag, head = %head, "action posted");
        self.emit(TeamEvent::Updated { head });
        Ok(head)
    }

    /// Merge a peer's replica into ours and re-reduce.
    ///
    /// The merged graph is kept even if the fold rejects a link; in that
    /// case state stays at its last good value and the error is surfaced.
    pub fn receive_graph(&mut self, other: &SignatureGraph<TeamAction>) -> Result<Hash> {
        let before = self.graph.head();
        let head = self.graph.merge(other)?;
        self.after_merge(before, head)?;
        Ok(head)
    }

    /// Absorb loose links from a sync round and merge the peer's head.
    pub fn receive_links(
        &mut self,
        links: impl IntoIterator<Item = (Hash, sigil_graph::Link<TeamAction>)>,
        remote_head: Hash,
    ) -> Result<Hash> {
        let before = self.graph.head();
        let head = self.graph.ingest(links, remote_head)?;
        self.after_merge(before, head)?;
        Ok(head)
    }

    fn after_merge(&mut self, before: Hash, head: Hash) -> Result<()> {
        if head == before {
            return Ok(());
        }
        let sequence = self.graph.sequence(&MembershipResolver)?;
        self.state = reduce_sequence(&sequence)?;
        self.keyring.absorb(&self.state.lockboxes);
        tracing::debug!(head = %head, links = self.graph.len(), "merged remote links");
        self.emit(TeamEvent::Updated { head });
        Ok(())
    }

    // ------------------------------------------------------------------
    // membership

    /// Directly enroll a member whose public keys are already known.
    pub fn add_member(&mut self, member: Member, roles: Vec<String>) -> Result<()> {
        let mut lockboxes = vec![Lockbox::create(self.team_keys()?, &member.keys)?];
        for role in &roles {
            let role_keys = self.keyring.current(KeyScope::Role, role)?;
            lockboxes.push(Lockbox::create(role_keys, &member.keys)?);
        }
        self.post(TeamAction::AddMember {
            member,
            roles,
            lockboxes,
        })?;
        Ok(())
    }

    /// Remove a member, rotating every scope they could see.
    pub fn remove(&mut self, user_name: &str) -> Result<()> {
        let member = self.state.member(user_name)?;
        let scopes: Vec<ScopeName> = {
            let mut scopes = vec![(KeyScope::Member, member.user_name.clone())];
            scopes.extend(
                member
                    .devices
                    .keys()
                    .map(|id| (KeyScope::Device, id.as_str().to_string())),
            );
            scopes
        };
        let plan = plan_rotation(&self.state, &self.keyring, &scopes, &scopes, &[])?;
        self.post(TeamAction::RemoveMember {
            user_name: user_name.to_string(),
            lockboxes: plan.lockboxes,
            rotated_keys: plan.rotated_keys,
        })?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // roles

    /// Create a role with fresh role keys.
    pub fn add_role(&mut self, role_name: &str) -> Result<()> {
        let role_keys = Keyset::create(KeyMetadata::role(role_name), None)?;
        let admin_public = self.admin_keys()?.redact();
        let lockboxes = vec![Lockbox::create(&role_keys, &admin_public)?];
        self.post(TeamAction::AddRole {
            role: Role::new(role_name),
            lockboxes,
        })?;
        Ok(())
    }

    /// Delete a role.
    pub fn remove_role(&mut self, role_name: &str) -> Result<()> {
        let scope = vec![(KeyScope::Role, role_name.to_string())];
        let plan = plan_rotation(&self.state, &self.keyring, &scope, &scope, &[])?;
        self.post(TeamAction::RemoveRole {
            role_name: role_name.to_string(),
            lockboxes: plan.lockboxes,
            rotated_keys: plan.rotated_keys,
        })?;
        Ok(())
    }

    /// Grant a role to a member.
    pub fn add_member_role(&mut self, user_name: &str, role_name: &str) -> Result<()> {
        let member_keys = self.state.member(user_name)?.keys.clone();
        let role_keys = self.keyring.current(KeyScope::Role, role_name)?;
        let lockboxes = vec![Lockbox::create(role_keys, &member_keys)?];
        self.post(TeamAction::AddMemberRole {
            user_name: user_name.to_string(),
            role_name: role_name.to_string(),
            lockboxes,
        })?;
        Ok(())
    }

    /// Withdraw a role from a member, rotating the role keys.
    pub fn remove_member_role(&mut self, user_name: &str, role_name: &str) -> Result<()> {
        let seeds = vec![(KeyScope::Role, role_name.to_string())];
        let excluded = vec![(KeyScope::Member, user_name.to_string())];
        let plan = plan_rotation(&self.state, &self.keyring, &seeds, &[], &excluded)?;
        self.post(TeamAction::RemoveMemberRole {
            user_name: user_name.to_string(),
            role_name: role_name.to_string(),
            lockboxes: plan.lockboxes,
            rotated_keys: plan.rotated_keys,
        })?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // devices

    /// Directly enroll another device for the local member.
    ///
    /// Admin only, like every direct membership change; non-admin members
    /// enroll devices through device invitations instead.
    pub fn add_device(&mut self, device: PublicDevice) -> Result<()> {
        let lockboxes = vec![Lockbox::create(&self.context.user.keys, &device.keys)?];
        self.post(TeamAction::AddDevice {
            user_name: self.context.user.user_name.clone(),
            device,
            lockboxes,
        })?;
        Ok(())
    }

    /// Remove one of the local member's devices, rotating what it saw.
    ///
    /// Admin only, like every direct membership change.
    pub fn remove_device(&mut self, device_id: &DeviceId) -> Result<()> {
        let scope = vec![(KeyScope::Device, device_id.as_str().to_string())];
        let plan = plan_rotation(&self.state, &self.keyring, &scope, &scope, &[])?;
        self.post(TeamAction::RemoveDevice {
            user_name: self.context.user.user_name.clone(),
            device_id: device_id.clone(),
            lockboxes: plan.lockboxes,
            rotated_keys: plan.rotated_keys,
        })?;

        // the member scope rotates with the device; pick up the
        // replacement keys absorbed from the new lockboxes
        let user_name = self.context.user.user_name.clone();
        if let Ok(current) = self.keyring.current(KeyScope::Member, &user_name) {
            if current.generation > self.context.user.keys.generation {
                self.context.user.keys = current.clone();
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // servers

    /// Enroll a server principal.
    pub fn add_server(&mut self, server: Server) -> Result<()> {
        let lockboxes = vec![Lockbox::create(self.team_keys()?, &server.keys)?];
        self.post(TeamAction::AddServer { server, lockboxes })?;
        Ok(())
    }

    /// Remove a server principal, rotating what it saw.
    pub fn remove_server(&mut self, host: &Host) -> Result<()> {
        let scope = vec![(KeyScope::Server, host.as_str().to_string())];
        let plan = plan_rotation(&self.state, &self.keyring, &scope, &scope, &[])?;
        self.post(TeamAction::RemoveServer {
            host: host.clone(),
            lockboxes: plan.lockboxes,
            rotated_keys: plan.rotated_keys,
        })?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // invitations

    /// Post a member invitation. Returns the seed to share out of band
    /// and the posted invitation id.
    pub fn invite_member(
        &mut self,
        user_name: &str,
        options: InviteOptions,
    ) -> Result<(String, InvitationId)> {
        let seed = options
            .seed
            .unwrap_or_else(sigil_invitation::random_seed);
        let team_key = scope_symmetric(self.team_keys()?);
        let invitation = Invitation::create(
            &team_key,
            InvitationOptions {
                invitation_type: InvitationType::Member,
                name: user_name.to_string(),
                seed: seed.clone(),
                roles: Vec::new(),
                expiration: options.expiration,
                max_uses: options.max_uses.unwrap_or(1),
            },
        )?;
        let id = invitation.id.clone();
        self.post(TeamAction::PostInvitation { invitation })?;
        Ok((seed, id))
    }

    /// Post a device invitation for one of the local member's devices.
    pub fn invite_device(
        &mut self,
        device_id: &DeviceId,
        seed: Option<String>,
    ) -> Result<(String, InvitationId)> {
        let seed = seed.unwrap_or_else(sigil_invitation::random_seed);
        let team_key = scope_symmetric(self.team_keys()?);
        let invitation = Invitation::create(
            &team_key,
            InvitationOptions::device(device_id.as_str(), seed.clone()),
        )?;
        let id = invitation.id.clone();
        self.post(TeamAction::PostInvitation { invitation })?;
        Ok((seed, id))
    }

    /// Revoke a posted invitation.
    pub fn revoke_invitation(&mut self, id: &InvitationId) -> Result<()> {
        self.post(TeamAction::RevokeInvitation { id: id.clone() })?;
        Ok(())
    }

    /// Admit an invited member on the strength of their proof.
    pub fn admit(&mut self, proof: ProofOfInvitation) -> Result<()> {
        let posted = self.state.invitation(&proof.id)?;
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
        let team_key = scope_symmetric(self.team_keys()?);
        posted.invitation.validate(&proof, &team_key, now_ms())?;
        let payload = posted.invitation.open_payload(&team_key)?;

        let mut lockboxes = vec![Lockbox::create(self.team_keys()?, &proof.payload.keys)?];
        for role in &payload.roles {
            let role_keys = self.keyring.current(KeyScope::Role, role)?;
            lockboxes.push(Lockbox::create(role_keys, &proof.payload.keys)?);
        }
        lockboxes.extend(proof.payload.lockboxes.iter().cloned());

        tracing::info!(invitee = %proof.payload.name, id = %proof.id, "admitting invited member");
        self.post(TeamAction::AdmitInvitedMember {
            proof,
            roles: payload.roles,
            lockboxes,
        })?;
        Ok(())
    }

    /// Admit one of the local member's own invited devices.
    pub fn admit_device(&mut self, proof: ProofOfInvitation) -> Result<()> {
        let posted = self.state.invitation(&proof.id)?;
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
        let team_key = scope_symmetric(self.team_keys()?);
        posted.invitation.validate(&proof, &team_key, now_ms())?;
        let Some(device) = proof.payload.device.clone() else {
            return Err(Error::invalid("device proof carries no device"));
        };

        let lockboxes = vec![Lockbox::create(&self.context.user.keys, &device.keys)?];
        self.post(TeamAction::AdmitInvitedDevice {
            proof,
            user_name: self.context.user.user_name.clone(),
            lockboxes,
        })?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // keys

    /// Rotate the local member's keys to a caller-supplied replacement.
    ///
    /// The replacement must be the member scope at the next generation.
    pub fn change_keys(&mut self, new_keys: Keyset) -> Result<()> {
        let devices: Vec<PublicDevice> = self
            .state
            .member(&self.context.user.user_name)?
            .devices
            .values()
            .cloned()
            .collect();
        let mut lockboxes = Vec::with_capacity(devices.len());
        for device in devices {
            lockboxes.push(Lockbox::create(&new_keys, &device.keys)?);
        }
        self.post(TeamAction::ChangeKeys {
            keys: new_keys.redact(),
            lockboxes,
        })?;
        self.keyring.add(new_keys.clone());
        self.context.user.keys = new_keys;
        Ok(())
    }

    // ------------------------------------------------------------------
    // application payloads

    /// Encrypt a payload to the whole team, or to one role.
    pub fn encrypt(&self, payload: &[u8], role: Option<&str>) -> Result<EncryptedEnvelope> {
        let (scope, name) = match role {
            Some(role) => (KeyScope::Role, role),
            None => (KeyScope::Team, TEAM_SCOPE_NAME),
        };
        let keyset = self.keyring.current(scope, name)?;
        Ok(EncryptedEnvelope {
            scope,
            name: name.to_string(),
            generation: keyset.generation,
            ciphertext: aead_encrypt(payload, &scope_symmetric(keyset))?,
        })
    }

    /// Decrypt an envelope using the keyring.
    pub fn decrypt(&self, envelope: &EncryptedEnvelope) -> Result<Vec<u8>> {
        let keyset = self
            .keyring
            .at(envelope.scope, &envelope.name, envelope.generation)?;
        aead_decrypt(&envelope.ciphertext, &scope_symmetric(keyset))
    }

    /// Sign a payload with the local member's signing keys.
    pub fn sign(&self, payload: &[u8]) -> SignedEnvelope {
        SignedEnvelope {
            payload: payload.to_vec(),
            signature: sign(payload, &self.context.user.keys.signature.secret),
            author: self.context.user.user_name.clone(),
        }
    }

    /// Verify a signed envelope against the claimed author's current keys.
    pub fn verify(&self, envelope: &SignedEnvelope) -> Result<()> {
        let member = self.state.member(&envelope.author)?;
        if verify(
            &envelope.payload,
            &envelope.signature,
            &member.keys.signature,
        ) {
            Ok(())
        } else {
            Err(Error::invalid_signature(format!(
                "envelope claimed by {}",
                envelope.author
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_keyset::{Device, User};

    fn member_context(name: &str, device_name: &str) -> MemberContext {
        MemberContext {
            user: User::create(name, None).unwrap(),
            device: Device::create(name, device_name, None).unwrap(),
        }
    }

    #[test]
    fn create_produces_a_single_admin_member() {
        let team = Team::create("spies", member_context("alice", "laptop")).unwrap();
        assert_eq!(team.members().len(), 1);
        assert!(team.has("alice"));
        assert!(team.member_is_admin("alice"));
        assert_eq!(team.team_keys().unwrap().generation, 0);
        assert_eq!(team.name(), "spies");
    }

    #[test]
    fn save_load_round_trip() {
        let mut team = Team::create("spies", member_context("alice", "laptop")).unwrap();
        team.add_role("guest").unwrap();
        let blob = team.save().unwrap();

        let restored = Team::load(&blob, team.context().clone()).unwrap();
        assert_eq!(restored.head(), team.head());
        assert_eq!(restored.state(), team.state());
        assert!(restored.keyring().current(KeyScope::Role, "guest").is_ok());
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let team = Team::create("spies", member_context("alice", "laptop")).unwrap();
        let envelope = team.encrypt(b"meet at dawn", None).unwrap();
        assert_eq!(team.decrypt(&envelope).unwrap(), b"meet at dawn");
    }

    #[test]
    fn sign_verify_round_trip() {
        let team = Team::create("spies", member_context("alice", "laptop")).unwrap();
        let envelope = team.sign(b"attested");
        team.verify(&envelope).unwrap();

        let mut tampered = envelope;
        tampered.payload = b"forged".to_vec();
        assert!(team.verify(&tampered).is_err());
    }

    #[test]
    fn updated_event_fires_on_post() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut team = Team::create("spies", member_context("alice", "laptop")).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        team.subscribe(move |event| {
            assert!(matches!(event, TeamEvent::Updated { .. }));
            seen.fetch_add(1, Ordering::SeqCst);
        });
        team.add_role("guest").unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
