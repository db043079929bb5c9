//! The connection state machine.
//!
//! One `Connection` drives one pairwise session:
//! `idle → connecting → authenticating → synchronizing → negotiating →
//! connected → disconnected`. Both sides run the same machine; identity
//! verification is mutual (each side challenges the other), so the
//! verified/accepted flags advance independently until both hold.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use sigil_core::{
    aead_decrypt, aead_encrypt, canonical, hash, random_bytes, seal, sign, unseal, verify,
    DeviceId, Error, Hash, Result, SymmetricKey,
};
use sigil_core::hash::domain;
use sigil_invitation::ProofOfInvitation;
use sigil_keyset::{Device, InviteeContext, MemberContext};
use sigil_team::Team;

use crate::message::{
    Challenge, ConnectionMessage, IdentityClaim, NumberedConnectionMessage, SyncSummary,
};
use crate::sync::links_to_send;

/// Tunables for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Per-phase deadline in milliseconds.
    pub phase_timeout_ms: u64,
    /// How far ahead of the expected index a message may arrive.
    pub reorder_window: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            phase_timeout_ms: 30_000,
            reorder_window: 8,
        }
    }
}

/// Top-level protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not started.
    Idle,
    /// Identity request sent, waiting for the peer to claim.
    Connecting,
    /// Claims exchanged; challenges and proofs in flight.
    Authenticating,
    /// Both identities accepted; graphs converging.
    Synchronizing,
    /// Graphs converged; session seeds in flight.
    Negotiating,
    /// Session key established.
    Connected,
    /// Terminal.
    Disconnected,
}

/// Events the host drains after each call.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Session key established; the channel is usable.
    Connected,
    /// Sync advanced the local graph to a new head.
    Updated {
        /// The new head.
        head: Hash,
    },
    /// The connection ended.
    Disconnected {
        /// Why.
        reason: String,
    },
    /// A local failure. The peer has been sent a disconnect.
    Error {
        /// The failure.
        error: Error,
    },
    /// A decrypted application payload.
    Message {
        /// The plaintext.
        payload: Vec<u8>,
    },
}

enum LocalParty {
    Member { team: Arc<Mutex<Team>> },
    Invitee { context: InviteeContext },
}

struct PeerIdentity {
    user_name: String,
    device_id: DeviceId,
}

/// One pairwise connection.
pub struct Connection {
    config: ConnectionConfig,
    party: LocalParty,
    phase: Phase,
    outbox: VecDeque<NumberedConnectionMessage>,
    events: VecDeque<ConnectionEvent>,
    next_index: u32,
    expected_index: u32,
    reorder_buffer: BTreeMap<u32, ConnectionMessage>,
    issued_challenge: Option<Challenge>,
    deferred_claim: Option<IdentityClaim>,
    peer: Option<PeerIdentity>,
    peer_known: BTreeSet<Hash>,
    peer_verified: bool,
    local_accepted: bool,
    synced: bool,
    seed: Vec<u8>,
    seed_sent: bool,
    peer_seed: Option<Vec<u8>>,
    session_key: Option<SymmetricKey>,
    deadline: Option<u64>,
}

impl Connection {
    /// A connection for an enrolled member sharing a team handle.
    pub fn new(team: Arc<Mutex<Team>>, config: ConnectionConfig) -> Self {
        Self::with_party(LocalParty::Member { team }, config)
    }

    /// A connection for a newcomer holding only an invitation seed.
    pub fn for_invitee(context: InviteeContext, config: ConnectionConfig) -> Self {
        Self::with_party(LocalParty::Invitee { context }, config)
    }

    fn with_party(party: LocalParty, config: ConnectionConfig) -> Self {
        Self {
            config,
            party,
            phase: Phase::Idle,
            outbox: VecDeque::new(),
            events: VecDeque::new(),
            next_index: 0,
            expected_index: 0,
            reorder_buffer: BTreeMap::new(),
            issued_challenge: None,
            deferred_claim: None,
            peer: None,
            peer_known: BTreeSet::new(),
            peer_verified: false,
            local_accepted: false,
            synced: false,
            seed: random_bytes(32),
            seed_sent: false,
            peer_seed: None,
            session_key: None,
            deadline: None,
        }
    }

    // ------------------------------------------------------------------
    // host surface

    /// Begin the protocol. Idempotent after the first call.
    pub fn start(&mut self, now: u64) {
        if self.phase != Phase::Idle {
            return;
        }
        self.phase = Phase::Connecting;
        self.arm_deadline(now);
        self.send(ConnectionMessage::RequestIdentity);
    }

    /// Cooperatively stop. Synchronous and idempotent; a stopped
    /// connection refuses further deliveries.
    pub fn stop(&mut self) {
        if self.phase == Phase::Disconnected {
            return;
        }
        self.send(ConnectionMessage::Disconnect {
            message: "stopped".into(),
        });
        self.phase = Phase::Disconnected;
        self.events.push_back(ConnectionEvent::Disconnected {
            reason: "stopped".into(),
        });
    }

    /// Deliver one inbound message.
    pub fn deliver(&mut self, numbered: NumberedConnectionMessage, now: u64) -> Result<()> {
        if self.phase == Phase::Disconnected {
            return Err(Error::protocol("connection is stopped"));
        }
        if numbered.index < self.expected_index {
            return self.fail(Error::protocol(format!(
                "duplicate message index {} (expected {})",
                numbered.index, self.expected_index
            )));
        }
        if numbered.index > self.expected_index {
            if numbered.index - self.expected_index > self.config.reorder_window {
                return self.fail(Error::protocol(format!(
                    "message index {} outside reorder window (expected {})",
                    numbered.index, self.expected_index
                )));
            }
            self.reorder_buffer.insert(numbered.index, numbered.message);
            return Ok(());
        }

        self.expected_index += 1;
        self.dispatch_or_fail(numbered.message, now)?;
        while let Some(message) = self.reorder_buffer.remove(&self.expected_index) {
            self.expected_index += 1;
            self.dispatch_or_fail(message, now)?;
        }
        Ok(())
    }

    fn dispatch_or_fail(&mut self, message: ConnectionMessage, now: u64) -> Result<()> {
        match self.dispatch(message, now) {
            Ok(()) => Ok(()),
            // a handler that already failed has disconnected; anything
            // else still owes the peer a disconnect
            Err(e) if self.phase == Phase::Disconnected => Err(e),
            Err(e) => self.fail(e),
        }
    }

    /// Check the current phase deadline.
    pub fn tick(&mut self, now: u64) {
        if matches!(self.phase, Phase::Idle | Phase::Connected | Phase::Disconnected) {
            return;
        }
        if let Some(deadline) = self.deadline {
            if now > deadline {
                let _ = self.fail(Error::timeout(format!("{:?} phase", self.phase)));
            }
        }
    }

    /// Announce a local head change to the peer.
    pub fn local_update(&mut self, head: Hash) {
        if !matches!(
            self.phase,
            Phase::Synchronizing | Phase::Negotiating | Phase::Connected
        ) {
            return;
        }
        self.send(ConnectionMessage::LocalUpdate { head });
    }

    /// Send an application payload over the encrypted channel.
    pub fn send_application(&mut self, payload: &[u8]) -> Result<()> {
        let key = self
            .session_key
            .as_ref()
            .ok_or_else(|| Error::protocol("channel is not established"))?;
        let sealed = aead_encrypt(payload, key)?;
        self.send(ConnectionMessage::EncryptedMessage { payload: sealed });
        Ok(())
    }

    /// Drain messages queued for the transport.
    pub fn take_outbox(&mut self) -> Vec<NumberedConnectionMessage> {
        self.outbox.drain(..).collect()
    }

    /// Drain events queued for the host.
    pub fn take_events(&mut self) -> Vec<ConnectionEvent> {
        self.events.drain(..).collect()
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the encrypted channel is established.
    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Connected
    }

    /// The negotiated session key, once connected.
    pub fn session_key(&self) -> Option<&SymmetricKey> {
        self.session_key.as_ref()
    }

    /// The team handle, present once for members and after admission for
    /// invitees.
    pub fn team(&self) -> Option<Arc<Mutex<Team>>> {
        match &self.party {
            LocalParty::Member { team } => Some(team.clone()),
            LocalParty::Invitee { .. } => None,
        }
    }

    // ------------------------------------------------------------------
    // internals

    fn send(&mut self, message: ConnectionMessage) {
        tracing::trace!(tag = message.tag(), index = self.next_index, "sending");
        self.outbox.push_back(NumberedConnectionMessage {
            index: self.next_index,
            message,
        });
        self.next_index += 1;
    }

    fn arm_deadline(&mut self, now: u64) {
        self.deadline = Some(now + self.config.phase_timeout_ms);
    }

    fn fail(&mut self, error: Error) -> Result<()> {
        tracing::warn!(error = %error, "connection failure");
        self.events.push_back(ConnectionEvent::Error {
            error: error.clone(),
        });
        self.send(ConnectionMessage::Disconnect {
            message: error.to_string(),
        });
        self.phase = Phase::Disconnected;
        self.events.push_back(ConnectionEvent::Disconnected {
            reason: error.to_string(),
        });
        Err(error)
    }

    fn local_device(&self) -> Result<Device> {
        match &self.party {
            LocalParty::Member { team } => Ok(team.lock().context().device.clone()),
            LocalParty::Invitee { context } => Ok(context.device.clone()),
        }
    }

    fn dispatch(&mut self, message: ConnectionMessage, now: u64) -> Result<()> {
        tracing::trace!(tag = message.tag(), phase = ?self.phase, "received");
        match message {
            ConnectionMessage::RequestIdentity => self.handle_request_identity(now),
            ConnectionMessage::ClaimIdentity { claim } => self.handle_claim(claim, now),
            ConnectionMessage::ChallengeIdentity { challenge } => self.handle_challenge(challenge),
            ConnectionMessage::ProveIdentity { challenge, proof } => {
                self.handle_proof(challenge, proof, now)
            }
            ConnectionMessage::AcceptIdentity => {
                self.local_accepted = true;
                self.advance(now);
                Ok(())
            }
            ConnectionMessage::RejectIdentity { message } => {
                self.fail(Error::invalid_signature(format!(
                    "peer rejected our identity: {message}"
                )))
            }
            ConnectionMessage::AcceptInvitation {
                serialized_graph,
                team_keysets,
            } => self.handle_accept_invitation(&serialized_graph, team_keysets, now),
            ConnectionMessage::Sync { summary } => self.handle_sync(summary, now),
            ConnectionMessage::LocalUpdate { head } => self.handle_local_update(head),
            ConnectionMessage::Seed { encrypted_seed } => {
                self.handle_seed(&encrypted_seed, now)
            }
            ConnectionMessage::EncryptedMessage { payload } => self.handle_encrypted(&payload),
            ConnectionMessage::Disconnect { message } => {
                self.phase = Phase::Disconnected;
                self.events
                    .push_back(ConnectionEvent::Disconnected { reason: message });
                Ok(())
            }
            ConnectionMessage::Error { message } => {
                self.phase = Phase::Disconnected;
                self.events.push_back(ConnectionEvent::Error {
                    error: Error::protocol(format!("peer error: {message}")),
                });
                self.events.push_back(ConnectionEvent::Disconnected {
                    reason: "peer error".into(),
                });
                Ok(())
            }
            ConnectionMessage::LocalError { .. } => {
                self.fail(Error::protocol("LOCAL_ERROR is not a wire message"))
            }
        }
    }

    fn handle_request_identity(&mut self, now: u64) -> Result<()> {
        if self.phase == Phase::Idle {
            // the peer started first; reciprocate so authentication is mutual
            self.phase = Phase::Connecting;
            self.send(ConnectionMessage::RequestIdentity);
        }
        self.phase = Phase::Authenticating;
        self.arm_deadline(now);
        let claim = match &self.party {
            LocalParty::Member { team } => IdentityClaim::Member {
                device_id: team.lock().context().device.device_id.clone(),
            },
            LocalParty::Invitee { context } => {
                let proof = ProofOfInvitation::accept_member(
                    &context.invitation_seed,
                    &context.user,
                    &context.device,
                )?;
                IdentityClaim::Invitee { proof }
            }
        };
        self.send(ConnectionMessage::ClaimIdentity { claim });
        Ok(())
    }

    fn handle_claim(&mut self, claim: IdentityClaim, now: u64) -> Result<()> {
        match claim {
            IdentityClaim::Member { device_id } => {
                let team = match &self.party {
                    LocalParty::Member { team } => team.clone(),
                    LocalParty::Invitee { .. } => {
                        // no team state yet: hold the claim until admission
                        self.deferred_claim = Some(IdentityClaim::Member { device_id });
                        return Ok(());
                    }
                };
                let user_name = {
                    let team = team.lock();
                    match team.state().member_by_device(&device_id) {
                        Ok(member) => member.user_name.clone(),
                        Err(e) => {
                            self.send(ConnectionMessage::RejectIdentity {
                                message: format!("unknown device {device_id}"),
                            });
                            return self.fail(e);
                        }
                    }
                };
                let challenge = Challenge {
                    nonce: random_bytes(32),
                    user_name: user_name.clone(),
                    device_id: device_id.clone(),
                    timestamp: now,
                };
                self.peer = Some(PeerIdentity {
                    user_name,
                    device_id,
                });
                self.issued_challenge = Some(challenge.clone());
                self.phase = Phase::Authenticating;
                self.arm_deadline(now);
                self.send(ConnectionMessage::ChallengeIdentity { challenge });
                Ok(())
            }
            IdentityClaim::Invitee { proof } => {
                let LocalParty::Member { team } = &self.party else {
                    return self.fail(Error::protocol(
                        "two invitees cannot admit each other",
                    ));
                };
                let team = team.clone();
                let (graph_bytes, keysets) = {
                    let mut team = team.lock();
                    if let Err(e) = team.admit(proof.clone()) {
                        self.send(ConnectionMessage::RejectIdentity {
                            message: e.to_string(),
                        });
                        return self.fail(e);
                    }
                    (canonical::to_vec(team.graph())?, team.team_scope_keysets())
                };
                tracing::info!(invitee = %proof.payload.name, "invitation accepted");
                self.send(ConnectionMessage::AcceptInvitation {
                    serialized_graph: graph_bytes,
                    team_keysets: keysets,
                });
                self.phase = Phase::Authenticating;
                self.arm_deadline(now);
                Ok(())
            }
        }
    }

    fn handle_challenge(&mut self, challenge: Challenge) -> Result<()> {
        let device = self.local_device()?;
        if challenge.device_id != device.device_id {
            return self.fail(Error::protocol(
                "challenge names a device we do not control",
            ));
        }
        let bytes = canonical::to_vec(&challenge)?;
        let proof = sign(&bytes, &device.keys.signature.secret);
        self.send(ConnectionMessage::ProveIdentity { challenge, proof });
        Ok(())
    }

    fn handle_proof(
        &mut self,
        challenge: Challenge,
        proof: sigil_core::Signature,
        now: u64,
    ) -> Result<()> {
        if self.issued_challenge.as_ref() != Some(&challenge) {
            return self.fail(Error::protocol("proof answers a challenge we never issued"));
        }
        let Some(team) = self.team() else {
            return self.fail(Error::protocol("no team state to verify a proof against"));
        };
        let device_key = {
            let team = team.lock();
            let member = team.state().member(&challenge.user_name)?.clone();
            let Some(device) = member.devices.get(&challenge.device_id) else {
                self.send(ConnectionMessage::RejectIdentity {
                    message: "unknown device".into(),
                });
                return self.fail(Error::not_found(format!(
                    "device {} of {}",
                    challenge.device_id, challenge.user_name
                )));
            };
            device.keys.signature
        };
        let bytes = canonical::to_vec(&challenge)?;
        if !verify(&bytes, &proof, &device_key) {
            self.send(ConnectionMessage::RejectIdentity {
                message: "challenge proof failed verification".into(),
            });
            return self.fail(Error::invalid_signature(format!(
                "identity proof by {}",
                challenge.user_name
            )));
        }
        self.issued_challenge = None;
        self.peer_verified = true;
        self.send(ConnectionMessage::AcceptIdentity);
        self.advance(now);
        Ok(())
    }

    fn handle_accept_invitation(
        &mut self,
        serialized_graph: &[u8],
        team_keysets: Vec<sigil_keyset::Keyset>,
        now: u64,
    ) -> Result<()> {
        let LocalParty::Invitee { context } = &self.party else {
            return self.fail(Error::protocol("we did not present an invitation"));
        };
        let graph = canonical::from_slice(serialized_graph)?;
        let member_context = MemberContext {
            user: context.user.clone(),
            device: context.device.clone(),
        };
        let team = Team::join(graph, team_keysets, member_context)?;
        tracing::info!(team = %team.name(), "joined team via invitation");
        self.party = LocalParty::Member {
            team: Arc::new(Mutex::new(team)),
        };

        // re-enter authentication as an enrolled member
        let device_id = self.local_device()?.device_id;
        self.send(ConnectionMessage::ClaimIdentity {
            claim: IdentityClaim::Member { device_id },
        });
        self.phase = Phase::Authenticating;
        self.arm_deadline(now);

        if let Some(claim) = self.deferred_claim.take() {
            self.handle_claim(claim, now)?;
        }
        Ok(())
    }

    fn advance(&mut self, now: u64) {
        if self.phase == Phase::Authenticating && self.peer_verified && self.local_accepted {
            self.phase = Phase::Synchronizing;
            self.arm_deadline(now);
            self.send_sync_summary();
        }
    }

    fn our_summary(&self, team: &Team) -> SyncSummary {
        // before the peer's first summary arrives we know nothing about
        // what it holds (a real peer always knows at least the root), so
        // the opening round carries no links
        let links = if self.peer_known.is_empty() {
            Default::default()
        } else {
            links_to_send(team.graph(), &self.peer_known)
        };
        SyncSummary {
            head: team.head(),
            known: team.graph().known_hashes(),
            links,
        }
    }

    fn send_sync_summary(&mut self) {
        let Some(team) = self.team() else { return };
        let summary = {
            let team = team.lock();
            self.our_summary(&team)
        };
        self.send(ConnectionMessage::Sync { summary });
    }

    fn handle_sync(&mut self, summary: SyncSummary, now: u64) -> Result<()> {
        if !matches!(
            self.phase,
            Phase::Synchronizing | Phase::Negotiating | Phase::Connected
        ) {
            return self.fail(Error::protocol("SYNC before identities were accepted"));
        }
        let Some(team) = self.team() else {
            return self.fail(Error::protocol("SYNC without team state"));
        };

        self.peer_known = summary.known.clone();
        let mut guard = team.lock();
        let before = guard.head();
        if !summary.links.is_empty() || guard.graph().contains(&summary.head) {
            if let Err(e) = guard.receive_links(summary.links.clone(), summary.head) {
                drop(guard);
                return self.fail(e);
            }
        }
        let our_head = guard.head();
        let ingested = our_head != before;
        let missing = links_to_send(guard.graph(), &self.peer_known);
        let reply = if ingested || !missing.is_empty() || our_head != summary.head {
            Some(SyncSummary {
                head: our_head,
                known: guard.graph().known_hashes(),
                links: missing,
            })
        } else {
            None
        };
        drop(guard);

        if ingested {
            self.events.push_back(ConnectionEvent::Updated { head: our_head });
        }
        if let Some(summary) = reply {
            self.send(ConnectionMessage::Sync { summary });
        }
        if our_head == summary.head {
            self.on_converged(now);
        }
        Ok(())
    }

    fn handle_local_update(&mut self, head: Hash) -> Result<()> {
        if !matches!(
            self.phase,
            Phase::Synchronizing | Phase::Negotiating | Phase::Connected
        ) {
            return Ok(());
        }
        let Some(team) = self.team() else { return Ok(()) };
        let behind = !team.lock().graph().contains(&head);
        if behind {
            self.send_sync_summary();
        }
        Ok(())
    }

    fn on_converged(&mut self, now: u64) {
        if self.phase == Phase::Synchronizing {
            self.synced = true;
            self.phase = Phase::Negotiating;
            self.arm_deadline(now);
            if let Err(e) = self.send_seed() {
                let _ = self.fail(e);
                return;
            }
        }
        self.try_establish(now);
    }

    fn send_seed(&mut self) -> Result<()> {
        if self.seed_sent {
            return Ok(());
        }
        let Some(team) = self.team() else {
            return Err(Error::protocol("no team state for seed negotiation"));
        };
        let Some(peer) = &self.peer else {
            return Err(Error::protocol("no verified peer for seed negotiation"));
        };
        let encrypted_seed = {
            let team = team.lock();
            let peer_member = team.state().member(&peer.user_name)?;
            seal(
                &self.seed,
                &peer_member.keys.encryption,
                &team.context().user.keys.encryption.secret,
            )?
        };
        self.send(ConnectionMessage::Seed { encrypted_seed });
        self.seed_sent = true;
        Ok(())
    }

    fn handle_seed(&mut self, encrypted_seed: &[u8], now: u64) -> Result<()> {
        if !matches!(
            self.phase,
            Phase::Synchronizing | Phase::Negotiating | Phase::Connected
        ) {
            return self.fail(Error::protocol("SEED before identities were accepted"));
        }
        let Some(team) = self.team() else {
            return self.fail(Error::protocol("SEED without team state"));
        };
        let Some(peer) = &self.peer else {
            return self.fail(Error::protocol("SEED before the peer was identified"));
        };
        let seed = {
            let team = team.lock();
            let peer_member = team.state().member(&peer.user_name)?;
            unseal(
                encrypted_seed,
                &peer_member.keys.encryption,
                &team.context().user.keys.encryption.secret,
            )?
        };
        self.peer_seed = Some(seed);
        self.try_establish(now);
        Ok(())
    }

    fn try_establish(&mut self, _now: u64) {
        if self.phase == Phase::Connected || !self.synced || !self.seed_sent {
            return;
        }
        let Some(peer_seed) = &self.peer_seed else {
            return;
        };
        let (first, second) = if self.seed <= *peer_seed {
            (&self.seed, peer_seed)
        } else {
            (peer_seed, &self.seed)
        };
        let mut material = first.clone();
        material.extend_from_slice(second);
        self.session_key = Some(SymmetricKey(hash(domain::SESSION, &material).to_bytes()));
        self.phase = Phase::Connected;
        self.deadline = None;
        tracing::info!("session key established");
        self.events.push_back(ConnectionEvent::Connected);
    }

    fn handle_encrypted(&mut self, payload: &[u8]) -> Result<()> {
        let Some(key) = &self.session_key else {
            return self.fail(Error::protocol(
                "ENCRYPTED_MESSAGE before the channel was established",
            ));
        };
        match aead_decrypt(payload, key) {
            Ok(plaintext) => {
                self.events.push_back(ConnectionEvent::Message {
                    payload: plaintext,
                });
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }
}
