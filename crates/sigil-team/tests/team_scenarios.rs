//! End-to-end team scenarios: founding, invitation, admission, concurrent
//! writes, removal with rotation.

#![allow(clippy::unwrap_used, missing_docs)]

use sigil_core::Error;
use sigil_invitation::ProofOfInvitation;
use sigil_keyset::{
    Device, Keyring, KeyScope, MemberContext, User, ADMIN_ROLE, TEAM_SCOPE_NAME,
};
use sigil_team::{InviteOptions, Team};

fn context(name: &str, device_name: &str) -> MemberContext {
    MemberContext {
        user: User::create(name, None).unwrap(),
        device: Device::create(name, device_name, None).unwrap(),
    }
}

/// Found a team as alice, invite and admit a second member, and hand them
/// a joined replica.
fn team_of_two(second: &str) -> (Team, Team) {
    let mut alice = Team::create_with_seed("t", context("alice", "laptop"), Some(b"a-seed")).unwrap();
    let (seed, _) = alice.invite_member(second, InviteOptions::default()).unwrap();

    let joiner = context(second, "phone");
    let proof = ProofOfInvitation::accept_member(&seed, &joiner.user, &joiner.device).unwrap();
    alice.admit(proof).unwrap();

    let replica = Team::join(alice.graph().clone(), alice.team_scope_keysets(), joiner).unwrap();
    (alice, replica)
}

#[test]
fn found_invite_admit() {
    let mut alice =
        Team::create_with_seed("t", context("alice", "laptop"), Some(b"a-seed")).unwrap();
    let (seed, _) = alice
        .invite_member(
            "bob",
            InviteOptions {
                seed: Some("abcd-efgh-ijkl-mnop".into()),
                ..InviteOptions::default()
            },
        )
        .unwrap();
    assert_eq!(seed, "abcd-efgh-ijkl-mnop");

    let bob_context = context("bob", "phone");
    let proof =
        ProofOfInvitation::accept_member(&seed, &bob_context.user, &bob_context.device).unwrap();
    alice.admit(proof).unwrap();

    assert_eq!(alice.members().len(), 2);
    assert!(alice.has("bob"));

    let bob = Team::join(
        alice.graph().clone(),
        alice.team_scope_keysets(),
        bob_context,
    )
    .unwrap();
    assert_eq!(bob.team_keys().unwrap().generation, 0);
    assert_eq!(bob.state(), alice.state());
}

#[test]
fn concurrent_role_additions_converge() {
    let (mut alice, bob) = team_of_two("bob");
    alice.add_member_role("bob", ADMIN_ROLE).unwrap();
    let mut bob = Team::join(
        alice.graph().clone(),
        alice.team_scope_keysets(),
        bob.context().clone(),
    )
    .unwrap();

    alice.add_role("manager").unwrap();
    bob.add_role("guest").unwrap();

    alice.receive_graph(bob.graph()).unwrap();
    bob.receive_graph(alice.graph()).unwrap();

    let mut role_names: Vec<&str> = alice.roles().iter().map(|r| r.role_name.as_str()).collect();
    role_names.sort_unstable();
    assert_eq!(role_names, ["admin", "guest", "manager"]);
    assert_eq!(alice.state(), bob.state(), "replicas converge");
    assert_eq!(alice.head(), bob.head());
}

#[test]
fn remove_and_rotate() {
    let (mut alice, bob) = team_of_two("bob");
    alice.add_member_role("bob", ADMIN_ROLE).unwrap();
    let bob = Team::join(
        alice.graph().clone(),
        alice.team_scope_keysets(),
        bob.context().clone(),
    )
    .unwrap();
    let frozen_keyring = bob.keyring().clone();

    alice.remove("bob").unwrap();

    assert!(!alice.has("bob"));
    assert_eq!(alice.team_keys().unwrap().generation, 1);
    assert_eq!(alice.admin_keys().unwrap().generation, 1);

    // bob's pre-removal keyring cannot reach any generation-1 keyset
    let replayed = Keyring::collect(
        frozen_keyring.keysets().to_vec(),
        &alice.state().lockboxes,
    );
    assert_eq!(
        replayed
            .current(KeyScope::Team, TEAM_SCOPE_NAME)
            .unwrap()
            .generation,
        0
    );
    assert!(replayed.at(KeyScope::Team, TEAM_SCOPE_NAME, 1).is_err());
    assert!(replayed.at(KeyScope::Role, ADMIN_ROLE, 1).is_err());
}

#[test]
fn forged_invitation_fails_with_name_mismatch() {
    let mut alice = Team::create("t", context("alice", "laptop")).unwrap();
    let (seed, _) = alice.invite_member("bob", InviteOptions::default()).unwrap();

    // eve knows the seed but presents her own principal
    let eve = context("eve", "phone");
    let forged = ProofOfInvitation::accept_member(&seed, &eve.user, &eve.device).unwrap();
    assert!(matches!(
        alice.admit(forged),
        Err(Error::NameMismatch { .. })
    ));
    assert!(!alice.has("eve"));
}

#[test]
fn double_admission_fails_with_invitation_used() {
    let mut alice = Team::create("t", context("alice", "laptop")).unwrap();
    let (seed, _) = alice.invite_member("bob", InviteOptions::default()).unwrap();

    let bob = context("bob", "phone");
    let proof = ProofOfInvitation::accept_member(&seed, &bob.user, &bob.device).unwrap();
    alice.admit(proof.clone()).unwrap();

    assert!(matches!(
        alice.admit(proof),
        Err(Error::InvitationUsed { .. })
    ));
}

#[test]
fn revoked_invitation_cannot_admit() {
    let mut alice = Team::create("t", context("alice", "laptop")).unwrap();
    let (seed, id) = alice.invite_member("bob", InviteOptions::default()).unwrap();
    alice.revoke_invitation(&id).unwrap();

    let bob = context("bob", "phone");
    let proof = ProofOfInvitation::accept_member(&seed, &bob.user, &bob.device).unwrap();
    assert!(matches!(
        alice.admit(proof),
        Err(Error::InvitationRevoked { .. })
    ));
}

#[test]
fn concurrent_remove_versus_write() {
    let (mut alice, carol) = team_of_two("carol");
    alice.add_member_role("carol", ADMIN_ROLE).unwrap();
    let mut carol = Team::join(
        alice.graph().clone(),
        alice.team_scope_keysets(),
        carol.context().clone(),
    )
    .unwrap();

    // concurrently: alice removes carol; carol adds a role on her fork
    alice.remove("carol").unwrap();
    carol.add_role("sneaky").unwrap();

    alice.receive_graph(carol.graph()).unwrap();
    assert!(!alice.has("carol"));
    assert!(
        !alice.roles().iter().any(|r| r.role_name == "sneaky"),
        "the removed member's concurrent write is dropped"
    );

    // carol's replica reaches the same conclusion
    carol.receive_graph(alice.graph()).unwrap();
    assert_eq!(carol.state(), alice.state());
}

#[test]
fn key_reachability_is_least_privilege() {
    let (mut alice, _) = team_of_two("bob");
    alice.add_role("managers").unwrap();

    // bob holds no roles: exactly team keys plus his own
    let bob_keys = alice.member("bob").unwrap().keys.clone();
    let reachable: Vec<_> = alice
        .state()
        .lockboxes
        .iter()
        .filter(|lb| lb.recipient.public_key == bob_keys.encryption)
        .map(|lb| (lb.contents.scope, lb.contents.name.clone()))
        .collect();
    assert!(reachable.contains(&(KeyScope::Team, TEAM_SCOPE_NAME.to_string())));
    assert!(
        !reachable.iter().any(|(scope, name)| *scope == KeyScope::Role && name == ADMIN_ROLE),
        "a plain member cannot reach admin keys"
    );
    assert!(
        !reachable.iter().any(|(_, name)| name == "managers"),
        "a plain member cannot reach keys of roles they lack"
    );
}

#[test]
fn removed_member_cannot_be_removed_twice() {
    let (mut alice, _) = team_of_two("bob");
    alice.remove("bob").unwrap();
    assert!(matches!(alice.remove("bob"), Err(Error::NotFound { .. })));
}

#[test]
fn non_admin_cannot_mutate_membership() {
    let (alice, mut bob) = team_of_two("bob");
    drop(alice);
    assert!(matches!(
        bob.add_role("backdoor"),
        Err(Error::KeyNotReachable { .. }) | Err(Error::NotAdmin { .. })
    ));
    assert!(matches!(
        bob.remove("alice"),
        Err(Error::KeyNotReachable { .. }) | Err(Error::NotAdmin { .. })
    ));
}

#[test]
fn change_keys_advances_member_generation() {
    let (mut alice, _) = team_of_two("bob");
    let replacement = alice.context().user.keys.rotated().unwrap();
    alice.change_keys(replacement).unwrap();

    assert_eq!(alice.member("alice").unwrap().keys.generation, 1);
    assert_eq!(alice.context().user.keys.generation, 1);

    // generation skips are rejected
    let skipped = alice.context().user.keys.rotated().unwrap().rotated().unwrap();
    assert!(alice.change_keys(skipped).is_err());
}

#[test]
fn direct_device_management_is_admin_only() {
    let (mut alice, mut bob) = team_of_two("bob");

    // an admin may enroll and remove devices directly
    let tablet = Device::create("alice", "tablet", None).unwrap();
    alice.add_device(tablet.redact()).unwrap();
    assert_eq!(alice.member("alice").unwrap().devices.len(), 2);

    alice.remove_device(&tablet.device_id).unwrap();
    let member = alice.member("alice").unwrap();
    assert_eq!(member.devices.len(), 1);
    assert_eq!(
        member.keys.generation,
        1,
        "the member scope rotates with the removed device"
    );
    assert_eq!(alice.team_keys().unwrap().generation, 1);
    assert_eq!(alice.context().user.keys.generation, 1);

    // a plain member manages devices through invitations only
    let bob_tablet = Device::create("bob", "tablet", None).unwrap();
    assert!(matches!(
        bob.add_device(bob_tablet.redact()),
        Err(Error::NotAdmin { .. })
    ));
    assert_eq!(bob.member("bob").unwrap().devices.len(), 1);
}

#[test]
fn device_invitation_flow() {
    let (mut alice, _) = team_of_two("bob");

    // alice invites her own tablet
    let tablet = Device::create("alice", "tablet", None).unwrap();
    let (seed, _) = alice.invite_device(&tablet.device_id, None).unwrap();

    let proof = ProofOfInvitation::accept_device(&seed, &tablet).unwrap();
    alice.admit_device(proof).unwrap();

    let member = alice.member("alice").unwrap();
    assert_eq!(member.devices.len(), 2);
    assert!(member.devices.contains_key(&tablet.device_id));
}
