//! Scope rotation after removal of a principal.
//!
//! When a principal is removed, every scope transitively visible to it
//! through the lockbox graph is compromised: the principal may have
//! retained those secrets. Rotation computes that closure, mints
//! replacement keysets at the next generation, and reseals them to every
//! remaining holder.

use std::collections::{BTreeMap, BTreeSet};

use sigil_core::{Error, Result};
use sigil_keyset::{KeyMetadata, KeyScope, Keyring, Keyset, Lockbox, PublicKeyset};

use crate::state::TeamState;

/// A `(scope, name)` pair, generation left implicit.
pub type ScopeName = (KeyScope, String);

/// The scopes reachable from `seeds` through the lockbox graph restricted
/// to current generations, seeds included.
///
/// An edge runs from a lockbox's recipient to its contents: holding the
/// recipient keys yields the contents keys.
pub fn scopes_to_rotate(state: &TeamState, seeds: &[ScopeName]) -> BTreeSet<ScopeName> {
    let mut reachable: BTreeSet<ScopeName> = seeds.iter().cloned().collect();
    loop {
        let mut progressed = false;
        for lockbox in &state.lockboxes {
            let recipient = (lockbox.recipient.scope, lockbox.recipient.name.clone());
            if !reachable.contains(&recipient) {
                continue;
            }
            if lockbox.contents.generation
                != state.current_generation(lockbox.contents.scope, &lockbox.contents.name)
            {
                continue;
            }
            let contents = (lockbox.contents.scope, lockbox.contents.name.clone());
            if reachable.insert(contents) {
                progressed = true;
            }
        }
        if !progressed {
            return reachable;
        }
    }
}

/// Replacement keys and lockboxes for one rotation.
#[derive(Debug, Clone)]
pub struct RotationPlan {
    /// Freshly minted keysets, one per reissued scope.
    pub new_keysets: Vec<Keyset>,
    /// New keys sealed to every remaining holder.
    pub lockboxes: Vec<Lockbox>,
    /// Public halves of the new keysets, for the action payload.
    pub rotated_keys: Vec<PublicKeyset>,
}

/// Plan the rotation triggered by removing a principal.
///
/// `seeds` are the compromised scopes; `defunct` the subset belonging to
/// the departed principal (not reissued, and never a recipient again);
/// `excluded_recipients` additionally lose access without leaving (a
/// member stripped of a role).
pub fn plan_rotation(
    state: &TeamState,
    keyring: &Keyring,
    seeds: &[ScopeName],
    defunct: &[ScopeName],
    excluded_recipients: &[ScopeName],
) -> Result<RotationPlan> {
    let closure = scopes_to_rotate(state, seeds);
    let reissue: Vec<&ScopeName> = closure.iter().filter(|s| !defunct.contains(*s)).collect();

    let mut new_keysets: BTreeMap<ScopeName, Keyset> = BTreeMap::new();
    for scope in &reissue {
        // only a holder of the scope may reissue it
        keyring.current(scope.0, &scope.1)?;
        let generation = state.current_generation(scope.0, &scope.1);
        let replacement = Keyset::create(
            KeyMetadata::new(scope.0, scope.1.clone()).with_generation(generation + 1),
            None,
        )?;
        new_keysets.insert((*scope).clone(), replacement);
    }

    let mut lockboxes = Vec::new();
    for scope in &reissue {
        let generation = state.current_generation(scope.0, &scope.1);
        let replacement = &new_keysets[*scope];
        let mut resealed: BTreeSet<ScopeName> = BTreeSet::new();
        for old in state.lockboxes_for(scope.0, &scope.1, generation) {
            let recipient = (old.recipient.scope, old.recipient.name.clone());
            if defunct.contains(&recipient) || excluded_recipients.contains(&recipient) {
                continue;
            }
            if !resealed.insert(recipient.clone()) {
                continue;
            }
            let lockbox = match new_keysets.get(&recipient) {
                // the holder itself rotated: seal to its replacement keys
                Some(new_recipient) => {
                    Lockbox::create(replacement, &new_recipient.redact())?
                }
                None => Lockbox::create_for_manifest(replacement, &old.recipient)?,
            };
            lockboxes.push(lockbox);
        }
    }

    tracing::debug!(
        scopes = reissue.len(),
        lockboxes = lockboxes.len(),
        "planned key rotation"
    );
    let rotated_keys = new_keysets.values().map(Keyset::redact).collect();
    Ok(RotationPlan {
        new_keysets: new_keysets.into_values().collect(),
        lockboxes,
        rotated_keys,
    })
}

/// Validator-side check that an action carries the rotation it must.
///
/// For every scope in the closure that keeps at least one holder, the
/// action's lockboxes must contain that scope's keys at the next
/// generation.
pub fn check_rotation(
    state: &TeamState,
    seeds: &[ScopeName],
    defunct: &[ScopeName],
    excluded_recipients: &[ScopeName],
    lockboxes: &[Lockbox],
) -> Result<()> {
    let closure = scopes_to_rotate(state, seeds);
    for scope in closure.iter().filter(|s| !defunct.contains(*s)) {
        let generation = state.current_generation(scope.0, &scope.1);
        let has_remaining_holder = state
            .lockboxes_for(scope.0, &scope.1, generation)
            .iter()
            .any(|lb| {
                let recipient = (lb.recipient.scope, lb.recipient.name.clone());
                !defunct.contains(&recipient) && !excluded_recipients.contains(&recipient)
            });
        if !has_remaining_holder {
            continue;
        }
        let rotated = lockboxes.iter().any(|lb| {
            lb.contents.scope == scope.0
                && lb.contents.name == scope.1
                && lb.contents.generation == generation + 1
        });
        if !rotated {
            return Err(Error::invalid(format!(
                "removal must rotate {:?}/{} to generation {}",
                scope.0,
                scope.1,
                generation + 1
            )));
        }
    }
    Ok(())
}
