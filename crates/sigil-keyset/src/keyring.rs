//! Keyrings: the transitive closure of keysets a principal can open.

use serde::{Deserialize, Serialize};
use sigil_core::{Error, Result};

use crate::keyset::Keyset;
use crate::lockbox::Lockbox;
use crate::scope::{KeyMetadata, KeyScope};

/// Every keyset (with secrets) reachable from a principal's own keys.
///
/// Computed by fixpoint iteration over the lockboxes in team state: any
/// lockbox whose recipient we hold yields its contents, which may in turn
/// unlock further lockboxes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyring {
    keysets: Vec<Keyset>,
}

impl Keyring {
    /// An empty keyring.
    pub fn new() -> Self {
        Self::default()
    }

    /// A keyring seeded with a principal's own keysets.
    pub fn from_keysets(keysets: impl IntoIterator<Item = Keyset>) -> Self {
        let mut ring = Self::new();
        for keyset in keysets {
            ring.add(keyset);
        }
        ring
    }

    /// Add a keyset, replacing any existing entry with the same identity.
    pub fn add(&mut self, keyset: Keyset) {
        let metadata = keyset.metadata();
        self.keysets.retain(|k| k.metadata() != metadata);
        self.keysets.push(keyset);
    }

    /// All keysets held, in insertion order.
    pub fn keysets(&self) -> &[Keyset] {
        &self.keysets
    }

    /// Whether a keyset with this exact identity is held.
    pub fn contains(&self, metadata: &KeyMetadata) -> bool {
        self.keysets.iter().any(|k| k.metadata() == *metadata)
    }

    /// The highest-generation keyset for `(scope, name)`.
    pub fn current(&self, scope: KeyScope, name: &str) -> Result<&Keyset> {
        self.keysets
            .iter()
            .filter(|k| k.scope == scope && k.name == name)
            .max_by_key(|k| k.generation)
            .ok_or_else(|| Error::key_not_reachable(format!("{scope:?}/{name}")))
    }

    /// The keyset for `(scope, name)` at an exact generation.
    pub fn at(&self, scope: KeyScope, name: &str, generation: u32) -> Result<&Keyset> {
        self.keysets
            .iter()
            .find(|k| k.scope == scope && k.name == name && k.generation == generation)
            .ok_or_else(|| {
                Error::key_not_reachable(format!("{scope:?}/{name} generation {generation}"))
            })
    }

    /// Absorb every lockbox this keyring can open, to fixpoint.
    ///
    /// Returns how many new keysets were added.
    pub fn absorb(&mut self, lockboxes: &[Lockbox]) -> usize {
        let mut added = 0;
        loop {
            let mut progressed = false;
            for lockbox in lockboxes {
                if self.contains(&lockbox.contents.metadata()) {
                    continue;
                }
                let Some(recipient) = self
                    .keysets
                    .iter()
                    .find(|k| k.manifest() == lockbox.recipient)
                else {
                    continue;
                };
                let recipient_secret = recipient.encryption.secret.clone();
                if let Ok(contents) = lockbox.open(&recipient_secret) {
                    self.add(contents);
                    added += 1;
                    progressed = true;
                }
            }
            if !progressed {
                return added;
            }
        }
    }

    /// Build the full keyring for a principal from its own keysets and the
    /// lockboxes visible in team state.
    pub fn collect(own: impl IntoIterator<Item = Keyset>, lockboxes: &[Lockbox]) -> Self {
        let mut ring = Self::from_keysets(own);
        ring.absorb(lockboxes);
        ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyset::Keyset;
    use crate::scope::KeyMetadata;

    const TEAM: &str = crate::scope::TEAM_SCOPE_NAME;

    #[test]
    fn transitive_resolution() {
        // device -> member -> team
        let device = Keyset::create(KeyMetadata::new(KeyScope::Device, "d1"), None).unwrap();
        let member = Keyset::create(KeyMetadata::member("alice"), None).unwrap();
        let team = Keyset::create(KeyMetadata::team(), None).unwrap();

        let lockboxes = vec![
            Lockbox::create(&member, &device.redact()).unwrap(),
            Lockbox::create(&team, &member.redact()).unwrap(),
        ];

        let ring = Keyring::collect([device], &lockboxes);
        assert!(ring.current(KeyScope::Member, "alice").is_ok());
        assert!(ring.current(KeyScope::Team, TEAM).is_ok());
    }

    #[test]
    fn unreachable_scope_errors() {
        let device = Keyset::create(KeyMetadata::new(KeyScope::Device, "d1"), None).unwrap();
        let ring = Keyring::collect([device], &[]);
        let err = ring.current(KeyScope::Team, TEAM).unwrap_err();
        assert!(matches!(err, Error::KeyNotReachable { .. }));
    }

    #[test]
    fn current_prefers_latest_generation() {
        let team0 = Keyset::create(KeyMetadata::team(), None).unwrap();
        let team1 = team0.rotated().unwrap();
        let ring = Keyring::from_keysets([team0, team1]);
        assert_eq!(ring.current(KeyScope::Team, TEAM).unwrap().generation, 1);
        assert_eq!(ring.at(KeyScope::Team, TEAM, 0).unwrap().generation, 0);
    }

    #[test]
    fn add_replaces_same_identity() {
        let a = Keyset::create(KeyMetadata::team(), Some(b"one")).unwrap();
        let b = Keyset::create(KeyMetadata::team(), Some(b"two")).unwrap();
        let mut ring = Keyring::new();
        ring.add(a);
        ring.add(b.clone());
        assert_eq!(ring.keysets().len(), 1);
        assert_eq!(ring.current(KeyScope::Team, TEAM).unwrap(), &b);
    }
}
