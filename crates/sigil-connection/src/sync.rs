//! Pure sync decision helpers.

use std::collections::{BTreeMap, BTreeSet};

use sigil_core::Hash;
use sigil_graph::{Link, SignatureGraph};
use sigil_team::TeamAction;

/// Links we hold that the peer's known-hash set lacks.
pub fn links_to_send(
    graph: &SignatureGraph<TeamAction>,
    peer_known: &BTreeSet<Hash>,
) -> BTreeMap<Hash, Link<TeamAction>> {
    graph
        .links()
        .filter(|(hash, _)| !peer_known.contains(hash))
        .map(|(hash, link)| (*hash, link.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_keyset::{Device, MemberContext, User};
    use sigil_team::Team;

    fn team() -> Team {
        let context = MemberContext {
            user: User::create("alice", None).unwrap(),
            device: Device::create("alice", "laptop", None).unwrap(),
        };
        Team::create("t", context).unwrap()
    }

    #[test]
    fn peer_with_everything_needs_nothing() {
        let team = team();
        let known = team.graph().known_hashes();
        assert!(links_to_send(team.graph(), &known).is_empty());
    }

    #[test]
    fn empty_peer_needs_everything() {
        let team = team();
        let missing = links_to_send(team.graph(), &BTreeSet::new());
        assert_eq!(missing.len(), team.graph().len());
    }
}
