//! The membership resolver.
//!
//! Linearizes concurrent branches like the trivial resolver, with two
//! team-aware rules on top:
//!
//! 1. If one branch removes a member who wrote links in the other branch,
//!    the removed member's concurrent links are dropped.
//! 2. If two admins concurrently remove each other, the removal in the
//!    branch that sorts second is dropped, so exactly one removal wins and
//!    every replica agrees on which.

use std::collections::BTreeSet;

use sigil_graph::sequence::branch_sort_key;
use sigil_graph::{Resolver, SignedLink};

use crate::actions::TeamAction;

/// Resolver used for all team graphs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MembershipResolver;

type Branch = Vec<SignedLink<TeamAction>>;

fn removals(branch: &[SignedLink<TeamAction>]) -> Vec<(String, String)> {
    branch
        .iter()
        .filter_map(|link| {
            link.payload()
                .removes_member()
                .map(|target| (link.author().user_name.clone(), target.to_string()))
        })
        .collect()
}

impl Resolver<TeamAction> for MembershipResolver {
    fn resolve(&self, a: Branch, b: Branch) -> Branch {
        let (first, mut second) = if branch_sort_key(&a) <= branch_sort_key(&b) {
            (a, b)
        } else {
            (b, a)
        };

        // Rule 2: mutual concurrent removals. The winning branch is the
        // one that sorts first; the loser's removal never happened.
        let first_removals = removals(&first);
        let mutual_losers: BTreeSet<(String, String)> = removals(&second)
            .into_iter()
            .filter(|(remover, target)| {
                first_removals
                    .iter()
                    .any(|(fr, ft)| fr == target && ft == remover)
            })
            .collect();
        if !mutual_losers.is_empty() {
            tracing::debug!(
                count = mutual_losers.len(),
                "dropping losing side of mutual concurrent removal"
            );
            second.retain(|link| {
                let author = link.author().user_name.clone();
                match link.payload().removes_member() {
                    Some(target) => !mutual_losers.contains(&(author, target.to_string())),
                    None => true,
                }
            });
        }

        // Rule 1: a member removed in one branch loses their concurrent
        // writes in the other.
        let removed_in_first: BTreeSet<&str> = first_removals
            .iter()
            .map(|(_, target)| target.as_str())
            .collect();
        second.retain(|link| !removed_in_first.contains(link.author().user_name.as_str()));

        let removed_in_second: BTreeSet<String> = removals(&second)
            .into_iter()
            .map(|(_, target)| target)
            .collect();
        let mut merged: Branch = first
            .into_iter()
            .filter(|link| !removed_in_second.contains(&link.author().user_name))
            .collect();

        merged.extend(second);
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::{device_id, SigningKeypair};
    use sigil_graph::{LinkBody, LinkContext};
    use sigil_invitation::InvitationId;

    fn link(author_name: &str, action: TeamAction) -> SignedLink<TeamAction> {
        let keys = SigningKeypair::generate();
        let body = LinkBody::Node {
            prev: sigil_core::hash("link", b"prev"),
            payload: action,
            timestamp: 0,
            author: LinkContext {
                user_name: author_name.into(),
                device_id: device_id(author_name, "laptop"),
                public_key: keys.public,
            },
        };
        SignedLink::sign(body, &keys.secret).unwrap()
    }

    fn remove(author: &str, target: &str) -> SignedLink<TeamAction> {
        link(
            author,
            TeamAction::RemoveMember {
                user_name: target.into(),
                lockboxes: vec![],
                rotated_keys: vec![],
            },
        )
    }

    fn write(author: &str) -> SignedLink<TeamAction> {
        link(
            author,
            TeamAction::RevokeInvitation {
                id: InvitationId(format!("inv-by-{author}")),
            },
        )
    }

    fn authors(branch: &[SignedLink<TeamAction>]) -> Vec<String> {
        branch
            .iter()
            .map(|l| l.author().user_name.clone())
            .collect()
    }

    #[test]
    fn concurrent_writes_by_removed_member_are_dropped() {
        let removal_branch = vec![remove("alice", "carol")];
        let write_branch = vec![write("carol"), write("bob")];

        let merged = MembershipResolver.resolve(removal_branch.clone(), write_branch.clone());
        assert!(!authors(&merged).iter().any(|a| a == "carol"));
        assert!(authors(&merged).iter().any(|a| a == "bob"));

        // symmetric in argument order
        let merged_flipped = MembershipResolver.resolve(write_branch, removal_branch);
        assert_eq!(merged, merged_flipped);
    }

    #[test]
    fn mutual_removal_keeps_exactly_one() {
        let a = vec![remove("alice", "bob")];
        let b = vec![remove("bob", "alice")];

        let merged_ab = MembershipResolver.resolve(a.clone(), b.clone());
        let merged_ba = MembershipResolver.resolve(b, a);
        assert_eq!(merged_ab, merged_ba, "resolution is order independent");

        let survivors: Vec<_> = merged_ab
            .iter()
            .filter_map(|l| l.payload().removes_member())
            .collect();
        assert_eq!(survivors.len(), 1, "exactly one removal survives");
    }

    #[test]
    fn unrelated_branches_pass_through() {
        let a = vec![write("alice")];
        let b = vec![write("bob")];
        let merged = MembershipResolver.resolve(a.clone(), b.clone());
        assert_eq!(merged.len(), 2);
    }
}
