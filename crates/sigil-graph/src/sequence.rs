//! Deterministic topological sequencing.
//!
//! `sequence` flattens the DAG into an ordered list of signed links. At
//! each merge link the two concurrent branches are sequenced independently
//! back to their nearest common predecessor and handed to a resolver; the
//! resolver decides their relative order (and may drop links). Because the
//! resolver is pure and the branch pair is derived from content hashes,
//! every replica linearizes the same graph identically, bit for bit.

use serde::Serialize;
use sigil_core::hash::domain;
use sigil_core::{canonical, Hash, Result};

use crate::graph::SignatureGraph;
use crate::link::{Action, Link, SignedLink};

/// Merges two concurrently-written branch sequences into one.
///
/// Implementations must be pure and deterministic on their inputs; they
/// may interleave, reorder, or drop links, but must never invent them.
pub trait Resolver<A> {
    /// Combine two branch sequences into their linearized order.
    fn resolve(&self, a: Vec<SignedLink<A>>, b: Vec<SignedLink<A>>) -> Vec<SignedLink<A>>;
}

/// Sort key for ordering concurrent branches.
///
/// Derived from the first link's payload under a dedicated domain tag, so
/// the ordering is stable across replicas but unpredictable to authors.
/// An empty branch sorts first.
pub fn branch_sort_key<A: Serialize>(branch: &[SignedLink<A>]) -> Hash {
    branch
        .first()
        .and_then(|link| canonical::hash_canonical(domain::DETERMINISTIC_SORT, link.payload()).ok())
        .unwrap_or(Hash([0u8; 32]))
}

/// Default resolver: order the two branches by their sort key and
/// concatenate, dropping nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrivialResolver;

impl<A: Action> Resolver<A> for TrivialResolver {
    fn resolve(&self, a: Vec<SignedLink<A>>, b: Vec<SignedLink<A>>) -> Vec<SignedLink<A>> {
        let (mut first, second) = if branch_sort_key(&a) <= branch_sort_key(&b) {
            (a, b)
        } else {
            (b, a)
        };
        first.extend(second);
        first
    }
}

impl<A: Action> SignatureGraph<A> {
    /// Linearize the whole graph from root to head.
    ///
    /// Merge links are dropped from the output.
    pub fn sequence(&self, resolver: &dyn Resolver<A>) -> Result<Vec<SignedLink<A>>> {
        self.sequence_between(resolver, None, self.head())
    }

    /// Linearize the subrange after `from` (exclusive) up to `to`
    /// (inclusive). `from = None` starts at the root.
    pub fn sequence_between(
        &self,
        resolver: &dyn Resolver<A>,
        from: Option<Hash>,
        to: Hash,
    ) -> Result<Vec<SignedLink<A>>> {
        self.walk(resolver, from.as_ref(), to)
    }

    fn walk(
        &self,
        resolver: &dyn Resolver<A>,
        stop: Option<&Hash>,
        at: Hash,
    ) -> Result<Vec<SignedLink<A>>> {
        if stop == Some(&at) {
            return Ok(Vec::new());
        }
        match self.get(&at).ok_or_else(|| {
            sigil_core::Error::graph_corrupt(format!("missing link {at} during sequencing"))
        })? {
            Link::Signed(link) => {
                let mut out = match link.body.prev() {
                    Some(prev) => self.walk(resolver, stop, prev)?,
                    None => Vec::new(),
                };
                out.push(link.clone());
                Ok(out)
            }
            Link::Merge(merge) => {
                let [x, y] = merge.body;
                let pivot = self.common_predecessor(&x, &y)?;

                // When the requested window starts inside one of the two
                // branches, only that branch is part of the answer.
                if let Some(stop_hash) = stop {
                    if *stop_hash != pivot && self.precedes_or_equal(pivot, *stop_hash) {
                        let branch = if self.precedes_or_equal(*stop_hash, x) {
                            x
                        } else {
                            y
                        };
                        return self.walk(resolver, stop, branch);
                    }
                }

                let branch_a = self.walk(resolver, Some(&pivot), x)?;
                let branch_b = self.walk(resolver, Some(&pivot), y)?;
                let mut out = self.walk(resolver, stop, pivot)?;
                out.extend(resolver.resolve(branch_a, branch_b));
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkContext;
    use sigil_core::{device_id, SigningKeypair};

    fn author(keys: &SigningKeypair) -> LinkContext {
        LinkContext {
            user_name: "alice".into(),
            device_id: device_id("alice", "laptop"),
            public_key: keys.public,
        }
    }

    fn payloads(links: &[SignedLink<String>]) -> Vec<String> {
        links.iter().map(|l| l.payload().clone()).collect()
    }

    #[test]
    fn linear_graph_sequences_in_order() {
        let keys = SigningKeypair::generate();
        let mut graph =
            SignatureGraph::create("root".to_string(), 0, author(&keys), &keys.secret).unwrap();
        for (i, p) in ["one", "two", "three"].iter().enumerate() {
            graph
                .append(p.to_string(), i as u64 + 1, author(&keys), &keys.secret)
                .unwrap();
        }
        let seq = graph.sequence(&TrivialResolver).unwrap();
        assert_eq!(payloads(&seq), ["root", "one", "two", "three"]);
    }

    #[test]
    fn merged_graph_sequences_identically_from_both_sides() {
        let keys = SigningKeypair::generate();
        let base =
            SignatureGraph::create("root".to_string(), 0, author(&keys), &keys.secret).unwrap();
        let mut left = base.clone();
        let mut right = base.clone();
        left.append("l1".into(), 1, author(&keys), &keys.secret)
            .unwrap();
        left.append("l2".into(), 2, author(&keys), &keys.secret)
            .unwrap();
        right
            .append("r1".into(), 1, author(&keys), &keys.secret)
            .unwrap();

        let mut ab = left.clone();
        ab.merge(&right).unwrap();
        let mut ba = right.clone();
        ba.merge(&left).unwrap();

        let seq_ab = payloads(&ab.sequence(&TrivialResolver).unwrap());
        let seq_ba = payloads(&ba.sequence(&TrivialResolver).unwrap());
        assert_eq!(seq_ab, seq_ba);
        assert_eq!(seq_ab.len(), 4, "merge links are dropped");
        assert_eq!(seq_ab[0], "root");
    }

    #[test]
    fn branches_stay_contiguous() {
        let keys = SigningKeypair::generate();
        let base =
            SignatureGraph::create("root".to_string(), 0, author(&keys), &keys.secret).unwrap();
        let mut left = base.clone();
        let mut right = base.clone();
        left.append("l1".into(), 1, author(&keys), &keys.secret)
            .unwrap();
        left.append("l2".into(), 2, author(&keys), &keys.secret)
            .unwrap();
        right
            .append("r1".into(), 1, author(&keys), &keys.secret)
            .unwrap();
        right
            .append("r2".into(), 2, author(&keys), &keys.secret)
            .unwrap();

        let mut merged = left.clone();
        merged.merge(&right).unwrap();
        let seq = payloads(&merged.sequence(&TrivialResolver).unwrap());
        let l1 = seq.iter().position(|p| p == "l1").unwrap();
        let l2 = seq.iter().position(|p| p == "l2").unwrap();
        let r1 = seq.iter().position(|p| p == "r1").unwrap();
        let r2 = seq.iter().position(|p| p == "r2").unwrap();
        assert_eq!(l2, l1 + 1, "left branch is not interleaved");
        assert_eq!(r2, r1 + 1, "right branch is not interleaved");
    }

    #[test]
    fn subrange_sequencing_skips_earlier_links() {
        let keys = SigningKeypair::generate();
        let mut graph =
            SignatureGraph::create("root".to_string(), 0, author(&keys), &keys.secret).unwrap();
        let h1 = graph
            .append("one".into(), 1, author(&keys), &keys.secret)
            .unwrap();
        graph
            .append("two".into(), 2, author(&keys), &keys.secret)
            .unwrap();
        let h3 = graph
            .append("three".into(), 3, author(&keys), &keys.secret)
            .unwrap();

        let seq = graph
            .sequence_between(&TrivialResolver, Some(h1), h3)
            .unwrap();
        assert_eq!(payloads(&seq), ["two", "three"]);
    }

    #[test]
    fn subrange_starting_inside_a_branch() {
        let keys = SigningKeypair::generate();
        let base =
            SignatureGraph::create("root".to_string(), 0, author(&keys), &keys.secret).unwrap();
        let mut left = base.clone();
        let mut right = base.clone();
        let l1 = left
            .append("l1".into(), 1, author(&keys), &keys.secret)
            .unwrap();
        left.append("l2".into(), 2, author(&keys), &keys.secret)
            .unwrap();
        right
            .append("r1".into(), 1, author(&keys), &keys.secret)
            .unwrap();

        let mut merged = left.clone();
        merged.merge(&right).unwrap();
        merged
            .append("after".into(), 3, author(&keys), &keys.secret)
            .unwrap();

        // a window opening at l1 lies on the left branch: the right
        // branch's history is not part of the answer
        let seq = merged
            .sequence_between(&TrivialResolver, Some(l1), merged.head())
            .unwrap();
        assert_eq!(payloads(&seq), ["l2", "after"]);
    }
}
