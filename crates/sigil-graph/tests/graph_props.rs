//! Property tests for graph sequencing and merge semantics.

#![allow(clippy::unwrap_used, missing_docs)]

use proptest::prelude::*;
use sigil_graph::{LinkContext, SignatureGraph, SignedLink, TrivialResolver};

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

fn forked(
    keys: &SigningKeypair,
    base_len: usize,
    left: &[String],
    right: &[String],
) -> (SignatureGraph<String>, SignatureGraph<String>) {
    let mut base =
        SignatureGraph::create("root".to_string(), 0, author(keys), &keys.secret).unwrap();
    for i in 0..base_len {
        base.append(format!("base-{i}"), i as u64, author(keys), &keys.secret)
            .unwrap();
    }
    let mut a = base.clone();
    let mut b = base;
    for (i, p) in left.iter().enumerate() {
        a.append(format!("L-{i}-{p}"), 100 + i as u64, author(keys), &keys.secret)
            .unwrap();
    }
    for (i, p) in right.iter().enumerate() {
        b.append(format!("R-{i}-{p}"), 200 + i as u64, author(keys), &keys.secret)
            .unwrap();
    }
    (a, b)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn merge_order_does_not_change_the_sequence(
        base_len in 0usize..3,
        left in proptest::collection::vec("[a-z]{1,6}", 0..4),
        right in proptest::collection::vec("[a-z]{1,6}", 0..4),
    ) {
        let keys = SigningKeypair::generate();
        let (a, b) = forked(&keys, base_len, &left, &right);

        let mut ab = a.clone();
        ab.merge(&b).unwrap();
        let mut ba = b.clone();
        ba.merge(&a).unwrap();

        prop_assert_eq!(ab.head(), ba.head());
        let seq_ab = payloads(&ab.sequence(&TrivialResolver).unwrap());
        let seq_ba = payloads(&ba.sequence(&TrivialResolver).unwrap());
        prop_assert_eq!(&seq_ab, &seq_ba);

        // every non-merge link appears exactly once
        prop_assert_eq!(seq_ab.len(), 1 + base_len + left.len() + right.len());
        let mut sorted = seq_ab.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), seq_ab.len());
    }

    #[test]
    fn sequencing_is_stable_across_replicas(
        left in proptest::collection::vec("[a-z]{1,6}", 1..4),
        right in proptest::collection::vec("[a-z]{1,6}", 1..4),
        tail in proptest::collection::vec("[a-z]{1,6}", 0..3),
    ) {
        let keys = SigningKeypair::generate();
        let (a, b) = forked(&keys, 1, &left, &right);

        // replica one: merge then extend; replica two: receive everything at once
        let mut one = a.clone();
        one.merge(&b).unwrap();
        for (i, p) in tail.iter().enumerate() {
            one.append(format!("T-{i}-{p}"), 300 + i as u64, author(&keys), &keys.secret)
                .unwrap();
        }
        let mut two = b.clone();
        two.merge(&one).unwrap();

        prop_assert_eq!(one.head(), two.head());
        prop_assert_eq!(
            payloads(&one.sequence(&TrivialResolver).unwrap()),
            payloads(&two.sequence(&TrivialResolver).unwrap())
        );
        one.validate().unwrap();
        two.validate().unwrap();
    }

    #[test]
    fn serialization_round_trips(
        left in proptest::collection::vec("[a-z]{1,6}", 0..3),
        right in proptest::collection::vec("[a-z]{1,6}", 0..3),
    ) {
        let keys = SigningKeypair::generate();
        let (a, b) = forked(&keys, 1, &left, &right);
        let mut merged = a.clone();
        merged.merge(&b).unwrap();

        let json = serde_json::to_string(&merged).unwrap();
        let back: SignatureGraph<String> = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(&back, &merged);
        prop_assert_eq!(
            payloads(&back.sequence(&TrivialResolver).unwrap()),
            payloads(&merged.sequence(&TrivialResolver).unwrap())
        );
    }
}
