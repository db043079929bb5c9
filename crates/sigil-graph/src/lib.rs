//! # Sigil Graph
//!
//! The tamper-evident signature graph: an append-only DAG of signed links,
//! content-addressed by the hash of their canonical form. Concurrent
//! writes fork the graph; merging unions links and joins the two heads
//! under an unsigned merge link. A deterministic topological sequencing
//! under an application-supplied resolver turns any replica of the graph
//! into the same linear history, which is what lets every peer reduce to
//! identical state.
//!
//! The graph is generic over its payload type; the team crate instantiates
//! it with `TeamAction`.

#![forbid(unsafe_code)]

pub mod graph;
pub mod link;
pub mod sequence;

pub use graph::SignatureGraph;
pub use link::{Link, LinkBody, LinkContext, MergeLink, SignedLink};
pub use sequence::{Resolver, TrivialResolver};
