//! The signature graph: storage, append, merge, and queries.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use sigil_core::{Error, Hash, Result, SignatureSecretKey};

use crate::link::{Action, Link, LinkBody, LinkContext, MergeLink, SignedLink};

/// An append-only DAG of links, content-addressed and hash-linked.
///
/// There is exactly one root and, per local view, exactly one head. Every
/// link except the root is reachable by walking back from the head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureGraph<A> {
    root: Hash,
    head: Hash,
    links: BTreeMap<Hash, Link<A>>,
}

impl<A: Action> SignatureGraph<A> {
    /// Mint a new graph from a root payload signed by the founder's device.
    pub fn create(
        payload: A,
        timestamp: u64,
        author: LinkContext,
        secret: &SignatureSecretKey,
    ) -> Result<Self> {
        let link = SignedLink::sign(
            LinkBody::Root {
                payload,
                timestamp,
                author,
            },
            secret,
        )?;
        let hash = link.hash()?;
        let mut links = BTreeMap::new();
        links.insert(hash, Link::Signed(link));
        Ok(Self {
            root: hash,
            head: hash,
            links,
        })
    }

    /// Append a signed link at the current head. Returns the new head.
    pub fn append(
        &mut self,
        payload: A,
        timestamp: u64,
        author: LinkContext,
        secret: &SignatureSecretKey,
    ) -> Result<Hash> {
        let link = SignedLink::sign(
            LinkBody::Node {
                prev: self.head,
                payload,
                timestamp,
                author,
            },
            secret,
        )?;
        let hash = link.hash()?;
        self.links.insert(hash, Link::Signed(link));
        self.head = hash;
        Ok(hash)
    }

    /// Merge another replica of the same graph into this one.
    ///
    /// Unions the link sets. If one head already subsumes the other this
    /// fast-forwards; otherwise an unsigned merge link joins the two heads
    /// and becomes the new head. Returns the resulting head.
    pub fn merge(&mut self, other: &SignatureGraph<A>) -> Result<Hash> {
        if self.root != other.root {
            return Err(Error::graph_corrupt(
                "cannot merge graphs with different roots",
            ));
        }
        for (hash, link) in &other.links {
            self.links.entry(*hash).or_insert_with(|| link.clone());
        }
        self.merge_head(other.head)
    }

    /// Absorb loose links received from a peer and merge its head.
    ///
    /// Each link is checked against its claimed content address; the
    /// remote head must resolve once the links are in.
    pub fn ingest(
        &mut self,
        links: impl IntoIterator<Item = (Hash, Link<A>)>,
        remote_head: Hash,
    ) -> Result<Hash> {
        for (hash, link) in links {
            if link.hash()? != hash {
                return Err(Error::graph_corrupt(format!(
                    "received link does not match its content address {hash}"
                )));
            }
            self.links.entry(hash).or_insert(link);
        }
        if !self.links.contains_key(&remote_head) {
            return Err(Error::graph_corrupt(format!(
                "remote head {remote_head} is not among the received links"
            )));
        }
        self.merge_head(remote_head)
    }

    fn merge_head(&mut self, theirs: Hash) -> Result<Hash> {
        let ours = self.head;
        if ours == theirs || self.precedes_or_equal(theirs, ours) {
            return Ok(self.head);
        }
        if self.precedes_or_equal(ours, theirs) {
            self.head = theirs;
            return Ok(self.head);
        }

        let merge = MergeLink::new(ours, theirs);
        let hash = merge.hash()?;
        self.links.insert(hash, Link::Merge(merge));
        self.head = hash;
        tracing::debug!(head = %hash, "merged concurrent heads");
        Ok(hash)
    }

    /// Hash of the root link.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Hash of the current head.
    pub fn head(&self) -> Hash {
        self.head
    }

    /// Number of links, merge links included.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether the graph holds no links (never true for a created graph).
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Look up a link by hash.
    pub fn get(&self, hash: &Hash) -> Option<&Link<A>> {
        self.links.get(hash)
    }

    /// Whether a link with this hash is present.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.links.contains_key(hash)
    }

    /// All link hashes known to this replica.
    pub fn known_hashes(&self) -> BTreeSet<Hash> {
        self.links.keys().copied().collect()
    }

    /// Iterate over all links with their hashes.
    pub fn links(&self) -> impl Iterator<Item = (&Hash, &Link<A>)> {
        self.links.iter()
    }

    /// Look up a signed link, failing on merge links and absences.
    pub fn signed(&self, hash: &Hash) -> Result<&SignedLink<A>> {
        match self.links.get(hash) {
            Some(Link::Signed(link)) => Ok(link),
            Some(Link::Merge(_)) => Err(Error::graph_corrupt(format!(
                "expected signed link at {hash}, found merge link"
            ))),
            None => Err(Error::graph_corrupt(format!("missing link {hash}"))),
        }
    }

    fn require(&self, hash: &Hash) -> Result<&Link<A>> {
        self.links
            .get(hash)
            .ok_or_else(|| Error::graph_corrupt(format!("missing link {hash}")))
    }

    /// Direct predecessors of a link: `prev` for a node, both branches for
    /// a merge, nothing for the root.
    pub fn predecessors(&self, hash: &Hash) -> Result<Vec<Hash>> {
        Ok(self.require(hash)?.predecessors())
    }

    /// Direct successors of a link.
    pub fn successors(&self, hash: &Hash) -> Vec<Hash> {
        self.links
            .iter()
            .filter(|(_, link)| link.predecessors().contains(hash))
            .map(|(h, _)| *h)
            .collect()
    }

    /// Every link reachable from `hash`, the link itself included.
    pub fn ancestors(&self, hash: &Hash) -> Result<BTreeSet<Hash>> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([*hash]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            for pred in self.require(&current)?.predecessors() {
                queue.push_back(pred);
            }
        }
        Ok(seen)
    }

    /// Whether `a` strictly precedes `b`.
    pub fn is_predecessor(&self, a: &Hash, b: &Hash) -> bool {
        *a != *b && self.precedes_or_equal(*a, *b)
    }

    pub(crate) fn precedes_or_equal(&self, a: Hash, b: Hash) -> bool {
        self.ancestors(&b)
            .map(|set| set.contains(&a))
            .unwrap_or(false)
    }

    /// Nearest common predecessor of two links.
    ///
    /// Breadth-first from `b`, so among common ancestors the one closest
    /// to `b` wins; with a shared root one always exists.
    pub fn common_predecessor(&self, a: &Hash, b: &Hash) -> Result<Hash> {
        let ancestors_of_a = self.ancestors(a)?;
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([*b]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            if ancestors_of_a.contains(&current) {
                return Ok(current);
            }
            for pred in self.require(&current)?.predecessors() {
                queue.push_back(pred);
            }
        }
        Err(Error::graph_corrupt(format!(
            "no common predecessor of {a} and {b}"
        )))
    }

    /// Structural and cryptographic validation of the whole graph.
    ///
    /// Checks every link's content address and signature, `prev`
    /// resolution, single-rootedness, and reachability of every link from
    /// the head. Reducer-level key checks (is this really the author's
    /// device key?) happen during the fold, not here.
    pub fn validate(&self) -> Result<()> {
        if !self.links.contains_key(&self.head) {
            return Err(Error::graph_corrupt("head is not present in the graph"));
        }
        match self.links.get(&self.root) {
            Some(Link::Signed(link)) if matches!(link.body, LinkBody::Root { .. }) => {}
            _ => return Err(Error::graph_corrupt("root hash does not name a root link")),
        }

        for (hash, link) in &self.links {
            if link.hash()? != *hash {
                return Err(Error::graph_corrupt(format!(
                    "link {hash} does not match its content address"
                )));
            }
            match link {
                Link::Signed(signed) => {
                    signed.verify_signature()?;
                    match &signed.body {
                        LinkBody::Root { .. } => {
                            if *hash != self.root {
                                return Err(Error::graph_corrupt("multiple root links"));
                            }
                        }
                        LinkBody::Node { prev, .. } => {
                            if !self.links.contains_key(prev) {
                                return Err(Error::graph_corrupt(format!(
                                    "link {hash} references missing predecessor {prev}"
                                )));
                            }
                        }
                    }
                }
                Link::Merge(merge) => {
                    for branch in merge.body {
                        if !self.links.contains_key(&branch) {
                            return Err(Error::graph_corrupt(format!(
                                "merge link {hash} references missing branch {branch}"
                            )));
                        }
                    }
                }
            }
        }

        let reachable = self.ancestors(&self.head)?;
        if reachable.len() != self.links.len() {
            return Err(Error::graph_corrupt(
                "graph contains links unreachable from the head",
            ));
        }
        Ok(())
    }
}
