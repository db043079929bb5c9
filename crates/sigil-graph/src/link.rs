//! Links: the entries of the signature graph.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sigil_core::hash::domain;
use sigil_core::{
    canonical, sign, verify, DeviceId, Error, Hash, Result, Signature, SignaturePublicKey,
    SignatureSecretKey,
};

/// Public authorship info carried on every signed link.
///
/// The signing key travels with the link so a signature is checkable
/// standalone; the reducer separately checks the key against the author's
/// enrolled device key at the state where the link lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkContext {
    /// User name of the author.
    pub user_name: String,
    /// Device the link was written on.
    pub device_id: DeviceId,
    /// Signing key the author used, at the generation active at write time.
    pub public_key: SignaturePublicKey,
}

/// The signed portion of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkBody<A> {
    /// The unique first link of a graph.
    Root {
        /// Application payload.
        payload: A,
        /// Unix milliseconds at write time.
        timestamp: u64,
        /// Authorship info.
        author: LinkContext,
    },
    /// Any later signed link.
    Node {
        /// Hash of the preceding link.
        prev: Hash,
        /// Application payload.
        payload: A,
        /// Unix milliseconds at write time.
        timestamp: u64,
        /// Authorship info.
        author: LinkContext,
    },
}

impl<A> LinkBody<A> {
    /// The payload carried by this body.
    pub fn payload(&self) -> &A {
        match self {
            LinkBody::Root { payload, .. } | LinkBody::Node { payload, .. } => payload,
        }
    }

    /// The author info carried by this body.
    pub fn author(&self) -> &LinkContext {
        match self {
            LinkBody::Root { author, .. } | LinkBody::Node { author, .. } => author,
        }
    }

    /// The write timestamp.
    pub fn timestamp(&self) -> u64 {
        match self {
            LinkBody::Root { timestamp, .. } | LinkBody::Node { timestamp, .. } => *timestamp,
        }
    }

    /// Hash of the preceding link, absent on the root.
    pub fn prev(&self) -> Option<Hash> {
        match self {
            LinkBody::Root { .. } => None,
            LinkBody::Node { prev, .. } => Some(*prev),
        }
    }
}

/// A signed link: body plus the author's signature over its canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedLink<A> {
    /// The signed content.
    pub body: LinkBody<A>,
    /// Ed25519 signature over the canonical body bytes.
    pub signature: Signature,
}

impl<A: Serialize> SignedLink<A> {
    /// Sign a body with the author's device signing key.
    pub fn sign(body: LinkBody<A>, secret: &SignatureSecretKey) -> Result<Self> {
        let bytes = canonical::to_vec(&body)?;
        Ok(Self {
            signature: sign(&bytes, secret),
            body,
        })
    }

    /// Verify the signature against the key carried in the body.
    pub fn verify_signature(&self) -> Result<()> {
        let bytes = canonical::to_vec(&self.body)?;
        if verify(&bytes, &self.signature, &self.body.author().public_key) {
            Ok(())
        } else {
            Err(Error::invalid_signature(format!(
                "link by {} failed verification",
                self.body.author().user_name
            )))
        }
    }

    /// Content hash of this link.
    pub fn hash(&self) -> Result<Hash> {
        canonical::hash_canonical(domain::LINK, self)
    }

    /// The payload carried by this link.
    pub fn payload(&self) -> &A {
        self.body.payload()
    }

    /// The author info carried by this link.
    pub fn author(&self) -> &LinkContext {
        self.body.author()
    }
}

/// An unsigned merge link joining two concurrent heads.
///
/// Content-addressed by the unordered pair it joins: the branch hashes are
/// stored sorted, so merging the same two heads from either side yields
/// the same link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeLink {
    /// The two joined heads, sorted by hash.
    pub body: [Hash; 2],
}

impl MergeLink {
    /// Join two heads, normalizing their order.
    pub fn new(a: Hash, b: Hash) -> Self {
        if a <= b {
            Self { body: [a, b] }
        } else {
            Self { body: [b, a] }
        }
    }

    /// Content hash of this link.
    pub fn hash(&self) -> Result<Hash> {
        canonical::hash_canonical(domain::LINK, self)
    }
}

/// Any entry in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Link<A> {
    /// A signed root or node link.
    Signed(SignedLink<A>),
    /// An unsigned merge link.
    Merge(MergeLink),
}

impl<A: Serialize> Link<A> {
    /// Content hash of this link.
    pub fn hash(&self) -> Result<Hash> {
        match self {
            Link::Signed(link) => link.hash(),
            Link::Merge(link) => link.hash(),
        }
    }

    /// Hashes of the links directly preceding this one.
    pub fn predecessors(&self) -> Vec<Hash> {
        match self {
            Link::Signed(link) => link.body.prev().into_iter().collect(),
            Link::Merge(link) => link.body.to_vec(),
        }
    }

    /// The signed link inside, if this is not a merge.
    pub fn as_signed(&self) -> Option<&SignedLink<A>> {
        match self {
            Link::Signed(link) => Some(link),
            Link::Merge(_) => None,
        }
    }
}

/// Marker bounds every graph payload satisfies.
pub trait Action: Clone + PartialEq + Serialize + DeserializeOwned {}

impl<T: Clone + PartialEq + Serialize + DeserializeOwned> Action for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::{device_id, SigningKeypair};

    fn context(keys: &SigningKeypair) -> LinkContext {
        LinkContext {
            user_name: "alice".into(),
            device_id: device_id("alice", "laptop"),
            public_key: keys.public,
        }
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let keys = SigningKeypair::generate();
        let body = LinkBody::Root {
            payload: "create".to_string(),
            timestamp: 1_700_000_000_000,
            author: context(&keys),
        };
        let link = SignedLink::sign(body, &keys.secret).unwrap();
        link.verify_signature().unwrap();
    }

    #[test]
    fn tampered_body_fails_verification() {
        let keys = SigningKeypair::generate();
        let body = LinkBody::Root {
            payload: "create".to_string(),
            timestamp: 1,
            author: context(&keys),
        };
        let mut link = SignedLink::sign(body, &keys.secret).unwrap();
        if let LinkBody::Root { payload, .. } = &mut link.body {
            *payload = "tampered".to_string();
        }
        assert!(link.verify_signature().is_err());
    }

    #[test]
    fn merge_link_is_order_independent() {
        let a = sigil_core::hash(domain::LINK, b"a");
        let b = sigil_core::hash(domain::LINK, b"b");
        assert_eq!(MergeLink::new(a, b), MergeLink::new(b, a));
        assert_eq!(
            MergeLink::new(a, b).hash().unwrap(),
            MergeLink::new(b, a).hash().unwrap()
        );
    }

    #[test]
    fn link_serde_distinguishes_merge() {
        let keys = SigningKeypair::generate();
        let body = LinkBody::Node {
            prev: sigil_core::hash(domain::LINK, b"prev"),
            payload: "act".to_string(),
            timestamp: 2,
            author: context(&keys),
        };
        let signed = Link::Signed(SignedLink::sign(body, &keys.secret).unwrap());
        let merge: Link<String> = Link::Merge(MergeLink::new(
            sigil_core::hash(domain::LINK, b"x"),
            sigil_core::hash(domain::LINK, b"y"),
        ));

        for link in [signed, merge] {
            let json = serde_json::to_string(&link).unwrap();
            let back: Link<String> = serde_json::from_str(&json).unwrap();
            assert_eq!(back, link);
        }
    }
}
