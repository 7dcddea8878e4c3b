//! Per-node state of one collective-signing round
//!
//! A [`Round`] is owned by exactly one tree node and walks through four
//! stages: commitment, Merkle aggregation, proof distribution, and response
//! aggregation/verification. The stage operations live in sibling modules
//! as further `impl Round` blocks.
//!
//! The tree itself is only name-keyed maps: children are reached through
//! [`Connection`] handles and the parent is a name, never an owned node.

use crate::connection::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use treesign_core::{CipherSuite, Hash32, KeyPair, Proof, Result, RoundConfig, TreeSignError};
use zeroize::Zeroize;

/// Reserved proof key for the node's local (non-tree) collaborator
pub const LOCAL_PROOF_KEY: &str = "local";

/// The part of a round that is hashed into the combined Merkle root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct CommitmentLog<S: CipherSuite> {
    /// This node's commitment `V = g^v`
    pub v: S::Point,
    /// Running sum of `V` over the subtree
    pub v_hat: S::Point,
    /// Children's committed roots, concatenated
    pub cmt_roots: Vec<u8>,
}

/// What a committed child contributed, kept so it can be excluded later
#[derive(Debug, Clone)]
pub struct ChildContribution<S: CipherSuite> {
    /// Child's aggregate commitment
    pub v_hat: S::Point,
    /// Child's aggregate public key
    pub x_hat: S::Point,
}

/// Proof handed to the local collaborator once the challenge arrives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalProof {
    /// Root the proof leads to (the whole tree's combined root)
    pub root: Hash32,
    /// Leaf the proof starts from (this node's local root)
    pub leaf: Hash32,
    /// Sibling path, root side first
    pub proof: Proof,
}

/// One node's view of a signing round
pub struct Round<S: CipherSuite> {
    pub(crate) suite: S,
    pub(crate) config: RoundConfig,

    pub(crate) name: String,
    pub(crate) parent: Option<String>,
    pub(crate) view: u64,
    pub(crate) children: BTreeMap<String, Arc<dyn Connection>>,
    pub(crate) height: u32,
    pub(crate) keys: KeyPair<S>,

    // Commitment
    pub(crate) v: S::Scalar,
    pub(crate) log: CommitmentLog<S>,
    pub(crate) x_hat: S::Point,
    pub(crate) child_commitments: BTreeMap<String, ChildContribution<S>>,

    // Merkle
    pub(crate) leaves: Vec<Hash32>,
    pub(crate) leaves_from: Vec<String>,
    pub(crate) child_roots: Vec<Hash32>,
    pub(crate) child_root_names: Vec<String>,
    pub(crate) child_roots_recorded: bool,
    pub(crate) local_root: Option<Hash32>,
    pub(crate) hashed_log: Option<Hash32>,
    pub(crate) combined_root: Option<Hash32>,
    pub(crate) proofs: BTreeMap<String, Proof>,
    pub(crate) local_proof: Option<LocalProof>,

    // Challenge / response
    pub(crate) message: Vec<u8>,
    pub(crate) challenge: Option<S::Scalar>,
    pub(crate) response: Option<S::Scalar>,
    pub(crate) r_hat: S::Scalar,
    pub(crate) exception_v_hat: S::Point,
    pub(crate) exception_x_hat: S::Point,
    pub(crate) exceptions: BTreeSet<String>,
    pub(crate) responded: BTreeSet<String>,
    pub(crate) failed_children: BTreeSet<String>,
}

impl<S: CipherSuite> Round<S> {
    /// Create a round for node `name`. `parent` is `None` at the root.
    pub fn new(
        suite: S,
        config: RoundConfig,
        name: impl Into<String>,
        parent: Option<String>,
        view: u64,
        keys: KeyPair<S>,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        if name == LOCAL_PROOF_KEY {
            return Err(TreeSignError::invalid(format!(
                "node name '{LOCAL_PROOF_KEY}' is reserved"
            )));
        }

        let null = suite.null_point();
        let zero = suite.zero_scalar();
        Ok(Self {
            config,
            name,
            parent: parent.filter(|p| !p.is_empty()),
            view,
            children: BTreeMap::new(),
            height: 0,
            x_hat: keys.public_key,
            keys,
            v: zero,
            log: CommitmentLog {
                v: null,
                v_hat: null,
                cmt_roots: Vec::new(),
            },
            child_commitments: BTreeMap::new(),
            leaves: Vec::new(),
            leaves_from: Vec::new(),
            child_roots: Vec::new(),
            child_root_names: Vec::new(),
            child_roots_recorded: false,
            local_root: None,
            hashed_log: None,
            combined_root: None,
            proofs: BTreeMap::new(),
            local_proof: None,
            message: Vec::new(),
            challenge: None,
            response: None,
            r_hat: zero,
            exception_v_hat: null,
            exception_x_hat: null,
            exceptions: BTreeSet::new(),
            responded: BTreeSet::new(),
            failed_children: BTreeSet::new(),
            suite,
        })
    }

    /// Register a child reachable through `conn`
    pub fn add_child(&mut self, name: impl Into<String>, conn: Arc<dyn Connection>) -> Result<()> {
        let name = name.into();
        if name == LOCAL_PROOF_KEY || name == self.name {
            return Err(TreeSignError::invalid(format!(
                "'{name}' cannot be used as a child name"
            )));
        }
        if self.children.insert(name.clone(), conn).is_some() {
            return Err(TreeSignError::invalid(format!("duplicate child '{name}'")));
        }
        self.height = self.height.max(1);
        Ok(())
    }

    /// Set how many levels of descendants hang below this node.
    ///
    /// Commitment and response deadlines are scaled by the height, so a
    /// parent keeps waiting until every descendant's own deadline has
    /// passed. Adding a child raises the height to at least one.
    pub fn set_height(&mut self, height: u32) -> Result<()> {
        if height == 0 && !self.children.is_empty() {
            return Err(TreeSignError::invalid(format!(
                "{}: a node with children has a height of at least 1",
                self.name
            )));
        }
        self.height = height;
        Ok(())
    }

    /// Clear all per-round state so the instance can run the next view.
    /// Keys, children and configuration are kept.
    pub fn reset(&mut self, view: u64) {
        let null = self.suite.null_point();
        let zero = self.suite.zero_scalar();

        self.view = view;
        self.v.zeroize();
        self.log = CommitmentLog {
            v: null,
            v_hat: null,
            cmt_roots: Vec::new(),
        };
        self.x_hat = self.keys.public_key;
        self.child_commitments.clear();
        self.leaves.clear();
        self.leaves_from.clear();
        self.child_roots.clear();
        self.child_root_names.clear();
        self.child_roots_recorded = false;
        self.local_root = None;
        self.hashed_log = None;
        self.combined_root = None;
        self.proofs.clear();
        self.local_proof = None;
        self.message.clear();
        self.challenge = None;
        self.response = None;
        self.r_hat = zero;
        self.exception_v_hat = null;
        self.exception_x_hat = null;
        self.exceptions.clear();
        self.responded.clear();
        self.failed_children.clear();
    }

    /// Node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent name, `None` at the root
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// True when this node has no parent
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// View this round runs in
    pub fn view(&self) -> u64 {
        self.view
    }

    /// Levels of descendants below this node, 0 for a leaf
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Suite in use
    pub fn suite(&self) -> &S {
        &self.suite
    }

    /// Active configuration
    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    /// Child names in iteration order
    pub fn child_names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    /// Public key of this node
    pub fn public_key(&self) -> &S::Point {
        &self.keys.public_key
    }

    /// Commitment `V`
    pub fn commitment(&self) -> &S::Point {
        &self.log.v
    }

    /// Aggregate commitment `V_hat`
    pub fn v_hat(&self) -> &S::Point {
        &self.log.v_hat
    }

    /// Aggregate public key `X_hat`
    pub fn x_hat(&self) -> &S::Point {
        &self.x_hat
    }

    /// Current leaves (sorted once the combined root is computed)
    pub fn leaves(&self) -> &[Hash32] {
        &self.leaves
    }

    /// Children's roots as recorded before the local root was added
    pub fn child_roots(&self) -> &[Hash32] {
        &self.child_roots
    }

    /// Names parallel to [`Round::child_roots`]
    pub fn child_root_names(&self) -> &[String] {
        &self.child_root_names
    }

    /// Local root, once recorded
    pub fn local_root(&self) -> Option<&Hash32> {
        self.local_root.as_ref()
    }

    /// Hash of the commitment log
    pub fn hashed_log(&self) -> Option<&Hash32> {
        self.hashed_log.as_ref()
    }

    /// This node's combined root
    pub fn combined_root(&self) -> Option<&Hash32> {
        self.combined_root.as_ref()
    }

    /// Proof for a child or for [`LOCAL_PROOF_KEY`]
    pub fn proof_for(&self, name: &str) -> Option<&Proof> {
        self.proofs.get(name)
    }

    /// All per-participant proofs
    pub fn proofs(&self) -> &BTreeMap<String, Proof> {
        &self.proofs
    }

    /// Proof stored for the local collaborator
    pub fn local_proof(&self) -> Option<&LocalProof> {
        self.local_proof.as_ref()
    }

    /// Message being signed, once known
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// Challenge in use
    pub fn challenge(&self) -> Option<&S::Scalar> {
        self.challenge.as_ref()
    }

    /// This node's own response
    pub fn response(&self) -> Option<&S::Scalar> {
        self.response.as_ref()
    }

    /// Sum of responses across the subtree
    pub fn aggregate_response(&self) -> &S::Scalar {
        &self.r_hat
    }

    /// Commitment correction for excluded descendants
    pub fn exception_correction(&self) -> &S::Point {
        &self.exception_v_hat
    }

    /// Public keys of excluded descendants
    pub fn exception_x_hat(&self) -> &S::Point {
        &self.exception_x_hat
    }

    /// Names of excluded descendants
    pub fn exceptions(&self) -> &BTreeSet<String> {
        &self.exceptions
    }

    /// Children whose challenge could not be delivered
    pub fn failed_children(&self) -> &BTreeSet<String> {
        &self.failed_children
    }

    pub(crate) fn require_challenge(&self) -> Result<S::Scalar> {
        self.challenge
            .ok_or_else(|| TreeSignError::invalid(format!("{}: no challenge set", self.name)))
    }

    pub(crate) fn require_combined_root(&self) -> Result<Hash32> {
        self.combined_root.ok_or_else(|| {
            TreeSignError::invalid(format!("{}: combined root not computed", self.name))
        })
    }
}

impl<S: CipherSuite> Drop for Round<S> {
    fn drop(&mut self) {
        self.v.zeroize();
    }
}

impl<S: CipherSuite> std::fmt::Debug for Round<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Round")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("view", &self.view)
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .field("leaves", &self.leaves.len())
            .field("combined_root", &self.combined_root)
            .field("exceptions", &self.exceptions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::channel;
    use crate::testing::{child_commitment, test_round, Suite};
    use treesign_core::Ristretto255Suite;

    #[test]
    fn test_reserved_and_duplicate_names() {
        let suite = Ristretto255Suite::new();
        let keys = KeyPair::generate(&suite, &mut suite.cipher(b"k"));
        assert!(Round::new(suite, RoundConfig::default(), LOCAL_PROOF_KEY, None, 1, keys).is_err());

        let mut round = test_round("root", Some(""), &["a"]);
        assert!(round.is_root());
        let (conn, _inbox) = channel("a");
        assert!(round.add_child("a", Arc::new(conn.clone())).is_err());
        assert!(round.add_child("root", Arc::new(conn.clone())).is_err());
        assert!(round.add_child(LOCAL_PROOF_KEY, Arc::new(conn)).is_err());
    }

    #[test]
    fn test_reset_clears_round_state() {
        let mut round: Round<Suite> = test_round("root", None, &["a"]);
        let mut rng = round.round_cipher(b"1");
        round.init_commitment(&mut rng);
        let (msg, _) = child_commitment(b"a", [1u8; 32]);
        round.add_child_commitment("a", &msg).unwrap();
        round.record_child_roots().unwrap();
        round.record_local_root(Hash32([2u8; 32])).unwrap();
        round.hash_commitment_log().unwrap();
        round.compute_combined_root().unwrap();
        round.compute_root_challenge(b"m").unwrap();

        round.reset(2);
        assert_eq!(round.view(), 2);
        assert!(round.leaves().is_empty());
        assert!(round.combined_root().is_none());
        assert!(round.challenge().is_none());
        assert!(round.proofs().is_empty());
        assert_eq!(round.x_hat(), round.public_key());
        assert_eq!(round.child_names().collect::<Vec<_>>(), vec!["a"]);

        // the next view accepts the same child again
        let mut rng = round.round_cipher(b"2");
        round.init_commitment(&mut rng);
        round.add_child_commitment("a", &msg).unwrap();
        round.record_child_roots().unwrap();
    }

    #[test]
    fn test_height_follows_children() {
        let mut leaf: Round<Suite> = test_round("leaf", Some("root"), &[]);
        assert_eq!(leaf.height(), 0);
        leaf.set_height(0).unwrap();

        let mut round: Round<Suite> = test_round("root", None, &["a"]);
        assert_eq!(round.height(), 1);
        assert!(round.set_height(0).is_err());
        round.set_height(3).unwrap();
        let (conn, _inbox) = channel("b");
        round.add_child("b", Arc::new(conn)).unwrap();
        assert_eq!(round.height(), 3);

        round.reset(2);
        assert_eq!(round.height(), 3);
    }
}
