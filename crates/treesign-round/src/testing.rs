//! Fixtures shared by the unit tests

use crate::connection::{channel, Connection};
use crate::messages::CommitmentMessage;
use crate::round::Round;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use treesign_core::{CipherSuite, Hash32, KeyPair, Ristretto255Suite, RoundConfig};

pub(crate) type Suite = Ristretto255Suite;
pub(crate) type Scalar = <Suite as CipherSuite>::Scalar;

/// Round whose children's inboxes are dropped: every send to them fails
pub(crate) fn test_round(name: &str, parent: Option<&str>, children: &[&str]) -> Round<Suite> {
    test_round_with_inboxes(name, parent, children).0
}

/// Round plus the inbox of every child, keyed by child name
pub(crate) fn test_round_with_inboxes(
    name: &str,
    parent: Option<&str>,
    children: &[&str],
) -> (Round<Suite>, BTreeMap<String, UnboundedReceiver<Vec<u8>>>) {
    let suite = Ristretto255Suite::new();
    let keys = KeyPair::generate(&suite, &mut suite.cipher(name.as_bytes()));
    let mut round = Round::new(
        suite,
        RoundConfig::default(),
        name,
        parent.map(str::to_string),
        1,
        keys,
    )
    .unwrap();

    let mut inboxes = BTreeMap::new();
    for child in children {
        let (conn, inbox) = channel(*child);
        let conn: Arc<dyn Connection> = Arc::new(conn);
        round.add_child(*child, conn).unwrap();
        inboxes.insert(child.to_string(), inbox);
    }
    (round, inboxes)
}

/// Secrets of a simulated leaf child
pub(crate) struct LeafSecrets {
    pub v: Scalar,
    pub keys: KeyPair<Suite>,
}

impl LeafSecrets {
    /// `r = v - x * c`
    pub fn respond(&self, challenge: &Scalar) -> Scalar {
        self.v - self.keys.private_key * *challenge
    }
}

/// Commitment a childless node named by `seed` would send, with its root
pub(crate) fn child_commitment(seed: &[u8], root: [u8; 32]) -> (CommitmentMessage<Suite>, LeafSecrets) {
    let suite = Ristretto255Suite::new();
    let keys = KeyPair::generate(&suite, &mut suite.cipher(seed));
    let mut v_seed = seed.to_vec();
    v_seed.extend_from_slice(b"/v");
    let v = suite.pick_scalar(&mut suite.cipher(&v_seed));
    let v_point = suite.mul_base(&v);

    let msg = CommitmentMessage {
        v: v_point,
        v_hat: v_point,
        x_hat: keys.public_key,
        mt_root: Hash32(root),
        exceptions: Vec::new(),
    };
    (msg, LeafSecrets { v, keys })
}
