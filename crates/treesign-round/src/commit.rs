//! Commitment stage: per-round secret, commitment point and subtree sums

use crate::messages::CommitmentMessage;
use crate::round::{ChildContribution, CommitmentLog, Round};
use rand::{CryptoRng, RngCore};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, trace};
use treesign_core::{CipherSuite, Result, TreeSignError};
use zeroize::Zeroize;

impl<S: CipherSuite> Round<S> {
    /// Draw the round secret `v`, set `V = g^v`, and start the subtree sums
    /// at `V_hat = V` and `X_hat = X`.
    pub fn init_commitment<R: RngCore + CryptoRng>(&mut self, rng: &mut R) {
        self.v.zeroize();
        self.v = self.suite.pick_scalar(rng);
        let v_point = self.suite.mul_base(&self.v);
        self.log = CommitmentLog {
            v: v_point,
            v_hat: self.suite.null_point() + v_point,
            cmt_roots: Vec::new(),
        };
        self.x_hat = self.suite.null_point() + self.keys.public_key;

        trace!(round = %self.name, view = self.view, "commitment initialised");
    }

    /// Deterministic generator bound to this node's name and a per-round
    /// nonce. Reusing a nonce reuses `v`, so callers must never repeat one
    /// for the same key.
    pub fn round_cipher(&self, nonce: &[u8]) -> ChaCha20Rng {
        let mut seed = Vec::with_capacity(self.name.len() + 1 + nonce.len());
        seed.extend_from_slice(self.name.as_bytes());
        seed.push(0);
        seed.extend_from_slice(nonce);
        self.suite.cipher(&seed)
    }

    /// Fold a subtree's commitment and public key into `V_hat` and `X_hat`
    pub fn accumulate_commitment(&mut self, v_hat: &S::Point, x_hat: &S::Point) {
        self.log.v_hat = self.log.v_hat + *v_hat;
        self.x_hat = self.x_hat + *x_hat;
    }

    /// Accept a child's commitment: fold in its sums, queue its root as a
    /// leaf and remember what it contributed.
    pub fn add_child_commitment(&mut self, from: &str, msg: &CommitmentMessage<S>) -> Result<()> {
        if !self.children.contains_key(from) {
            return Err(TreeSignError::invalid(format!(
                "{}: commitment from unknown child '{from}'",
                self.name
            )));
        }
        if self.child_commitments.contains_key(from) {
            return Err(TreeSignError::invalid(format!(
                "{}: duplicate commitment from '{from}'",
                self.name
            )));
        }
        if self.child_roots_recorded || self.local_root.is_some() {
            return Err(TreeSignError::invalid(format!(
                "{}: commitment from '{from}' after child roots were recorded",
                self.name
            )));
        }

        self.accumulate_commitment(&msg.v_hat, &msg.x_hat);
        self.leaves.push(msg.mt_root);
        self.leaves_from.push(from.to_string());
        self.child_commitments.insert(
            from.to_string(),
            ChildContribution {
                v_hat: msg.v_hat,
                x_hat: msg.x_hat,
            },
        );
        self.exceptions.extend(msg.exceptions.iter().cloned());

        debug!(round = %self.name, child = %from, root = %msg.mt_root, "child commitment added");
        Ok(())
    }

    /// Children that have not committed yet
    pub fn missing_commitments(&self) -> Vec<String> {
        self.children
            .keys()
            .filter(|name| !self.child_commitments.contains_key(*name))
            .cloned()
            .collect()
    }

    /// Name every child that never committed as an exception. They never
    /// entered `V_hat`/`X_hat`, so no correction is needed.
    pub fn record_missing_commitments(&mut self) -> Vec<String> {
        let missing = self.missing_commitments();
        for name in &missing {
            debug!(round = %self.name, child = %name, "child did not commit");
            self.exceptions.insert(name.clone());
        }
        missing
    }

    /// Commitment to send upstream once the combined root is known
    pub fn commitment_message(&self) -> Result<CommitmentMessage<S>> {
        Ok(CommitmentMessage {
            v: self.log.v,
            v_hat: self.log.v_hat,
            x_hat: self.x_hat,
            mt_root: self.require_combined_root()?,
            exceptions: self.exceptions.iter().cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{child_commitment, test_round};
    use proptest::prelude::*;
    use treesign_core::{CipherSuite, TreeSignError};

    #[test]
    fn test_init_sets_sums_to_own_contribution() {
        let mut round = test_round("root", None, &[]);
        let mut rng = round.round_cipher(b"view-1");
        round.init_commitment(&mut rng);

        assert_eq!(round.v_hat(), round.commitment());
        assert_eq!(round.x_hat(), round.public_key());
        assert_eq!(round.suite().mul_base(&round.v), *round.commitment());
    }

    #[test]
    fn test_round_cipher_depends_on_nonce() {
        let mut a = test_round("n", None, &[]);
        let mut rng1 = a.round_cipher(b"1");
        a.init_commitment(&mut rng1);
        let first = *a.commitment();

        let mut rng2 = a.round_cipher(b"2");
        a.init_commitment(&mut rng2);
        assert_ne!(first, *a.commitment());
    }

    #[test]
    fn test_child_commitment_accumulates() {
        let mut round = test_round("root", None, &["a", "b"]);
        let mut rng = round.round_cipher(b"x");
        round.init_commitment(&mut rng);
        let (msg_a, _) = child_commitment(b"a", [1u8; 32]);
        let (msg_b, _) = child_commitment(b"b", [2u8; 32]);

        let expected_v = *round.v_hat() + msg_a.v_hat + msg_b.v_hat;
        let expected_x = *round.x_hat() + msg_a.x_hat + msg_b.x_hat;
        round.add_child_commitment("a", &msg_a).unwrap();
        round.add_child_commitment("b", &msg_b).unwrap();

        assert_eq!(*round.v_hat(), expected_v);
        assert_eq!(*round.x_hat(), expected_x);
        assert_eq!(round.leaves().len(), 2);
        assert!(round.missing_commitments().is_empty());
    }

    #[test]
    fn test_rejects_unknown_and_duplicate_children() {
        let mut round = test_round("root", None, &["a"]);
        let mut rng = round.round_cipher(b"x");
        round.init_commitment(&mut rng);
        let (msg, _) = child_commitment(b"a", [1u8; 32]);

        assert!(matches!(
            round.add_child_commitment("zz", &msg),
            Err(TreeSignError::Invalid { .. })
        ));
        round.add_child_commitment("a", &msg).unwrap();
        assert!(round.add_child_commitment("a", &msg).is_err());
    }

    #[test]
    fn test_missing_children_become_exceptions() {
        let mut round = test_round("root", None, &["a", "b"]);
        let mut rng = round.round_cipher(b"x");
        round.init_commitment(&mut rng);
        let (msg, _) = child_commitment(b"a", [1u8; 32]);
        round.add_child_commitment("a", &msg).unwrap();

        assert_eq!(round.record_missing_commitments(), vec!["b".to_string()]);
        assert!(round.exceptions().contains("b"));
    }

    proptest! {
        #[test]
        fn accumulation_is_order_independent(order in Just((0..5usize).collect::<Vec<_>>()).prop_shuffle()) {
            let names = ["c0", "c1", "c2", "c3", "c4"];
            let msgs: Vec<_> = names
                .iter()
                .map(|n| child_commitment(n.as_bytes(), [0u8; 32]).0)
                .collect();

            let mut sorted = test_round("root", None, &names);
            let mut rng = sorted.round_cipher(b"p");
            sorted.init_commitment(&mut rng);
            let mut shuffled = test_round("root", None, &names);
            let mut rng = shuffled.round_cipher(b"p");
            shuffled.init_commitment(&mut rng);

            for msg in &msgs {
                sorted.accumulate_commitment(&msg.v_hat, &msg.x_hat);
            }
            for i in order {
                shuffled.accumulate_commitment(&msgs[i].v_hat, &msgs[i].x_hat);
            }

            prop_assert_eq!(sorted.v_hat(), shuffled.v_hat());
            prop_assert_eq!(sorted.x_hat(), shuffled.x_hat());
        }
    }
}
