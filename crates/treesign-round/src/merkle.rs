//! Merkle aggregation stage
//!
//! Children's combined roots and the local root become leaves. Together with
//! the hash of the round's commitment log they are sorted and built into one
//! tree, whose root is paired with the log hash one more time:
//!
//! ```text
//!            combined_root
//!            /           \
//!   root(sorted leaves)   hashed_log
//!      /    ...    \
//!   leaf  ...     leaf
//! ```
//!
//! Every participant's proof therefore starts with `hashed_log`.

use crate::round::{Round, LOCAL_PROOF_KEY};
use tracing::{debug, trace, warn};
use treesign_core::{build_proof_tree, CipherSuite, Hash32, Proof, Result, TreeSignError};

impl<S: CipherSuite> Round<S> {
    /// Snapshot the children's roots and names, and fold the roots into the
    /// commitment log. The snapshot is owned; later changes to `leaves` do
    /// not touch it.
    ///
    /// Runs once per view, before the local root is recorded. Commitments
    /// arriving afterwards are rejected.
    pub fn record_child_roots(&mut self) -> Result<()> {
        if self.child_roots_recorded {
            return Err(TreeSignError::invalid(format!(
                "{}: child roots already recorded",
                self.name
            )));
        }
        if self.local_root.is_some() || self.combined_root.is_some() {
            return Err(TreeSignError::invalid(format!(
                "{}: child roots recorded after the local root",
                self.name
            )));
        }

        let children = self.leaves_from.len();
        self.child_roots = self.leaves[..children].to_vec();
        self.child_root_names = self.leaves_from.clone();

        self.log.cmt_roots = self
            .child_roots
            .iter()
            .flat_map(|root| root.as_bytes().iter().copied())
            .collect();

        self.child_roots_recorded = true;
        trace!(round = %self.name, children, "child roots recorded");
        Ok(())
    }

    /// Add the root handed over by the local collaborator as a leaf
    pub fn record_local_root(&mut self, root: Hash32) -> Result<()> {
        if self.local_root.is_some() {
            return Err(TreeSignError::invalid(format!(
                "{}: local root already recorded",
                self.name
            )));
        }
        self.local_root = Some(root);
        self.leaves.push(root);
        Ok(())
    }

    /// Serialize the commitment log and hash it
    pub fn hash_commitment_log(&mut self) -> Result<Hash32> {
        let bytes = bincode::serialize(&self.log)?;
        let hashed = self.suite.hash(&bytes);
        self.hashed_log = Some(hashed);
        Ok(hashed)
    }

    /// Build the two-level tree and assign every participant its proof
    pub fn compute_combined_root(&mut self) -> Result<Hash32> {
        let hashed_log = self.hashed_log.ok_or_else(|| {
            TreeSignError::invalid(format!("{}: commitment log not hashed", self.name))
        })?;
        let local_root = self.local_root.ok_or_else(|| {
            TreeSignError::invalid(format!("{}: local root not recorded", self.name))
        })?;
        if self.combined_root.is_some() {
            return Err(TreeSignError::invalid(format!(
                "{}: combined root already computed",
                self.name
            )));
        }

        self.leaves.push(hashed_log);
        self.leaves.sort();

        if let Some(dup) = self.leaves.windows(2).find(|w| w[0] == w[1]) {
            if self.config.reject_duplicate_leaves {
                return Err(TreeSignError::invalid(format!(
                    "{}: duplicate leaf {}",
                    self.name, dup[0]
                )));
            }
            warn!(round = %self.name, leaf = %dup[0], "duplicate leaf, proofs assigned by position");
        }

        let hash = self.suite.hash_algorithm();
        let (left, leaf_proofs) = build_proof_tree(hash, &self.leaves);
        let (combined, _) = build_proof_tree(hash, &[left, hashed_log]);

        self.proofs.clear();
        for name in &self.child_root_names {
            self.proofs
                .insert(name.clone(), Proof::from_siblings(vec![hashed_log]));
        }
        self.proofs.insert(
            LOCAL_PROOF_KEY.to_string(),
            Proof::from_siblings(vec![hashed_log]),
        );

        let sorted = self.leaves.clone();
        self.separate_proofs(&leaf_proofs, &sorted)?;
        self.combined_root = Some(combined);

        debug!(
            round = %self.name,
            leaves = self.leaves.len(),
            local = %local_root,
            root = %combined,
            "combined root computed"
        );
        Ok(combined)
    }

    /// Match every recorded child root, then the local root, to its slot in
    /// the sorted leaves and append that slot's proof.
    ///
    /// Each slot is claimed at most once, so two participants with
    /// byte-identical roots receive proofs for two different positions.
    pub fn separate_proofs(&mut self, proofs: &[Proof], sorted_leaves: &[Hash32]) -> Result<()> {
        if proofs.len() != sorted_leaves.len() {
            return Err(TreeSignError::internal(format!(
                "{}: {} proofs for {} leaves",
                self.name,
                proofs.len(),
                sorted_leaves.len()
            )));
        }

        let mut claimed = vec![false; sorted_leaves.len()];
        let mut claim = |target: &Hash32| -> Option<usize> {
            let slot = sorted_leaves
                .iter()
                .enumerate()
                .position(|(j, leaf)| !claimed[j] && leaf == target)?;
            claimed[slot] = true;
            Some(slot)
        };

        let mut assignments = Vec::with_capacity(self.child_roots.len() + 1);
        for (root, name) in self.child_roots.iter().zip(&self.child_root_names) {
            assignments.push((name.clone(), claim(root), *root));
        }
        if let Some(local) = self.local_root {
            assignments.push((LOCAL_PROOF_KEY.to_string(), claim(&local), local));
        }

        for (name, slot, root) in assignments {
            let slot = slot.ok_or_else(|| {
                TreeSignError::internal(format!("{}: no leaf for {name} ({root})", self.name))
            })?;
            self.proofs.entry(name).or_default().extend_from(&proofs[slot]);
        }
        Ok(())
    }
}
