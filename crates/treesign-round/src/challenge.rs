//! Challenge stage and top-down proof distribution

use crate::connection::{send_message, Connection};
use crate::messages::{ChallengeMessage, SigningBody, SigningMessage};
use crate::round::{LocalProof, Round, LOCAL_PROOF_KEY};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use treesign_core::{CipherSuite, Proof, Result, TreeSignError};

/// Outcome of pushing challenges to the children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionReport {
    /// Children that accepted their challenge
    pub delivered: Vec<String>,
    /// Children whose connection returned an error
    pub failed: Vec<String>,
}

impl DistributionReport {
    /// True when every send succeeded
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl<S: CipherSuite> Round<S> {
    /// Derive the Fiat-Shamir challenge at the root:
    /// `c = H(message || combined_root, V_hat)`.
    ///
    /// The returned message carries an empty proof, since the root's own
    /// combined root is the tree's root.
    pub fn compute_root_challenge(&mut self, message: &[u8]) -> Result<ChallengeMessage<S>> {
        if !self.is_root() {
            return Err(TreeSignError::invalid(format!(
                "{}: only the root derives the challenge",
                self.name
            )));
        }
        let root = self.require_combined_root()?;

        let mut transcript = message.to_vec();
        transcript.extend_from_slice(root.as_bytes());
        let challenge = self.suite.hash_elgamal(&transcript, &self.log.v_hat);

        self.message = message.to_vec();
        self.challenge = Some(challenge);
        info!(round = %self.name, view = self.view, root = %root, "challenge derived");

        Ok(ChallengeMessage {
            challenge,
            mt_root: root,
            proof: Proof::new(),
            message: self.message.clone(),
        })
    }

    /// Adopt the challenge received from the parent.
    ///
    /// With `verify_proofs` set, the proof inside must lead from this node's
    /// combined root to the tree root.
    pub fn set_challenge(&mut self, chm: &ChallengeMessage<S>) -> Result<()> {
        if self.config.verify_proofs {
            let own = self.require_combined_root()?;
            if !chm.proof.check(self.suite.hash_algorithm(), &chm.mt_root, &own) {
                warn!(round = %self.name, root = %chm.mt_root, "challenge proof does not reach the tree root");
                return Err(TreeSignError::crypto(format!(
                    "{}: proof from parent does not reach {}",
                    self.name, chm.mt_root
                )));
            }
        }
        self.challenge = Some(chm.challenge);
        self.message = chm.message.clone();
        trace!(round = %self.name, root = %chm.mt_root, "challenge set");
        Ok(())
    }

    /// Personalised challenge for `child`: the parent's proof followed by
    /// the child's segment of this node's tree.
    pub fn personalized_challenge(
        &self,
        chm: &ChallengeMessage<S>,
        child: &str,
    ) -> Option<ChallengeMessage<S>> {
        let segment = self.proofs.get(child)?;
        Some(ChallengeMessage {
            challenge: chm.challenge,
            mt_root: chm.mt_root,
            proof: chm.proof.concat(segment),
            message: chm.message.clone(),
        })
    }

    /// Send every committed child its personalised challenge.
    ///
    /// A failed send does not stop the loop: the child is recorded in
    /// [`Round::failed_children`] and later excluded like a silent child.
    pub async fn send_children_challenges_proofs(
        &mut self,
        chm: &ChallengeMessage<S>,
    ) -> Result<DistributionReport> {
        let mut outgoing = Vec::with_capacity(self.child_root_names.len());
        for name in &self.child_root_names {
            let conn = self.connection(name)?;
            let personal = self.personalized_challenge(chm, name).ok_or_else(|| {
                TreeSignError::internal(format!("{}: no proof for child '{name}'", self.name))
            })?;
            outgoing.push((name.clone(), conn, personal));
        }

        let mut report = DistributionReport::default();
        for (name, conn, personal) in outgoing {
            let msg = SigningMessage {
                view: self.view,
                from: self.name.clone(),
                body: SigningBody::Challenge(personal),
            };
            self.deliver(&name, conn.as_ref(), &msg, &mut report).await;
        }
        Ok(report)
    }

    /// Forward `chm` unchanged to every child
    pub async fn send_children_challenges(
        &mut self,
        chm: &ChallengeMessage<S>,
    ) -> Result<DistributionReport> {
        let outgoing: Vec<(String, Arc<dyn Connection>)> = self
            .children
            .iter()
            .map(|(name, conn)| (name.clone(), Arc::clone(conn)))
            .collect();
        let msg = SigningMessage {
            view: self.view,
            from: self.name.clone(),
            body: SigningBody::Challenge(chm.clone()),
        };

        let mut report = DistributionReport::default();
        for (name, conn) in outgoing {
            self.deliver(&name, conn.as_ref(), &msg, &mut report).await;
        }
        Ok(report)
    }

    /// Record the proof for the local collaborator: the parent's proof
    /// followed by the local segment, targeting the tree root.
    pub fn store_local_proof(&mut self, chm: &ChallengeMessage<S>) -> Result<&LocalProof> {
        let leaf = self.local_root.ok_or_else(|| {
            TreeSignError::invalid(format!("{}: local root not recorded", self.name))
        })?;
        let segment = self.proofs.get(LOCAL_PROOF_KEY).ok_or_else(|| {
            TreeSignError::invalid(format!("{}: local proof not computed", self.name))
        })?;

        let local = self.local_proof.insert(LocalProof {
            root: chm.mt_root,
            leaf,
            proof: chm.proof.concat(segment),
        });
        debug!(round = %self.name, depth = local.proof.len(), "local proof stored");

        if self.config.verify_proofs {
            self.verify_local_proof()?;
        }
        self.local_proof
            .as_ref()
            .ok_or_else(|| TreeSignError::internal("local proof vanished"))
    }

    /// Replay the stored local proof against its root
    pub fn verify_local_proof(&self) -> Result<()> {
        let local = self.local_proof.as_ref().ok_or_else(|| {
            TreeSignError::invalid(format!("{}: no local proof stored", self.name))
        })?;
        if local
            .proof
            .check(self.suite.hash_algorithm(), &local.root, &local.leaf)
        {
            Ok(())
        } else {
            warn!(round = %self.name, root = %local.root, "local proof does not verify");
            Err(TreeSignError::crypto(format!(
                "{}: local proof does not reach {}",
                self.name, local.root
            )))
        }
    }

    fn connection(&self, child: &str) -> Result<Arc<dyn Connection>> {
        self.children.get(child).cloned().ok_or_else(|| {
            TreeSignError::internal(format!("{}: no connection to '{child}'", self.name))
        })
    }

    async fn deliver(
        &mut self,
        name: &str,
        conn: &dyn Connection,
        msg: &SigningMessage<S>,
        report: &mut DistributionReport,
    ) {
        match send_message(conn, msg).await {
            Ok(()) => {
                trace!(round = %self.name, child = %name, "challenge sent");
                report.delivered.push(name.to_string());
            }
            Err(e) => {
                warn!(round = %self.name, child = %name, error = %e, "challenge delivery failed");
                self.failed_children.insert(name.to_string());
                report.failed.push(name.to_string());
            }
        }
    }
}
