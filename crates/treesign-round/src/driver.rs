//! Per-node round driver
//!
//! Sequences the four stages of a [`Round`] against an inbox of encoded
//! messages, applying the deadlines from [`treesign_core::RoundConfig`].
//! Children that miss a deadline become exceptions instead of failing the
//! round.
//!
//! Commitment and response windows are scaled by [`Round::height`]: a node
//! waiting out a silent descendant still reports before its own parent
//! gives up on it.

use crate::connection::{send_message, Connection};
use crate::messages::{ChallengeMessage, SigningBody, SigningMessage};
use crate::round::{LocalProof, Round};
use rand::{CryptoRng, RngCore};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, trace, warn};
use treesign_core::{init_tracing_from_config, CipherSuite, Hash32, Result, TreeSignError};

/// What a node learns from a completed round
#[derive(Debug, Clone)]
pub struct RoundOutcome<S: CipherSuite> {
    /// This node's combined root
    pub combined_root: Hash32,
    /// Challenge the tree signed with
    pub challenge: S::Scalar,
    /// Proof from the local root up to the tree root
    pub local_proof: LocalProof,
    /// Descendants excluded from the signature
    pub exceptions: Vec<String>,
}

/// Runs one [`Round`] over an inbox and a parent connection
pub struct RoundDriver<S: CipherSuite> {
    round: Round<S>,
    inbox: mpsc::UnboundedReceiver<Vec<u8>>,
    parent: Option<Arc<dyn Connection>>,
}

impl<S: CipherSuite> RoundDriver<S> {
    /// `parent` must be present exactly when the round has a parent.
    /// Installs the tracing subscriber at the round's configured verbosity
    /// unless one is already set.
    pub fn new(
        round: Round<S>,
        inbox: mpsc::UnboundedReceiver<Vec<u8>>,
        parent: Option<Arc<dyn Connection>>,
    ) -> Result<Self> {
        if round.is_root() != parent.is_none() {
            return Err(TreeSignError::invalid(format!(
                "{}: parent connection does not match parent name",
                round.name()
            )));
        }
        init_tracing_from_config(round.config());
        Ok(Self {
            round,
            inbox,
            parent,
        })
    }

    /// The driven round
    pub fn round(&self) -> &Round<S> {
        &self.round
    }

    /// Give the round back, e.g. to [`Round::reset`] it for the next view
    pub fn into_round(self) -> Round<S> {
        self.round
    }

    /// Split into the round, its inbox and the parent connection
    #[allow(clippy::type_complexity)]
    pub fn into_parts(
        self,
    ) -> (
        Round<S>,
        mpsc::UnboundedReceiver<Vec<u8>>,
        Option<Arc<dyn Connection>>,
    ) {
        (self.round, self.inbox, self.parent)
    }

    /// Run a full round. The root signs `message`; every other node learns
    /// the message from its parent's challenge.
    pub async fn run<R>(
        &mut self,
        rng: &mut R,
        local_root: Hash32,
        message: Option<&[u8]>,
    ) -> Result<RoundOutcome<S>>
    where
        R: RngCore + CryptoRng + Send,
    {
        debug!(round = %self.round.name(), view = self.round.view(), "round started");
        self.round.init_commitment(rng);

        self.collect_commitments().await;
        self.round.record_missing_commitments();

        self.round.record_child_roots()?;
        self.round.record_local_root(local_root)?;
        self.round.hash_commitment_log()?;
        let combined_root = self.round.compute_combined_root()?;

        let chm = match self.parent.clone() {
            Some(parent) => {
                let commitment = self.round.commitment_message()?;
                self.send_up(parent.as_ref(), SigningBody::Commitment(commitment))
                    .await?;
                let chm = self.await_challenge().await?;
                self.round.set_challenge(&chm)?;
                chm
            }
            None => {
                let message = message.ok_or_else(|| {
                    TreeSignError::invalid(format!(
                        "{}: root needs a message to sign",
                        self.round.name()
                    ))
                })?;
                self.round.compute_root_challenge(message)?
            }
        };

        let local_proof = self.round.store_local_proof(&chm)?.clone();
        let report = self.round.send_children_challenges_proofs(&chm).await?;
        if !report.is_complete() {
            warn!(
                round = %self.round.name(),
                failed = report.failed.len(),
                "some children did not receive the challenge"
            );
        }

        let challenge = self.round.init_response()?;
        let received = self.collect_responses().await;
        let complete = self.round.fill_in_with_default_messages(received);
        self.round.apply_responses(complete)?;
        self.round.verify_responses()?;

        if let Some(parent) = self.parent.clone() {
            let response = self.round.response_message()?;
            self.send_up(parent.as_ref(), SigningBody::Response(response))
                .await?;
        }

        info!(
            round = %self.round.name(),
            root = %combined_root,
            excluded = self.round.exceptions().len(),
            "round finished"
        );
        Ok(RoundOutcome {
            combined_root,
            challenge,
            local_proof,
            exceptions: self.round.exceptions().iter().cloned().collect(),
        })
    }

    /// Gather commitments until every child has committed or the deadline
    /// passes
    async fn collect_commitments(&mut self) {
        let window = self.round.config().commitment_window(self.round.height());
        let deadline = deadline_after(window);
        while !self.round.missing_commitments().is_empty() {
            let Some(msg) = self.next_message(deadline).await else {
                break;
            };
            match msg.body {
                SigningBody::Commitment(commitment) => {
                    if let Err(e) = self.round.add_child_commitment(&msg.from, &commitment) {
                        warn!(round = %self.round.name(), from = %msg.from, error = %e, "commitment rejected");
                    }
                }
                _ => trace!(
                    round = %self.round.name(),
                    from = %msg.from,
                    kind = ?msg.kind(),
                    "ignored while collecting commitments"
                ),
            }
        }
    }

    async fn await_challenge(&mut self) -> Result<ChallengeMessage<S>> {
        let deadline = deadline_after(self.round.config().challenge_timeout());
        let parent = self.round.parent().unwrap_or_default().to_string();
        loop {
            let Some(msg) = self.next_message(deadline).await else {
                return Err(TreeSignError::timeout(format!(
                    "{}: no challenge from '{parent}'",
                    self.round.name()
                )));
            };
            match msg.body {
                SigningBody::Challenge(chm) if msg.from == parent => return Ok(chm),
                _ => trace!(
                    round = %self.round.name(),
                    from = %msg.from,
                    kind = ?msg.kind(),
                    "ignored while awaiting challenge"
                ),
            }
        }
    }

    /// Gather responses from every child that was sent a challenge
    async fn collect_responses(&mut self) -> Vec<SigningMessage<S>> {
        let mut pending: BTreeSet<String> = self
            .round
            .child_root_names()
            .iter()
            .filter(|name| !self.round.failed_children().contains(*name))
            .cloned()
            .collect();

        let window = self.round.config().response_window(self.round.height());
        let deadline = deadline_after(window);
        let mut received = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let Some(msg) = self.next_message(deadline).await else {
                break;
            };
            if matches!(msg.body, SigningBody::Response(_)) && pending.remove(&msg.from) {
                received.push(msg);
            } else {
                trace!(
                    round = %self.round.name(),
                    from = %msg.from,
                    kind = ?msg.kind(),
                    "ignored while collecting responses"
                );
            }
        }
        for name in &pending {
            debug!(round = %self.round.name(), child = %name, "no response before deadline");
        }
        received
    }

    /// Next decodable message for this view, or `None` once the deadline
    /// passes or the inbox closes
    async fn next_message(&mut self, deadline: Instant) -> Option<SigningMessage<S>> {
        loop {
            let bytes = timeout_at(deadline, self.inbox.recv()).await.ok()??;
            match SigningMessage::<S>::from_bytes(&bytes) {
                Ok(msg) if msg.view == self.round.view() => return Some(msg),
                Ok(msg) => trace!(
                    round = %self.round.name(),
                    from = %msg.from,
                    view = msg.view,
                    "message from another view"
                ),
                Err(e) => warn!(round = %self.round.name(), error = %e, "undecodable message"),
            }
        }
    }

    async fn send_up(&self, parent: &dyn Connection, body: SigningBody<S>) -> Result<()> {
        let msg = SigningMessage {
            view: self.round.view(),
            from: self.round.name().to_string(),
            body,
        };
        send_message(parent, &msg).await
    }
}

/// `now + window`, saturating for windows beyond the clock's range
fn deadline_after(window: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(window)
        .unwrap_or_else(|| now + Duration::from_secs(365 * 24 * 60 * 60))
}

impl<S: CipherSuite> std::fmt::Debug for RoundDriver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundDriver")
            .field("round", &self.round)
            .field("has_parent", &self.parent.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_round, Suite};

    #[tokio::test]
    async fn test_lone_root_signs() {
        let round = test_round("root", None, &[]);
        let (_tx, inbox) = mpsc::unbounded_channel();
        let mut driver = RoundDriver::new(round, inbox, None).unwrap();

        let mut rng = driver.round().round_cipher(b"lone");
        let outcome = driver
            .run(&mut rng, Hash32([7u8; 32]), Some(b"message"))
            .await
            .unwrap();

        assert!(outcome.exceptions.is_empty());
        assert_eq!(outcome.local_proof.root, outcome.combined_root);
        assert_eq!(outcome.local_proof.leaf, Hash32([7u8; 32]));
    }

    #[tokio::test]
    async fn test_root_without_message_fails() {
        let round = test_round("root", None, &[]);
        let (_tx, inbox) = mpsc::unbounded_channel();
        let mut driver = RoundDriver::<Suite>::new(round, inbox, None).unwrap();
        let mut rng = driver.round().round_cipher(b"lone");
        assert!(driver.run(&mut rng, Hash32::ZERO, None).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_outlasts_child_window() {
        // "mid" has a silent child, so it reports after one commitment window
        let mut round = test_round("root", None, &["mid"]);
        round.set_height(2).unwrap();
        let (_tx, inbox) = mpsc::unbounded_channel();
        let mut driver = RoundDriver::<Suite>::new(round, inbox, None).unwrap();
        let window = driver.round().config().commitment_timeout();

        let started = Instant::now();
        driver.collect_commitments().await;
        assert!(started.elapsed() >= window * 2);
    }

    #[test]
    fn test_parent_connection_must_match() {
        let round = test_round("leaf", Some("root"), &[]);
        let (_tx, inbox) = mpsc::unbounded_channel();
        assert!(RoundDriver::new(round, inbox, None).is_err());
    }
}
