//! Response aggregation and verification
//!
//! Every node answers with `r = v - x * c`. Responses are summed bottom-up
//! and each node checks
//!
//! ```text
//! T = g^r_hat + X_hat^c + E    ==    V_hat
//! ```
//!
//! where `E` is the sum of the aggregate commitments of excluded subtrees.
//! A committed child that never answers is excluded by adding its `V_hat`
//! to `E` and removing its `X_hat` from `X_hat`.

use crate::messages::{ResponseMessage, SigningBody, SigningMessage};
use crate::round::Round;
use std::collections::BTreeSet;
use tracing::{debug, info, trace, warn};
use treesign_core::{CipherSuite, Result, TreeSignError};

impl<S: CipherSuite> Round<S> {
    /// Compute this node's response and start the subtree sum with it
    pub fn init_response(&mut self) -> Result<S::Scalar> {
        if self.response.is_some() {
            return Err(TreeSignError::invalid(format!(
                "{}: response already computed",
                self.name
            )));
        }
        let challenge = self.require_challenge()?;
        let response = self.v - self.keys.private_key * challenge;
        self.response = Some(response);
        self.r_hat = response;
        trace!(round = %self.name, "response initialised");
        Ok(response)
    }

    /// Fold a child's aggregate response and its exclusions into this node
    pub fn add_child_response(&mut self, from: &str, msg: &ResponseMessage<S>) -> Result<()> {
        if self.response.is_none() {
            return Err(TreeSignError::invalid(format!(
                "{}: child response before own response",
                self.name
            )));
        }
        if !self.child_commitments.contains_key(from) {
            return Err(TreeSignError::invalid(format!(
                "{}: response from '{from}' which never committed",
                self.name
            )));
        }
        if self.exceptions.contains(from) {
            return Err(TreeSignError::invalid(format!(
                "{}: response from excluded child '{from}'",
                self.name
            )));
        }
        if !self.responded.insert(from.to_string()) {
            return Err(TreeSignError::invalid(format!(
                "{}: duplicate response from '{from}'",
                self.name
            )));
        }

        self.r_hat = self.r_hat + msg.r_hat;
        self.exception_v_hat = self.exception_v_hat + msg.exception_v_hat;
        self.x_hat = self.x_hat - msg.exception_x_hat;
        self.exception_x_hat = self.exception_x_hat + msg.exception_x_hat;
        self.exceptions.extend(msg.exceptions.iter().cloned());

        debug!(
            round = %self.name,
            child = %from,
            excluded = msg.exceptions.len(),
            "child response added"
        );
        Ok(())
    }

    /// Exclude `child` from the signature. A child that committed has its
    /// contribution moved into the exception sums; one that never committed
    /// is only named.
    pub fn record_exception(&mut self, child: &str) -> Result<()> {
        if !self.children.contains_key(child) {
            return Err(TreeSignError::invalid(format!(
                "{}: '{child}' is not a child",
                self.name
            )));
        }
        if self.responded.contains(child) {
            return Err(TreeSignError::invalid(format!(
                "{}: '{child}' already responded",
                self.name
            )));
        }
        if !self.exceptions.insert(child.to_string()) {
            return Ok(());
        }

        if let Some(contribution) = self.child_commitments.get(child) {
            self.exception_v_hat = self.exception_v_hat + contribution.v_hat;
            self.x_hat = self.x_hat - contribution.x_hat;
            self.exception_x_hat = self.exception_x_hat + contribution.x_hat;
        }
        debug!(round = %self.name, child = %child, "child excluded");
        Ok(())
    }

    /// Complete `responses` with one [`SigningBody::Default`] per child
    /// that did not answer, so every child is represented exactly once.
    pub fn fill_in_with_default_messages(
        &self,
        mut responses: Vec<SigningMessage<S>>,
    ) -> Vec<SigningMessage<S>> {
        let answered: BTreeSet<String> = responses.iter().map(|m| m.from.clone()).collect();
        for name in self.children.keys() {
            if !answered.contains(name) {
                trace!(round = %self.name, child = %name, "default response");
                responses.push(SigningMessage::default_for(self.view, name.clone()));
            }
        }
        responses
    }

    /// Apply a complete set of child messages: responses are added,
    /// defaults are recorded as exceptions.
    pub fn apply_responses(&mut self, messages: Vec<SigningMessage<S>>) -> Result<()> {
        for msg in messages {
            match &msg.body {
                SigningBody::Response(response) => self.add_child_response(&msg.from, response)?,
                SigningBody::Default => self.record_exception(&msg.from)?,
                _ => {
                    return Err(TreeSignError::invalid(format!(
                        "{}: unexpected {:?} message from '{}' while collecting responses",
                        self.name,
                        msg.kind(),
                        msg.from
                    )))
                }
            }
        }
        Ok(())
    }

    /// Check the aggregated response against `V_hat`. At the root the
    /// challenge is also re-derived from the message and combined root.
    pub fn verify_responses(&self) -> Result<()> {
        let challenge = self.require_challenge()?;
        let t = self.suite.mul_base(&self.r_hat)
            + self.suite.mul_point(&self.x_hat, &challenge)
            + self.exception_v_hat;

        if t != self.log.v_hat {
            warn!(round = %self.name, "aggregate response does not match V_hat");
            return Err(TreeSignError::verification_failed(&self.name));
        }

        if self.is_root() {
            let root = self.require_combined_root()?;
            let mut transcript = self.message.clone();
            transcript.extend_from_slice(root.as_bytes());

            let expected = self.suite.hash_elgamal(&transcript, &self.log.v_hat);
            let check = self.suite.hash_elgamal(&transcript, &t);
            if challenge != expected || challenge != check {
                warn!(round = %self.name, root = %root, "challenge does not match transcript");
                return Err(TreeSignError::verification_failed(&self.name));
            }
            info!(
                round = %self.name,
                view = self.view,
                root = %root,
                excluded = self.exceptions.len(),
                "collective signature verified"
            );
        } else {
            debug!(round = %self.name, "subtree response verified");
        }
        Ok(())
    }

    /// Response to send upstream
    pub fn response_message(&self) -> Result<ResponseMessage<S>> {
        if self.response.is_none() {
            return Err(TreeSignError::invalid(format!(
                "{}: response not computed",
                self.name
            )));
        }
        Ok(ResponseMessage {
            r_hat: self.r_hat,
            exception_v_hat: self.exception_v_hat,
            exception_x_hat: self.exception_x_hat,
            exceptions: self.exceptions.iter().cloned().collect(),
        })
    }
}
