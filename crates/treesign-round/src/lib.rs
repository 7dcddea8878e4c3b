//! # Treesign Round
//!
//! One round of tree-structured collective signing, as executed by a single
//! tree node. The round runs in four stages:
//!
//! 1. **commitment**: draw a round secret, commit to it and sum the
//!    subtree's commitments and public keys ([`Round::init_commitment`],
//!    [`Round::add_child_commitment`])
//! 2. **Merkle aggregation**: combine the children's roots, the local root
//!    and the hash of the commitment log into one combined root with a
//!    proof per participant ([`Round::compute_combined_root`])
//! 3. **challenge**: the root derives the Fiat-Shamir challenge and every
//!    node pushes personalised proofs downstream
//!    ([`Round::send_children_challenges_proofs`])
//! 4. **response**: responses are summed bottom-up, silent children are
//!    excluded and the result is verified ([`Round::verify_responses`])
//!
//! [`RoundDriver`] sequences the stages over an inbox with deadlines.

pub mod challenge;
mod commit;
pub mod connection;
pub mod driver;
mod merkle;
pub mod messages;
mod response;
pub mod round;

#[cfg(test)]
pub(crate) mod testing;

pub use challenge::DistributionReport;
pub use connection::{channel, send_message, ChannelConnection, Connection};
pub use driver::{RoundDriver, RoundOutcome};
pub use messages::{
    ChallengeMessage, CommitmentMessage, MessageType, ResponseMessage, SigningBody,
    SigningMessage,
};
pub use round::{ChildContribution, CommitmentLog, LocalProof, Round, LOCAL_PROOF_KEY};
