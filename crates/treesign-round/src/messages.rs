//! Wire messages exchanged between tree nodes during a round
//!
//! Every message travels as a bincode-encoded [`SigningMessage`]: the view it
//! belongs to, the sender's name and one of four bodies.

use serde::{Deserialize, Serialize};
use treesign_core::{CipherSuite, Hash32, Proof, Result};

/// Discriminant of a [`SigningBody`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Placeholder standing in for a child that never answered
    Default,
    /// Personalised challenge travelling down
    Challenge,
    /// Subtree commitment travelling up
    Commitment,
    /// Aggregated response travelling up
    Response,
}

/// Aggregate commitment of a subtree, sent from child to parent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct CommitmentMessage<S: CipherSuite> {
    /// Sender's own commitment `V = g^v`
    pub v: S::Point,
    /// Sum of `V` over the sender's subtree
    pub v_hat: S::Point,
    /// Sum of public keys over the sender's subtree
    pub x_hat: S::Point,
    /// Sender's combined Merkle root
    pub mt_root: Hash32,
    /// Descendants that did not commit
    pub exceptions: Vec<String>,
}

/// Challenge pushed from parent to child
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ChallengeMessage<S: CipherSuite> {
    /// Fiat-Shamir challenge issued by the root
    pub challenge: S::Scalar,
    /// Combined root of the whole tree
    pub mt_root: Hash32,
    /// Proof from `mt_root` down to the receiver's own combined root
    pub proof: Proof,
    /// Message being collectively signed
    pub message: Vec<u8>,
}

/// Aggregate response of a subtree, sent from child to parent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ResponseMessage<S: CipherSuite> {
    /// Sum of responses over the sender's subtree
    pub r_hat: S::Scalar,
    /// Commitments of excluded descendants
    pub exception_v_hat: S::Point,
    /// Public keys of excluded descendants
    pub exception_x_hat: S::Point,
    /// Names of excluded descendants
    pub exceptions: Vec<String>,
}

/// Body of a [`SigningMessage`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub enum SigningBody<S: CipherSuite> {
    /// No payload
    Default,
    /// See [`CommitmentMessage`]
    Commitment(CommitmentMessage<S>),
    /// See [`ChallengeMessage`]
    Challenge(ChallengeMessage<S>),
    /// See [`ResponseMessage`]
    Response(ResponseMessage<S>),
}

/// Envelope for every round message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct SigningMessage<S: CipherSuite> {
    /// View the round runs in
    pub view: u64,
    /// Sender's name
    pub from: String,
    /// Payload
    pub body: SigningBody<S>,
}

impl<S: CipherSuite> SigningMessage<S> {
    /// Placeholder for a child that sent nothing
    pub fn default_for(view: u64, from: impl Into<String>) -> Self {
        Self {
            view,
            from: from.into(),
            body: SigningBody::Default,
        }
    }

    /// Discriminant of the body
    pub fn kind(&self) -> MessageType {
        match self.body {
            SigningBody::Default => MessageType::Default,
            SigningBody::Commitment(_) => MessageType::Commitment,
            SigningBody::Challenge(_) => MessageType::Challenge,
            SigningBody::Response(_) => MessageType::Response,
        }
    }

    /// Encode for the wire
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from the wire
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treesign_core::{Ristretto255Suite, TreeSignError};

    type Msg = SigningMessage<Ristretto255Suite>;

    #[test]
    fn test_challenge_survives_the_wire() {
        let suite = Ristretto255Suite::new();
        let mut rng = suite.cipher(b"wire");
        let challenge = suite.pick_scalar(&mut rng);
        let msg: Msg = SigningMessage {
            view: 7,
            from: "root".to_string(),
            body: SigningBody::Challenge(ChallengeMessage {
                challenge,
                mt_root: Hash32([3u8; 32]),
                proof: Proof::from_siblings(vec![Hash32([1u8; 32]), Hash32([2u8; 32])]),
                message: b"hello".to_vec(),
            }),
        };

        let decoded = Msg::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.view, 7);
        assert_eq!(decoded.kind(), MessageType::Challenge);
        match decoded.body {
            SigningBody::Challenge(chm) => {
                assert_eq!(chm.challenge, challenge);
                assert_eq!(chm.proof.len(), 2);
                assert_eq!(chm.message, b"hello");
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_default_placeholder() {
        let msg = Msg::default_for(2, "child-a");
        assert_eq!(msg.kind(), MessageType::Default);
        assert_eq!(msg.from, "child-a");
    }

    #[test]
    fn test_garbage_is_serialization_error() {
        let err = Msg::from_bytes(&[0xff, 0x01]).unwrap_err();
        assert!(matches!(err, TreeSignError::Serialization { .. }));
    }
}
