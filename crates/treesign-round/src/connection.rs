//! Send capability toward another tree node
//!
//! A round only ever pushes encoded messages to its children and parent; how
//! bytes cross the network belongs to the transport. [`ChannelConnection`] is
//! the in-memory implementation used by local trees and tests.

use crate::messages::SigningMessage;
use async_trait::async_trait;
use std::fmt::Debug;
use tokio::sync::mpsc;
use treesign_core::{CipherSuite, Result, TreeSignError};

/// One-way, send-capable handle to a peer
#[async_trait]
pub trait Connection: Send + Sync + Debug {
    /// Name of the peer on the other end
    fn peer(&self) -> &str;

    /// Deliver an encoded message
    async fn put_data(&self, data: Vec<u8>) -> Result<()>;
}

/// Encode `message` and push it through `conn`
pub async fn send_message<S: CipherSuite>(
    conn: &dyn Connection,
    message: &SigningMessage<S>,
) -> Result<()> {
    let bytes = message.to_bytes()?;
    conn.put_data(bytes).await
}

/// In-memory connection backed by an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    peer: String,
    sender: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelConnection {
    /// Wrap an existing sender
    pub fn new(peer: impl Into<String>, sender: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            peer: peer.into(),
            sender,
        }
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    fn peer(&self) -> &str {
        &self.peer
    }

    async fn put_data(&self, data: Vec<u8>) -> Result<()> {
        self.sender
            .send(data)
            .map_err(|_| TreeSignError::network(format!("Peer {} disconnected", self.peer)))
    }
}

/// Create a connection to `peer` and the inbox that receives its traffic
pub fn channel(peer: impl Into<String>) -> (ChannelConnection, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ChannelConnection::new(peer, sender), receiver)
}
