use anyhow::Result;
use async_trait::async_trait;
use libp2p_identity::PeerId;

use crate::error::BitswapError;
use crate::message::Message;

/// The transport underneath bitswap.
///
/// Implementations own dialing, stream handling and any timeout or retry policy of a single
/// send. Calls for different peers may run concurrently.
#[async_trait]
pub trait Network: Send + Sync + 'static {
    /// Makes sure there is a connection to `peer`.
    async fn connect_to(&self, peer: PeerId) -> Result<()>;

    /// Delivers `message` to `peer`.
    async fn send_message(&self, peer: PeerId, message: &Message) -> Result<()>;
}

/// Inbound events reported by the [`Network`].
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    MessageReceived(PeerId, Message),
}

/// A send to `peer` failed. The content that could not be delivered stays queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerFailure {
    pub peer: PeerId,
    pub reason: String,
}

impl From<PeerFailure> for BitswapError {
    fn from(failure: PeerFailure) -> Self {
        BitswapError::TransmissionFailure {
            peer: failure.peer,
            reason: failure.reason,
        }
    }
}
