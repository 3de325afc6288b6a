use libp2p_identity::PeerId;
use thiserror::Error;

/// The ways a received frame fails to become a [`crate::Message`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Error while decoding bitswap message: {0}")]
    Protobuf(#[from] prost::DecodeError),
    #[error("Error while parsing cid: {0}")]
    Cid(#[from] cid::Error),
    #[error("Error while parsing multihash: {0}")]
    Multihash(#[from] multihash::Error),
    #[error("prefix announces a {expected} byte digest, got {actual} bytes")]
    DigestLength { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum BitswapError {
    #[error("malformed bitswap message: {0}")]
    MalformedMessage(#[from] DecodeError),
    #[error("failed to send message to {peer}: {reason}")]
    TransmissionFailure { peer: PeerId, reason: String },
    #[error("want manager has not been started")]
    NotStarted,
    #[error("want manager must be started from within a tokio runtime")]
    NoRuntime,
    #[error("want manager was already started")]
    AlreadyStarted,
    #[error("want manager is closing")]
    Closing,
    #[error("message of {0} bytes exceeds the maximum frame size")]
    MessageTooLarge(usize),
    #[error("Error while reading from socket: {0}")]
    Io(#[from] std::io::Error),
    #[error("blockstore error: {0}")]
    Blockstore(String),
}

impl From<prost::DecodeError> for BitswapError {
    fn from(e: prost::DecodeError) -> Self {
        BitswapError::MalformedMessage(e.into())
    }
}

impl From<cid::Error> for BitswapError {
    fn from(e: cid::Error) -> Self {
        BitswapError::MalformedMessage(e.into())
    }
}
