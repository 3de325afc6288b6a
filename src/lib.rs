//! Bitswap want-list engine.
//!
//! Nodes advertise which content-addressed blocks they want and exchange those wants with
//! every connected peer. The [`WantManager`] owns the local want-list and one outgoing
//! queue per connected peer; queues coalesce bursts of wants and cancels into a single
//! [`Message`] and hand it to the [`Network`] on their own task. Newly connected peers
//! receive a full snapshot of the want-list, everybody else receives deltas.
//!
//! Transport and storage are not part of this crate, they are consumed through the
//! [`Network`] and [`Blockstore`] traits.

mod bitswap_pb;
mod block;
mod blockstore;
mod error;
mod message;
mod network;
mod peer_queue;
mod prefix;
mod protocol;
mod stat;
mod want_manager;

use std::time::Duration;

pub use block::Block;
pub use blockstore::{Blockstore, MemBlockStore};
pub use error::{BitswapError, DecodeError};
pub use message::{Message, Priority, WantEntry};
pub use network::{Network, NetworkEvent, PeerFailure};
pub use prefix::Prefix;
pub use protocol::{read_message, write_message, ProtocolId, MAX_BUF_SIZE};
pub use stat::Stats;
pub use want_manager::WantManager;

pub use cid::Cid;
pub use libp2p_identity::PeerId;

pub type Result<T> = std::result::Result<T, BitswapError>;

/// Priority of the first block of a `want_blocks` batch.
pub const MAX_PRIORITY: Priority = i32::MAX;

#[derive(Debug, Clone)]
pub struct Config {
    /// Priority given to the first block of every `want_blocks` batch, the following blocks
    /// get decreasing priorities.
    pub max_priority: Priority,
    /// How long a peer queue waits after being woken up before it flushes, so that bursts
    /// of operations end up in one message.
    pub send_debounce: Duration,
    /// The time to wait before retrying after a failed send.
    pub send_error_backoff: Duration,
    /// Consecutive failed sends after which a queue stops retrying on its own. The pending
    /// content is kept and goes out with the next flush.
    pub max_retries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_priority: MAX_PRIORITY,
            send_debounce: Duration::from_millis(1),
            send_error_backoff: Duration::from_millis(100),
            max_retries: 3,
        }
    }
}
