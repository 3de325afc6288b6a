use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cid::Cid;
use futures::{Stream, StreamExt};
use indexmap::IndexMap;
use libp2p_identity::PeerId;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::block::Block;
use crate::blockstore::Blockstore;
use crate::error::BitswapError;
use crate::message::{Message, Priority, WantEntry};
use crate::network::{Network, NetworkEvent, PeerFailure};
use crate::peer_queue::PeerQueue;
use crate::stat::Stats;
use crate::{Config, Result};

const FAILURE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
enum Lifecycle {
    Idle,
    /// Peer queues are spawned on the runtime `start` was called from.
    Running(Handle),
    Stopped,
}

#[derive(Debug)]
struct State {
    lifecycle: Lifecycle,
    /// The blocks we want, in the order they were first wanted.
    wantlist: IndexMap<Cid, WantEntry>,
    /// One outgoing queue per connected peer.
    peers: HashMap<PeerId, PeerQueue>,
    /// Statistics of the connected peers.
    stats: HashMap<PeerId, Arc<Stats>>,
    /// Statistics of disconnected peers and of blocks from peers we are not connected to.
    retired: Arc<Stats>,
}

impl State {
    fn ensure_running(&self) -> Result<&Handle> {
        match &self.lifecycle {
            Lifecycle::Running(runtime) => Ok(runtime),
            Lifecycle::Idle => Err(BitswapError::NotStarted),
            Lifecycle::Stopped => Err(BitswapError::Closing),
        }
    }

    fn remove_peer(&mut self, peer: &PeerId) -> bool {
        let removed = self.peers.remove(peer).is_some();
        if let Some(stats) = self.stats.remove(peer) {
            self.retired.add_assign(&stats);
        }
        removed
    }

    fn broadcast(&self, message: &Message) {
        for queue in self.peers.values() {
            queue.add_message(message.clone());
        }
    }

    fn snapshot(&self) -> Message {
        let mut message = Message::new(true);
        for entry in self.wantlist.values() {
            message.add_entry(entry.cid, entry.priority, false);
        }
        message
    }
}

/// Owns the local want-list and the outgoing queue of every connected peer.
///
/// All want-list mutations happen under one lock and are fanned out to the peer queues
/// before the lock is released, so concurrent callers never observe a half applied update
/// and every peer sees operations in the order they were issued.
///
/// The operations are synchronous and may be called from any thread. Peer queues run as
/// tasks on the tokio runtime [`WantManager::start`] was called from.
pub struct WantManager<N, B> {
    self_id: PeerId,
    network: Arc<N>,
    blockstore: B,
    config: Config,
    state: Mutex<State>,
    failures: broadcast::Sender<PeerFailure>,
}

impl<N, B> WantManager<N, B>
where
    N: Network,
    B: Blockstore,
{
    pub fn new(self_id: PeerId, network: Arc<N>, blockstore: B) -> Self {
        Self::with_config(self_id, network, blockstore, Config::default())
    }

    pub fn with_config(self_id: PeerId, network: Arc<N>, blockstore: B, config: Config) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        WantManager {
            self_id,
            network,
            blockstore,
            config,
            state: Mutex::new(State {
                lifecycle: Lifecycle::Idle,
                wantlist: Default::default(),
                peers: Default::default(),
                stats: Default::default(),
                retired: Default::default(),
            }),
            failures,
        }
    }

    pub fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    /// Starts accepting operations. Must be called exactly once, from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running(_) => return Err(BitswapError::AlreadyStarted),
            Lifecycle::Stopped => return Err(BitswapError::Closing),
        }

        let runtime = Handle::try_current().map_err(|_| BitswapError::NoRuntime)?;
        info!("starting want manager for {}", self.self_id);
        state.lifecycle = Lifecycle::Running(runtime);
        Ok(())
    }

    /// Stops accepting operations and shuts down every peer queue, dropping unsent content.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.lifecycle {
            Lifecycle::Idle => return Err(BitswapError::NotStarted),
            Lifecycle::Stopped => return Ok(()),
            Lifecycle::Running(_) => {}
        }

        info!("stopping want manager, {} peer queue(s)", state.peers.len());
        state.lifecycle = Lifecycle::Stopped;
        let peers: Vec<_> = state.peers.keys().copied().collect();
        for peer in &peers {
            state.remove_peer(peer);
        }
        Ok(())
    }

    /// Adds `cids` to the want-list and sends the change to all connected peers.
    ///
    /// The first cid of the batch gets `max_priority`, each following one a priority one
    /// lower. A cid already wanted with a higher priority is left alone.
    pub fn want_blocks(&self, cids: &[Cid]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ensure_running()?;

        let mut delta = Message::new(false);
        for (i, cid) in cids.iter().enumerate() {
            let priority = self.priority_at(i);
            let update = match state.wantlist.get(cid) {
                Some(entry) => entry.priority <= priority,
                None => true,
            };
            if update {
                state
                    .wantlist
                    .insert(*cid, WantEntry::new(*cid, priority, false));
                delta.add_entry(*cid, priority, false);
            }
        }

        debug!(
            "want {} block(s), {} changed, {} peer(s)",
            cids.len(),
            delta.wantlist_len(),
            state.peers.len()
        );
        state.broadcast(&delta);
        Ok(())
    }

    /// Removes `cids` from the want-list and sends cancels to all connected peers.
    ///
    /// Cids that are not wanted are cancelled all the same.
    pub fn cancel_wants(&self, cids: &[Cid]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ensure_running()?;

        let mut delta = Message::new(false);
        for cid in cids {
            state.wantlist.shift_remove(cid);
            delta.cancel(*cid);
        }

        debug!(
            "cancel {} block(s), {} peer(s)",
            cids.len(),
            state.peers.len()
        );
        state.broadcast(&delta);
        Ok(())
    }

    /// Registers a newly connected peer and sends it the complete want-list.
    pub fn connected(&self, peer: PeerId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let runtime = state.ensure_running()?.clone();

        if peer == self.self_id {
            trace!("ignoring connection to ourselves");
            return Ok(());
        }

        debug!("{} connected", peer);
        let snapshot = state.snapshot();
        let stats = state.stats.entry(peer).or_default().clone();
        let queue = state.peers.entry(peer).or_insert_with(|| {
            PeerQueue::new(
                peer,
                &runtime,
                self.network.clone(),
                self.config.clone(),
                stats,
                self.failures.clone(),
            )
        });
        queue.add_message(snapshot);
        Ok(())
    }

    /// Forgets a peer together with everything still queued for it. Unknown peers are ignored.
    pub fn disconnected(&self, peer: &PeerId) {
        let mut state = self.state.lock().unwrap();
        if state.remove_peer(peer) {
            debug!("{} disconnected", peer);
        } else {
            trace!("disconnect of unknown peer {}", peer);
        }
    }

    /// Queues the blocks found in the blockstore for `peer`, returns how many were queued.
    pub async fn send_blocks(&self, peer: &PeerId, cids: &[Cid]) -> Result<usize> {
        self.state.lock().unwrap().ensure_running()?;

        let mut message = Message::new(false);
        for cid in cids {
            match self.blockstore.get(cid).await {
                Ok(Some(block)) => message.add_block(block),
                Ok(None) => debug!("block {} not found in blockstore", cid),
                Err(err) => return Err(BitswapError::Blockstore(format!("{:#}", err))),
            }
        }

        let count = message.blocks_len();
        let state = self.state.lock().unwrap();
        match state.peers.get(peer) {
            Some(queue) => {
                debug!("queueing {} block(s) for {}", count, peer);
                queue.add_message(message);
                Ok(count)
            }
            None => {
                debug!("not sending {} block(s), {} is not connected", count, peer);
                Ok(0)
            }
        }
    }

    /// Applies one event of the network.
    pub async fn handle_event(&self, event: NetworkEvent) -> Result<()> {
        match event {
            NetworkEvent::PeerConnected(peer) => self.connected(peer),
            NetworkEvent::PeerDisconnected(peer) => {
                self.disconnected(&peer);
                Ok(())
            }
            NetworkEvent::MessageReceived(peer, message) => {
                self.handle_incoming_message(peer, message).await
            }
        }
    }

    /// Applies network events until the stream ends or the manager is stopped.
    pub async fn run<S>(&self, mut events: S) -> Result<()>
    where
        S: Stream<Item = NetworkEvent> + Unpin,
    {
        while let Some(event) = events.next().await {
            match self.handle_event(event).await {
                Ok(()) => {}
                Err(BitswapError::Closing) => break,
                Err(err) => warn!("failed to handle network event: {}", err),
            }
        }
        debug!("network event stream closed");
        Ok(())
    }

    async fn handle_incoming_message(&self, source: PeerId, mut message: Message) -> Result<()> {
        self.state.lock().unwrap().ensure_running()?;
        trace!(
            "incoming message from {}: entries={} blocks={}",
            source,
            message.wantlist_len(),
            message.blocks_len()
        );

        let blocks = message.take_blocks();
        if blocks.is_empty() {
            return Ok(());
        }
        self.handle_received_blocks(source, blocks).await
    }

    async fn handle_received_blocks(&self, source: PeerId, blocks: Vec<Block>) -> Result<()> {
        debug!("received {} block(s) from {}", blocks.len(), source);
        let peer_stats = {
            let state = self.state.lock().unwrap();
            match state.stats.get(&source) {
                Some(stats) => stats.clone(),
                None => state.retired.clone(),
            }
        };

        let mut received = Vec::with_capacity(blocks.len());
        for block in blocks {
            let cid = *block.cid();
            let bytes = block.data().len() as u64;
            match self.blockstore.put(block).await {
                Ok(true) => peer_stats.update_incoming_unique(bytes),
                Ok(false) => peer_stats.update_incoming_duplicate(bytes),
                Err(err) => {
                    info!("got block {} from {} but failed to store it: {:#}", cid, source, err);
                    continue;
                }
            }
            received.push(cid);
        }

        let wanted: Vec<Cid> = {
            let state = self.state.lock().unwrap();
            received
                .into_iter()
                .filter(|cid| state.wantlist.contains_key(cid))
                .collect()
        };
        if wanted.is_empty() {
            return Ok(());
        }
        self.cancel_wants(&wanted)
    }

    /// Returns the local want-list, highest priority first.
    pub fn wantlist(&self) -> Vec<WantEntry> {
        let state = self.state.lock().unwrap();
        let mut entries: Vec<_> = state.wantlist.values().cloned().collect();
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        entries
    }

    /// Returns the connected peers.
    pub fn peers(&self) -> Vec<PeerId> {
        self.state.lock().unwrap().peers.keys().copied().collect()
    }

    /// Returns the statistics summed over all peers seen so far.
    pub fn stats(&self) -> Stats {
        let state = self.state.lock().unwrap();
        let total = Stats::default();
        total.add_assign(&state.retired);
        state.stats.values().fold(total, |acc, peer_stats| {
            acc.add_assign(peer_stats);
            acc
        })
    }

    /// Subscribes to reports of failed sends.
    pub fn failures(&self) -> broadcast::Receiver<PeerFailure> {
        self.failures.subscribe()
    }

    fn priority_at(&self, index: usize) -> Priority {
        let offset = Priority::try_from(index).unwrap_or(Priority::MAX);
        self.config.max_priority.saturating_sub(offset)
    }
}
