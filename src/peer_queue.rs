use std::sync::{Arc, Mutex};

use libp2p_identity::PeerId;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::message::Message;
use crate::network::{Network, PeerFailure};
use crate::stat::Stats;
use crate::Config;

/// Outgoing mailbox of a single connected peer.
///
/// Updates are folded into one pending [`Message`] and a dedicated task flushes it to the
/// [`Network`]. At most one send per peer is in flight; whatever arrives meanwhile waits for
/// the next flush. A failed send drops the connection state, so the next attempt dials the
/// peer again. Dropping the queue aborts the task together with any in-flight send.
#[derive(Debug)]
pub(crate) struct PeerQueue {
    peer: PeerId,
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Shared {
    pending: Mutex<Message>,
    work: Notify,
}

impl Shared {
    fn take_pending(&self) -> Message {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }

    /// Puts back content that could not be delivered, underneath anything queued since.
    fn restore(&self, unsent: Message) {
        let mut pending = self.pending.lock().unwrap();
        let newer = std::mem::replace(&mut *pending, unsent);
        pending.merge(newer);
    }
}

impl PeerQueue {
    pub(crate) fn new<N: Network>(
        peer: PeerId,
        runtime: &Handle,
        network: Arc<N>,
        config: Config,
        stats: Arc<Stats>,
        failures: broadcast::Sender<PeerFailure>,
    ) -> Self {
        let shared = Arc::new(Shared::default());
        let worker = QueueWorker {
            peer,
            shared: shared.clone(),
            network,
            config,
            stats,
            failures,
        };
        let worker = runtime.spawn(async move { worker.run().await });

        PeerQueue {
            peer,
            shared,
            worker,
        }
    }

    /// Folds `message` into the pending message and schedules a flush.
    pub(crate) fn add_message(&self, message: Message) {
        if message.is_empty() {
            return;
        }
        self.shared.pending.lock().unwrap().merge(message);
        self.shared.work.notify_one();
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> Message {
        self.shared.pending.lock().unwrap().clone()
    }
}

impl Drop for PeerQueue {
    fn drop(&mut self) {
        debug!("{}: shutting down peer queue", self.peer);
        self.worker.abort();
    }
}

struct QueueWorker<N> {
    peer: PeerId,
    shared: Arc<Shared>,
    network: Arc<N>,
    config: Config,
    stats: Arc<Stats>,
    failures: broadcast::Sender<PeerFailure>,
}

impl<N: Network> QueueWorker<N> {
    async fn run(self) {
        let mut connected = false;
        let mut failed_attempts = 0;

        loop {
            self.shared.work.notified().await;
            if !self.config.send_debounce.is_zero() {
                tokio::time::sleep(self.config.send_debounce).await;
            }

            let message = self.shared.take_pending();
            if message.is_empty() {
                continue;
            }

            let res = if connected {
                self.send(&message).await
            } else {
                match self.network.connect_to(self.peer).await {
                    Ok(()) => {
                        connected = true;
                        self.send(&message).await
                    }
                    Err(err) => Err(err),
                }
            };

            match res {
                Ok(()) => {
                    failed_attempts = 0;
                    self.stats.update_outgoing(&message);
                }
                Err(err) => {
                    connected = false;
                    failed_attempts += 1;
                    warn!(
                        "{}: failed to send message (attempt {}): {:#}",
                        self.peer, failed_attempts, err
                    );
                    self.stats.update_failure();
                    self.shared.restore(message);
                    // nobody listening is fine
                    let _ = self.failures.send(PeerFailure {
                        peer: self.peer,
                        reason: format!("{:#}", err),
                    });

                    if failed_attempts < self.config.max_retries {
                        tokio::time::sleep(self.config.send_error_backoff).await;
                        self.shared.work.notify_one();
                    } else {
                        debug!(
                            "{}: giving up retrying, keeping content for the next flush",
                            self.peer
                        );
                        failed_attempts = 0;
                    }
                }
            }
        }
    }

    async fn send(&self, message: &Message) -> anyhow::Result<()> {
        trace!(
            "{}: sending message full={} entries={} blocks={}",
            self.peer,
            message.full(),
            message.wantlist_len(),
            message.blocks_len()
        );
        self.network.send_message(self.peer, message).await
    }
}
