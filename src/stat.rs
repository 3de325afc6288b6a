use std::sync::atomic::{AtomicU64, Ordering};

use crate::message::Message;

/// Bitswap statistics.
#[derive(Debug, Default)]
pub struct Stats {
    pub sent_messages: AtomicU64,
    pub sent_entries: AtomicU64,
    pub sent_blocks: AtomicU64,
    pub sent_data: AtomicU64,
    pub send_failures: AtomicU64,
    pub received_blocks: AtomicU64,
    pub received_data: AtomicU64,
    pub duplicate_blocks: AtomicU64,
    pub duplicate_data: AtomicU64,
}

impl Stats {
    pub fn update_outgoing(&self, message: &Message) {
        self.sent_messages.fetch_add(1, Ordering::Relaxed);
        self.sent_entries
            .fetch_add(message.wantlist_len() as u64, Ordering::Relaxed);
        self.sent_blocks
            .fetch_add(message.blocks_len() as u64, Ordering::Relaxed);
        self.sent_data
            .fetch_add(message.blocks_bytes() as u64, Ordering::Relaxed);
    }

    pub fn update_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_incoming_unique(&self, bytes: u64) {
        self.received_blocks.fetch_add(1, Ordering::Relaxed);
        self.received_data.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn update_incoming_duplicate(&self, bytes: u64) {
        self.duplicate_blocks.fetch_add(1, Ordering::Relaxed);
        self.duplicate_data.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_assign(&self, other: &Stats) {
        let pairs = [
            (&self.sent_messages, &other.sent_messages),
            (&self.sent_entries, &other.sent_entries),
            (&self.sent_blocks, &other.sent_blocks),
            (&self.sent_data, &other.sent_data),
            (&self.send_failures, &other.send_failures),
            (&self.received_blocks, &other.received_blocks),
            (&self.received_data, &other.received_data),
            (&self.duplicate_blocks, &other.duplicate_blocks),
            (&self.duplicate_data, &other.duplicate_data),
        ];
        for (this, that) in pairs {
            this.fetch_add(that.load(Ordering::Relaxed), Ordering::Relaxed);
        }
    }
}
