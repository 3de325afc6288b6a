use std::convert::TryFrom;
use std::fmt;

use cid::Cid;
use indexmap::IndexMap;
use prost::Message as ProstMessage;

use crate::bitswap_pb as pb;
use crate::block::Block;
use crate::error::{BitswapError, DecodeError};
use crate::prefix::Prefix;

/// Priority of a wanted block, higher is more urgent.
pub type Priority = i32;

/// A single want-list record.
///
/// A cancel is carried as an entry with `cancel` set, so the wire format never needs a
/// separate message type to withdraw a want.
#[derive(Clone, PartialEq, Eq)]
pub struct WantEntry {
    pub cid: Cid,
    pub priority: Priority,
    pub cancel: bool,
}

impl fmt::Debug for WantEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WantEntry")
            .field("cid", &self.cid.to_string())
            .field("priority", &self.priority)
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl WantEntry {
    pub fn new(cid: Cid, priority: Priority, cancel: bool) -> Self {
        WantEntry {
            cid,
            priority,
            cancel,
        }
    }
}

impl From<&WantEntry> for pb::message::wantlist::Entry {
    fn from(e: &WantEntry) -> Self {
        pb::message::wantlist::Entry {
            block: e.cid.to_bytes(),
            priority: e.priority,
            cancel: e.cancel,
        }
    }
}

/// A bitswap message: a want-list delta (or full snapshot) plus blocks to deliver.
///
/// Entries and blocks keep their insertion order so the encoded bytes are deterministic,
/// but equality ignores order.
#[derive(Default, Clone)]
pub struct Message {
    full: bool,
    wantlist: IndexMap<Cid, WantEntry>,
    blocks: IndexMap<Cid, Block>,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("full", &self.full)
            .field("wantlist", &self.wantlist.values().collect::<Vec<_>>())
            .field(
                "blocks",
                &self
                    .blocks
                    .keys()
                    .map(|cid| cid.to_string())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.full == other.full
            && self.wantlist.len() == other.wantlist.len()
            && self.blocks.len() == other.blocks.len()
            && self
                .wantlist
                .iter()
                .all(|(cid, entry)| other.wantlist.get(cid) == Some(entry))
            && self
                .blocks
                .iter()
                .all(|(cid, block)| other.blocks.get(cid).map(Block::data) == Some(block.data()))
    }
}

impl Eq for Message {}

impl Message {
    pub fn new(full: bool) -> Self {
        Message {
            full,
            ..Default::default()
        }
    }

    /// Whether this message is the complete, authoritative want-list of the sender.
    pub fn full(&self) -> bool {
        self.full
    }

    pub fn is_empty(&self) -> bool {
        self.wantlist.is_empty() && self.blocks.is_empty()
    }

    pub fn wantlist(&self) -> impl Iterator<Item = &WantEntry> {
        self.wantlist.values()
    }

    pub fn wantlist_len(&self) -> usize {
        self.wantlist.len()
    }

    pub fn entry(&self, cid: &Cid) -> Option<&WantEntry> {
        self.wantlist.get(cid)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn blocks_len(&self) -> usize {
        self.blocks.len()
    }

    /// Total payload size of the blocks in this message.
    pub fn blocks_bytes(&self) -> usize {
        self.blocks.values().map(|b| b.data.len()).sum()
    }

    pub fn take_blocks(&mut self) -> Vec<Block> {
        self.blocks.drain(..).map(|(_, block)| block).collect()
    }

    /// Inserts or replaces the entry for `cid`.
    pub fn add_entry(&mut self, cid: Cid, priority: Priority, cancel: bool) {
        match self.wantlist.get_mut(&cid) {
            Some(entry) => {
                entry.priority = priority;
                entry.cancel = cancel;
            }
            None => {
                self.wantlist
                    .insert(cid, WantEntry::new(cid, priority, cancel));
            }
        }
    }

    /// Replaces any entry for `cid` with a cancel.
    pub fn cancel(&mut self, cid: Cid) {
        self.wantlist.shift_remove(&cid);
        self.add_entry(cid, 0, true);
    }

    pub fn add_block(&mut self, block: Block) {
        self.blocks.insert(block.cid, block);
    }

    /// Folds a newer message into this one, the newer content winning per cid.
    ///
    /// A newer full snapshot replaces the want-list. Cancels folded into a full snapshot drop
    /// the cid from the snapshot instead of carrying a cancel entry.
    pub fn merge(&mut self, newer: Message) {
        if newer.full {
            self.full = true;
            self.wantlist = newer.wantlist;
        } else {
            for (cid, entry) in newer.wantlist {
                if entry.cancel {
                    if self.full {
                        self.wantlist.shift_remove(&cid);
                    } else {
                        self.cancel(cid);
                    }
                } else {
                    self.add_entry(cid, entry.priority, false);
                }
            }
        }
        self.blocks.extend(newer.blocks);
    }

    fn wantlist_proto(&self) -> pb::message::Wantlist {
        pb::message::Wantlist {
            entries: self.wantlist.values().map(Into::into).collect(),
            full: self.full,
        }
    }

    /// Encodes with the 1.0.0 layout: blocks as bare payloads.
    pub(crate) fn encode_as_proto_v0(&self) -> pb::Message {
        pb::Message {
            wantlist: Some(self.wantlist_proto()),
            blocks: self.blocks.values().map(|b| b.data.to_vec()).collect(),
            payload: Vec::new(),
        }
    }

    /// Encodes with the 1.1.0 layout: every payload travels with its cid prefix.
    pub(crate) fn encode_as_proto_v1(&self) -> pb::Message {
        pb::Message {
            wantlist: Some(self.wantlist_proto()),
            blocks: Vec::new(),
            payload: self
                .blocks
                .values()
                .map(|b| pb::message::Block {
                    prefix: Prefix::from(b.cid()).to_bytes(),
                    data: b.data.to_vec(),
                })
                .collect(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_as_proto_v1().encode_to_vec()
    }

    /// Encoding for `/ipfs/bitswap/1.0.0` peers; only CIDv0 blocks survive the round trip.
    pub fn to_bytes_v0(&self) -> Vec<u8> {
        self.encode_as_proto_v0().encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BitswapError> {
        let pbm = pb::Message::decode(bytes)?;
        Ok(Message::try_from(pbm)?)
    }
}

impl TryFrom<pb::Message> for Message {
    type Error = DecodeError;

    fn try_from(pbm: pb::Message) -> Result<Self, Self::Error> {
        let full = pbm.wantlist.as_ref().map(|w| w.full).unwrap_or_default();
        let mut message = Message::new(full);

        if let Some(wantlist) = pbm.wantlist {
            for entry in wantlist.entries {
                let cid = Cid::try_from(entry.block)?;
                message.add_entry(cid, entry.priority, entry.cancel);
            }
        }

        // 1.0.0 peers send bare payloads, which are always CIDv0
        for data in pbm.blocks {
            message.add_block(Block::from_v0_data(data)?);
        }

        for block in pbm.payload {
            let prefix = Prefix::new(&block.prefix)?;
            let cid = prefix.to_cid(&block.data)?;
            message.add_block(Block::new(block.data.into_boxed_slice(), cid));
        }

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_PRIORITY;

    fn cid(data: &str) -> Cid {
        *Block::from_data(data.as_bytes().to_vec()).cid()
    }

    #[test]
    fn add_entry_replaces_in_place() {
        let mut m = Message::new(false);
        m.add_entry(cid("a"), 10, false);
        m.add_entry(cid("a"), 20, false);
        m.add_entry(cid("a"), 20, false);

        assert_eq!(m.wantlist_len(), 1);
        assert_eq!(m.entry(&cid("a")).unwrap().priority, 20);
    }

    #[test]
    fn cancel_twice_leaves_one_cancel_entry() {
        let mut m = Message::new(false);
        m.add_entry(cid("a"), MAX_PRIORITY, false);
        m.cancel(cid("a"));
        m.cancel(cid("a"));

        assert_eq!(m.wantlist_len(), 1);
        assert_eq!(
            m.entry(&cid("a")),
            Some(&WantEntry::new(cid("a"), 0, true))
        );
    }

    #[test]
    fn add_block_last_write_wins() {
        let block = Block::from_data(b"payload".to_vec());
        let mut m = Message::new(false);
        m.add_block(block.clone());
        m.add_block(block.clone());

        assert_eq!(m.blocks_len(), 1);
        assert!(!m.is_empty());
        assert!(Message::new(true).is_empty());
    }

    #[test]
    fn equality_ignores_order() {
        let b1 = Block::from_data(b"one".to_vec());
        let b2 = Block::from_data(b"two".to_vec());

        let mut m1 = Message::new(true);
        m1.add_entry(cid("a"), 2, false);
        m1.add_entry(cid("b"), 1, false);
        m1.add_block(b1.clone());
        m1.add_block(b2.clone());

        let mut m2 = Message::new(true);
        m2.add_block(b2);
        m2.add_block(b1);
        m2.add_entry(cid("b"), 1, false);
        m2.add_entry(cid("a"), 2, false);

        assert_eq!(m1, m2);

        m2.add_entry(cid("b"), 3, false);
        assert_ne!(m1, m2);

        let mut m3 = m1.clone();
        m3.full = false;
        assert_ne!(m1, m3);
    }

    #[test]
    fn round_trip() {
        let mut m = Message::new(true);
        m.add_entry(cid("a"), MAX_PRIORITY, false);
        m.add_entry(cid("b"), MAX_PRIORITY - 1, false);
        m.cancel(cid("c"));
        m.add_block(Block::from_data(b"block".to_vec()));

        let decoded = Message::from_bytes(&m.to_bytes()).unwrap();
        assert_eq!(decoded, m);
        assert!(decoded.full());
    }

    #[test]
    fn round_trip_legacy_blocks() {
        let block = Block::from_v0_data(b"v0 block".to_vec()).unwrap();
        let mut m = Message::new(false);
        m.add_block(block);

        let bytes = m.to_bytes_v0();
        assert_eq!(Message::from_bytes(&bytes).unwrap(), m);
    }

    #[test]
    fn round_trip_inlined_and_v0_blocks() {
        let inlined = Cid::new_v1(0x55, multihash::Multihash::wrap(0x00, b"tiny").unwrap());
        let mut m = Message::new(false);
        m.add_entry(inlined, 3, false);
        m.add_block(Block::new(b"tiny".to_vec().into_boxed_slice(), inlined));
        m.add_block(Block::from_v0_data(b"v0 block over 1.1.0".to_vec()).unwrap());

        let decoded = Message::from_bytes(&m.to_bytes()).unwrap();
        assert_eq!(decoded, m);
        assert!(decoded.blocks().any(|b| b.cid() == &inlined));
    }

    #[test]
    fn encoding_is_deterministic() {
        let mut m = Message::new(false);
        for i in 0..16 {
            m.add_entry(cid(&i.to_string()), i, false);
        }
        assert_eq!(m.to_bytes(), m.clone().to_bytes());
    }

    #[test]
    fn garbage_is_malformed() {
        let res = Message::from_bytes(&[0xff, 0xff, 0xff]);
        assert!(matches!(res, Err(BitswapError::MalformedMessage(_))));
    }

    #[test]
    fn invalid_cid_is_malformed() {
        let pbm = pb::Message {
            wantlist: Some(pb::message::Wantlist {
                entries: vec![pb::message::wantlist::Entry {
                    block: vec![0x01, 0x02],
                    priority: 1,
                    cancel: false,
                }],
                full: false,
            }),
            blocks: Vec::new(),
            payload: Vec::new(),
        };
        let res = Message::from_bytes(&pbm.encode_to_vec());
        assert!(matches!(
            res,
            Err(BitswapError::MalformedMessage(DecodeError::Cid(_)))
        ));
    }

    #[test]
    fn merge_is_last_writer_wins() {
        let mut pending = Message::new(false);
        pending.add_entry(cid("a"), 5, false);

        let mut cancel = Message::new(false);
        cancel.cancel(cid("a"));
        pending.merge(cancel);

        assert_eq!(pending.wantlist_len(), 1);
        assert!(pending.entry(&cid("a")).unwrap().cancel);

        let mut want = Message::new(false);
        want.add_entry(cid("a"), 7, false);
        pending.merge(want);
        assert_eq!(
            pending.entry(&cid("a")),
            Some(&WantEntry::new(cid("a"), 7, false))
        );
    }

    #[test]
    fn merge_into_full_snapshot_stays_full() {
        let mut snapshot = Message::new(true);
        snapshot.add_entry(cid("a"), 2, false);
        snapshot.add_entry(cid("b"), 1, false);

        let mut delta = Message::new(false);
        delta.cancel(cid("b"));
        delta.add_entry(cid("c"), 9, false);
        snapshot.merge(delta);

        let mut expected = Message::new(true);
        expected.add_entry(cid("a"), 2, false);
        expected.add_entry(cid("c"), 9, false);
        assert_eq!(snapshot, expected);
    }

    #[test]
    fn newer_snapshot_replaces_wantlist() {
        let mut pending = Message::new(false);
        pending.cancel(cid("a"));
        pending.add_block(Block::from_data(b"kept".to_vec()));

        let mut snapshot = Message::new(true);
        snapshot.add_entry(cid("b"), 1, false);
        pending.merge(snapshot);

        assert!(pending.full());
        assert_eq!(pending.wantlist_len(), 1);
        assert!(pending.entry(&cid("b")).is_some());
        assert_eq!(pending.blocks_len(), 1);
    }
}
