use cid::Cid;
use multihash::{Code, MultihashDigest};

/// Multicodec of raw binary blocks.
pub const RAW: u64 = 0x55;

/// A block consisting of a [`Cid`] and the bytes of the block.
///
/// Equality compares both the [`Cid`] and the payload, so two blocks carried in different
/// messages are only equal when they would hash to the same identifier and hold the same bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// The content identifier for this block
    pub cid: Cid,
    /// The data of this block
    pub data: Box<[u8]>,
}

impl Block {
    pub fn new(data: Box<[u8]>, cid: Cid) -> Self {
        Self { cid, data }
    }

    /// Creates a raw CIDv1 block, hashing `data` with sha2-256.
    pub fn from_data<D: Into<Box<[u8]>>>(data: D) -> Self {
        let data = data.into();
        let cid = Cid::new_v1(RAW, Code::Sha2_256.digest(&data));
        Self { cid, data }
    }

    /// Creates a CIDv0 block, as implied by the legacy `blocks` field of the wire format.
    pub fn from_v0_data<D: Into<Box<[u8]>>>(data: D) -> Result<Self, cid::Error> {
        let data = data.into();
        let cid = Cid::new_v0(Code::Sha2_256.digest(&data))?;
        Ok(Self { cid, data })
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
