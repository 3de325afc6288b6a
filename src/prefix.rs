use std::convert::TryFrom;

use cid::{self, Cid, Version};
use multihash::{Code, Multihash, MultihashDigest};
use unsigned_varint::{decode as varint_decode, encode as varint_encode};

use crate::error::DecodeError;

/// Multihash code of the identity hash: the digest is the data itself.
const IDENTITY: u64 = 0x00;

/// Prefix represents all metadata of a CID, without the actual content.
///
/// The 1.1.0 wire format pairs every block payload with its prefix, so the receiver can
/// rebuild the exact [`Cid`] by hashing the payload.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Prefix {
    /// The version of CID.
    pub version: Version,
    /// The codec of CID.
    pub codec: u64,
    /// The multihash code of CID.
    pub mh_type: u64,
    /// The multihash length of CID.
    pub mh_len: usize,
}

impl Prefix {
    /// Create a new prefix from encoded bytes.
    pub fn new(data: &[u8]) -> Result<Prefix, DecodeError> {
        let (raw_version, remain) = varint_decode::u64(data).map_err(cid::Error::from)?;
        let version = Version::try_from(raw_version)?;
        let (codec, remain) = varint_decode::u64(remain).map_err(cid::Error::from)?;
        let (mh_type, remain) = varint_decode::u64(remain).map_err(cid::Error::from)?;
        let (mh_len, _remain) = varint_decode::usize(remain).map_err(cid::Error::from)?;

        Ok(Prefix {
            version,
            codec,
            mh_type,
            mh_len,
        })
    }

    /// Convert the prefix to encoded bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut res = Vec::with_capacity(4);

        let mut buf = varint_encode::u64_buffer();
        res.extend_from_slice(varint_encode::u64(self.version.into(), &mut buf));
        let mut buf = varint_encode::u64_buffer();
        res.extend_from_slice(varint_encode::u64(self.codec, &mut buf));
        let mut buf = varint_encode::u64_buffer();
        res.extend_from_slice(varint_encode::u64(self.mh_type, &mut buf));
        let mut buf = varint_encode::u64_buffer();
        res.extend_from_slice(varint_encode::u64(self.mh_len as u64, &mut buf));

        res
    }

    /// Create a CID out of the prefix and some data that will be hashed.
    ///
    /// Inlined (identity) blocks carry their data as digest. For real hashes the digest is
    /// truncated to `mh_len`, which may not exceed the hash output.
    pub fn to_cid(&self, data: &[u8]) -> Result<Cid, DecodeError> {
        let mh = if self.mh_type == IDENTITY {
            if data.len() != self.mh_len {
                return Err(DecodeError::DigestLength {
                    expected: self.mh_len,
                    actual: data.len(),
                });
            }
            Multihash::wrap(IDENTITY, data)?
        } else {
            let hash = Code::try_from(self.mh_type)?.digest(data);
            let digest = hash.digest();
            if self.mh_len > digest.len() {
                return Err(DecodeError::DigestLength {
                    expected: self.mh_len,
                    actual: digest.len(),
                });
            }
            Multihash::wrap(self.mh_type, &digest[..self.mh_len])?
        };
        Ok(Cid::new(self.version, self.codec, mh)?)
    }
}

impl From<&Cid> for Prefix {
    fn from(cid: &Cid) -> Self {
        Self {
            version: cid.version(),
            codec: cid.codec(),
            mh_type: cid.hash().code(),
            mh_len: cid.hash().digest().len(),
        }
    }
}
