//! Framing of bitswap messages on a stream: every message is a protobuf prefixed with its
//! unsigned-varint length.

use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;
use unsigned_varint::{decode as varint_decode, encode as varint_encode};

use crate::error::BitswapError;
use crate::message::Message;
use crate::Result;

/// Maximum size of a single frame.
pub const MAX_BUF_SIZE: usize = 1024 * 1024 * 2;

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum ProtocolId {
    Bitswap100,
    Bitswap110,
}

impl ProtocolId {
    pub fn protocol_name(&self) -> &'static str {
        match self {
            ProtocolId::Bitswap100 => "/ipfs/bitswap/1.0.0",
            ProtocolId::Bitswap110 => "/ipfs/bitswap/1.1.0",
        }
    }

    /// Encodes `message` the way peers speaking this protocol expect it.
    pub fn encode(&self, message: &Message) -> Vec<u8> {
        match self {
            ProtocolId::Bitswap100 => message.to_bytes_v0(),
            ProtocolId::Bitswap110 => message.to_bytes(),
        }
    }
}

/// Writes one length-prefixed message.
pub async fn write_message<W>(
    writer: &mut W,
    protocol: ProtocolId,
    message: &Message,
    max_size: usize,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let packet = protocol.encode(message);
    if packet.len() > max_size {
        return Err(BitswapError::MessageTooLarge(packet.len()));
    }

    let mut buf = varint_encode::usize_buffer();
    writer
        .write_all(varint_encode::usize(packet.len(), &mut buf))
        .await?;
    writer.write_all(&packet).await?;
    writer.flush().await?;
    trace!(
        "wrote {} message of {} bytes",
        protocol.protocol_name(),
        packet.len()
    );
    Ok(())
}

/// Reads one length-prefixed message.
pub async fn read_message<R>(reader: &mut R, max_size: usize) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let len = read_length(reader).await?;
    if len > max_size {
        return Err(BitswapError::MessageTooLarge(len));
    }

    let mut packet = vec![0u8; len];
    reader.read_exact(&mut packet).await?;
    trace!("read message of {} bytes", len);
    Message::from_bytes(&packet)
}

async fn read_length<R>(reader: &mut R) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut buf = varint_encode::usize_buffer();
    for i in 0..buf.len() {
        reader.read_exact(&mut buf[i..=i]).await?;
        if varint_decode::is_last(buf[i]) {
            let (len, _) = varint_decode::usize(&buf[..=i]).map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
            })?;
            return Ok(len);
        }
    }
    Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "length prefix overflow").into())
}

#[cfg(test)]
mod tests {
    use futures::io::Cursor;

    use super::*;
    use crate::block::Block;

    fn sample() -> Message {
        let block = Block::from_data(b"framed".to_vec());
        let mut m = Message::new(false);
        m.add_entry(*Block::from_data(b"wanted".to_vec()).cid(), 7, false);
        m.add_block(block);
        m
    }

    #[tokio::test]
    async fn frames_round_trip() {
        let first = sample();
        let mut second = Message::new(true);
        second.cancel(*Block::from_data(b"gone".to_vec()).cid());

        let mut stream = Cursor::new(Vec::new());
        write_message(&mut stream, ProtocolId::Bitswap110, &first, MAX_BUF_SIZE)
            .await
            .unwrap();
        write_message(&mut stream, ProtocolId::Bitswap110, &second, MAX_BUF_SIZE)
            .await
            .unwrap();

        stream.set_position(0);
        assert_eq!(read_message(&mut stream, MAX_BUF_SIZE).await.unwrap(), first);
        assert_eq!(read_message(&mut stream, MAX_BUF_SIZE).await.unwrap(), second);
    }

    #[tokio::test]
    async fn legacy_protocol_round_trips_v0_blocks() {
        let mut m = Message::new(false);
        m.add_block(Block::from_v0_data(b"old peer".to_vec()).unwrap());

        let mut stream = Cursor::new(Vec::new());
        write_message(&mut stream, ProtocolId::Bitswap100, &m, MAX_BUF_SIZE)
            .await
            .unwrap();
        stream.set_position(0);
        assert_eq!(read_message(&mut stream, MAX_BUF_SIZE).await.unwrap(), m);
    }

    #[test]
    fn protocol_names() {
        assert_eq!(ProtocolId::Bitswap100.protocol_name(), "/ipfs/bitswap/1.0.0");
        assert_eq!(ProtocolId::Bitswap110.protocol_name(), "/ipfs/bitswap/1.1.0");
    }

    #[tokio::test]
    async fn oversized_frames_are_rejected() {
        let m = sample();
        let mut stream = Cursor::new(Vec::new());
        let res = write_message(&mut stream, ProtocolId::Bitswap110, &m, 4).await;
        assert!(matches!(res, Err(BitswapError::MessageTooLarge(_))));

        write_message(&mut stream, ProtocolId::Bitswap110, &m, MAX_BUF_SIZE)
            .await
            .unwrap();
        stream.set_position(0);
        let res = read_message(&mut stream, 4).await;
        assert!(matches!(res, Err(BitswapError::MessageTooLarge(_))));
    }

    #[tokio::test]
    async fn truncated_frame_is_an_io_error() {
        let m = sample();
        let mut stream = Cursor::new(Vec::new());
        write_message(&mut stream, ProtocolId::Bitswap110, &m, MAX_BUF_SIZE)
            .await
            .unwrap();

        let mut bytes = stream.into_inner();
        bytes.truncate(bytes.len() - 3);
        let res = read_message(&mut Cursor::new(bytes), MAX_BUF_SIZE).await;
        assert!(matches!(res, Err(BitswapError::Io(_))));
    }

    #[tokio::test]
    async fn garbage_frame_is_malformed() {
        let mut bytes = vec![3u8];
        bytes.extend_from_slice(&[0xff, 0xff, 0xff]);
        let res = read_message(&mut Cursor::new(bytes), MAX_BUF_SIZE).await;
        assert!(matches!(res, Err(BitswapError::MalformedMessage(_))));
    }
}
