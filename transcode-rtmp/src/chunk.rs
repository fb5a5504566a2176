//! RTMP chunk stream framing.
//!
//! Messages are split into chunks of at most `chunk_size` bytes, each
//! prefixed by a basic header (format + chunk stream ID) and a message
//! header whose size depends on the format:
//!
//! | fmt | header | carries |
//! |-----|--------|---------|
//! | 0 | 11 bytes | timestamp, length, type, message stream ID |
//! | 1 | 7 bytes | timestamp delta, length, type |
//! | 2 | 3 bytes | timestamp delta |
//! | 3 | 0 bytes | nothing, continuation or repeat |

use crate::error::{Result, RtmpError};
use crate::message::RawMessage;
use bytes::{Buf, BufMut, BytesMut};
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Chunk size before any SetChunkSize.
pub const DEFAULT_CHUNK_SIZE: u32 = 128;
/// Largest chunk size accepted from a peer.
pub const MAX_CHUNK_SIZE: u32 = 0x7FFF_FFFF;

const EXTENDED_TIMESTAMP: u32 = 0xFF_FFFF;
const MAX_MESSAGE_SIZE: usize = 0xFF_FFFF;

#[derive(Debug, Clone, Default)]
struct ChunkStreamState {
    timestamp: u32,
    delta: u32,
    length: usize,
    type_id: u8,
    message_stream_id: u32,
    extended: bool,
    initialized: bool,
    partial: Option<BytesMut>,
}

enum Parsed {
    NeedMore,
    Chunk,
    Message(RawMessage),
}

/// Reassembles messages from chunks.
#[derive(Debug)]
pub struct ChunkReader<R> {
    reader: R,
    buf: BytesMut,
    chunk_size: u32,
    streams: HashMap<u32, ChunkStreamState>,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Wrap a byte stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(64 * 1024),
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
            bytes_read: 0,
        }
    }

    /// Total bytes consumed from the underlying stream.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Apply a chunk size announced by the peer.
    pub fn set_chunk_size(&mut self, size: u32) -> Result<()> {
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(RtmpError::Protocol(format!("invalid chunk size {}", size)));
        }
        self.chunk_size = size;
        Ok(())
    }

    /// Drop a partially received message.
    pub fn abort(&mut self, chunk_stream_id: u32) {
        if let Some(state) = self.streams.get_mut(&chunk_stream_id) {
            state.partial = None;
        }
    }

    /// Read the next complete message.
    pub async fn read(&mut self) -> Result<RawMessage> {
        loop {
            match self.try_parse()? {
                Parsed::Message(msg) => return Ok(msg),
                Parsed::Chunk => continue,
                Parsed::NeedMore => {}
            }

            let n = self.reader.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(RtmpError::ConnectionClosed);
            }
            self.bytes_read += n as u64;
        }
    }

    fn try_parse(&mut self) -> Result<Parsed> {
        let data = &self.buf[..];
        if data.is_empty() {
            return Ok(Parsed::NeedMore);
        }

        let fmt = data[0] >> 6;
        let (chunk_stream_id, mut pos) = match data[0] & 0x3F {
            0 => {
                if data.len() < 2 {
                    return Ok(Parsed::NeedMore);
                }
                (data[1] as u32 + 64, 2)
            }
            1 => {
                if data.len() < 3 {
                    return Ok(Parsed::NeedMore);
                }
                (((data[2] as u32) << 8 | data[1] as u32) + 64, 3)
            }
            id => (id as u32, 1),
        };

        let header_len = match fmt {
            0 => 11,
            1 => 7,
            2 => 3,
            _ => 0,
        };
        if data.len() < pos + header_len {
            return Ok(Parsed::NeedMore);
        }

        let mut state = match self.streams.get(&chunk_stream_id) {
            Some(s) => s.clone(),
            None if fmt == 0 => ChunkStreamState::default(),
            None => {
                return Err(RtmpError::Protocol(format!(
                    "fmt {} chunk on chunk stream {} without previous header",
                    fmt, chunk_stream_id
                )))
            }
        };
        if fmt != 0 && !state.initialized {
            return Err(RtmpError::Protocol(format!(
                "fmt {} chunk on chunk stream {} without previous header",
                fmt, chunk_stream_id
            )));
        }

        let h = &data[pos..pos + header_len];
        let u24 = |b: &[u8]| (b[0] as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32;

        let ts_field = if fmt < 3 { Some(u24(h)) } else { None };
        if fmt <= 1 {
            if state.partial.is_some() {
                return Err(RtmpError::Protocol(format!(
                    "new message header on chunk stream {} while a message is incomplete",
                    chunk_stream_id
                )));
            }
            state.length = u24(&h[3..]) as usize;
            state.type_id = h[6];
        }
        if fmt == 0 {
            state.message_stream_id = u32::from_be_bytes([h[7], h[8], h[9], h[10]]);
        }
        if fmt == 2 && state.partial.is_some() {
            return Err(RtmpError::Protocol(format!(
                "new message header on chunk stream {} while a message is incomplete",
                chunk_stream_id
            )));
        }
        pos += header_len;

        if let Some(field) = ts_field {
            state.extended = field == EXTENDED_TIMESTAMP;
        }
        let mut ts_value = ts_field.unwrap_or(state.delta);
        if state.extended {
            if data.len() < pos + 4 {
                return Ok(Parsed::NeedMore);
            }
            let ext = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
            pos += 4;
            if ts_field.is_some() || state.partial.is_none() {
                ts_value = ext;
            }
        }

        let starting = state.partial.is_none();
        if starting {
            match fmt {
                0 => {
                    state.timestamp = ts_value;
                    state.delta = 0;
                }
                1 | 2 => {
                    state.delta = ts_value;
                    state.timestamp = state.timestamp.wrapping_add(ts_value);
                }
                // repeat of the previous message: same delta
                _ => state.timestamp = state.timestamp.wrapping_add(state.delta),
            }
        }

        if state.length > MAX_MESSAGE_SIZE {
            return Err(RtmpError::Protocol(format!(
                "message length {} too big",
                state.length
            )));
        }

        let received = state.partial.as_ref().map_or(0, |p| p.len());
        let chunk_len = (state.length - received).min(self.chunk_size as usize);
        if data.len() < pos + chunk_len {
            return Ok(Parsed::NeedMore);
        }

        self.buf.advance(pos);
        let chunk = self.buf.split_to(chunk_len);

        let mut partial = state
            .partial
            .take()
            .unwrap_or_else(|| BytesMut::with_capacity(state.length));
        partial.extend_from_slice(&chunk);
        state.initialized = true;

        if partial.len() < state.length {
            state.partial = Some(partial);
            self.streams.insert(chunk_stream_id, state);
            return Ok(Parsed::Chunk);
        }

        let msg = RawMessage {
            chunk_stream_id,
            timestamp: state.timestamp,
            type_id: state.type_id,
            message_stream_id: state.message_stream_id,
            body: partial.freeze(),
        };
        self.streams.insert(chunk_stream_id, state);
        Ok(Parsed::Message(msg))
    }
}

/// Splits messages into chunks.
#[derive(Debug)]
pub struct ChunkWriter<W> {
    writer: W,
    chunk_size: u32,
}

fn put_basic_header(buf: &mut BytesMut, fmt: u8, chunk_stream_id: u32) {
    if chunk_stream_id < 64 {
        buf.put_u8(fmt << 6 | chunk_stream_id as u8);
    } else if chunk_stream_id < 320 {
        buf.put_u8(fmt << 6);
        buf.put_u8((chunk_stream_id - 64) as u8);
    } else {
        let id = chunk_stream_id - 64;
        buf.put_u8(fmt << 6 | 1);
        buf.put_u8((id & 0xFF) as u8);
        buf.put_u8(((id >> 8) & 0xFF) as u8);
    }
}

impl<W: AsyncWrite + Unpin> ChunkWriter<W> {
    /// Wrap a byte stream.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Use a new chunk size for subsequent messages.
    pub fn set_chunk_size(&mut self, size: u32) -> Result<()> {
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(RtmpError::Protocol(format!("invalid chunk size {}", size)));
        }
        self.chunk_size = size;
        Ok(())
    }

    /// Write a message as one fmt 0 chunk followed by fmt 3 continuations.
    pub async fn write(&mut self, msg: &RawMessage) -> Result<()> {
        if msg.body.len() > MAX_MESSAGE_SIZE {
            return Err(RtmpError::Protocol(format!(
                "message length {} too big",
                msg.body.len()
            )));
        }

        let extended = msg.timestamp >= EXTENDED_TIMESTAMP;
        let chunk_size = self.chunk_size as usize;
        let chunks = msg.body.len().div_ceil(chunk_size).max(1);
        let mut buf = BytesMut::with_capacity(msg.body.len() + 18 + chunks * 7);

        put_basic_header(&mut buf, 0, msg.chunk_stream_id);
        buf.put_uint(msg.timestamp.min(EXTENDED_TIMESTAMP) as u64, 3);
        buf.put_uint(msg.body.len() as u64, 3);
        buf.put_u8(msg.type_id);
        buf.put_u32(msg.message_stream_id);
        if extended {
            buf.put_u32(msg.timestamp);
        }

        for (i, chunk) in msg.body.chunks(chunk_size).enumerate() {
            if i > 0 {
                put_basic_header(&mut buf, 3, msg.chunk_stream_id);
                if extended {
                    buf.put_u32(msg.timestamp);
                }
            }
            buf.put_slice(chunk);
        }

        self.writer.write_all(&buf).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn raw(csid: u32, ts: u32, len: usize) -> RawMessage {
        RawMessage {
            chunk_stream_id: csid,
            timestamp: ts,
            type_id: 9,
            message_stream_id: 0x100_0000,
            body: Bytes::from((0..len).map(|i| i as u8).collect::<Vec<_>>()),
        }
    }

    async fn write_then_read(chunk_size: u32, msgs: &[RawMessage]) -> Vec<RawMessage> {
        let mut out = Vec::new();
        let mut writer = ChunkWriter::new(&mut out);
        writer.set_chunk_size(chunk_size).unwrap();
        for msg in msgs {
            writer.write(msg).await.unwrap();
        }

        let mut reader = ChunkReader::new(&out[..]);
        reader.set_chunk_size(chunk_size).unwrap();
        let mut read = Vec::new();
        for _ in msgs {
            read.push(reader.read().await.unwrap());
        }
        read
    }

    #[tokio::test]
    async fn test_multi_chunk_message() {
        let msg = raw(6, 1000, 300);
        let read = write_then_read(128, &[msg.clone()]).await;
        assert_eq!(read, vec![msg]);
    }

    #[tokio::test]
    async fn test_extended_timestamp() {
        let msgs = [raw(4, 0x0100_0000, 200), raw(320, 0x0200_0000, 10)];
        let read = write_then_read(128, &msgs).await;
        assert_eq!(read, msgs.to_vec());
    }

    #[tokio::test]
    async fn test_message_stream_id_byte_order() {
        let mut out = Vec::new();
        ChunkWriter::new(&mut out).write(&raw(3, 0, 1)).await.unwrap();
        // stream 0x1000000 is written as 01 00 00 00
        assert_eq!(&out[8..12], &[0x01, 0x00, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_compressed_headers() {
        // fmt 0, then fmt 1 with delta 40, fmt 2 with delta 20, fmt 3 repeating delta 20
        let data: Vec<u8> = [
            &[0x06, 0, 0, 10, 0, 0, 2, 9, 1, 0, 0, 0, 0xaa, 0xbb][..],
            &[0x46, 0, 0, 40, 0, 0, 1, 9, 0xcc][..],
            &[0x86, 0, 0, 20, 0xdd][..],
            &[0xc6, 0xee][..],
        ]
        .concat();

        let mut reader = ChunkReader::new(&data[..]);
        let m1 = reader.read().await.unwrap();
        let m2 = reader.read().await.unwrap();
        let m3 = reader.read().await.unwrap();
        let m4 = reader.read().await.unwrap();

        assert_eq!(m1.timestamp, 10);
        assert_eq!(&m1.body[..], &[0xaa, 0xbb]);
        assert_eq!(m1.message_stream_id, 0x100_0000);
        assert_eq!(m2.timestamp, 50);
        assert_eq!(m3.timestamp, 70);
        assert_eq!(&m3.body[..], &[0xdd]);
        assert_eq!(m4.timestamp, 90);
        assert_eq!(m4.type_id, 9);
        assert_eq!(m4.message_stream_id, 0x100_0000);
    }

    #[tokio::test]
    async fn test_errors() {
        let mut reader = ChunkReader::new(&[0x46u8, 0, 0, 0, 0, 0, 1, 9, 0][..]);
        assert!(matches!(reader.read().await, Err(RtmpError::Protocol(_))));

        let mut reader = ChunkReader::new(&[0x03u8, 0, 0][..]);
        assert!(matches!(reader.read().await, Err(RtmpError::ConnectionClosed)));
    }
}
