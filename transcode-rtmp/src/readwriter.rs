//! Typed message channel over a chunked byte stream.

use crate::chunk::{ChunkReader, ChunkWriter};
use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

/// A bidirectional stream of RTMP messages.
#[async_trait]
pub trait MessageChannel: Send {
    /// Read the next message.
    async fn read(&mut self) -> Result<Message>;

    /// Write a message.
    async fn write(&mut self, msg: &Message) -> Result<()>;
}

/// Message channel over a transport.
///
/// Protocol control messages are applied to the chunk layer as they pass:
/// SetChunkSize and Abort on read, SetChunkSize on write. Acknowledgements
/// are sent whenever the peer's window has been received.
pub struct MessageReadWriter<S> {
    reader: ChunkReader<ReadHalf<S>>,
    writer: ChunkWriter<WriteHalf<S>>,
    ack_window: u32,
    last_ack: u64,
}

impl<S: AsyncRead + AsyncWrite> MessageReadWriter<S> {
    /// Split a transport into its chunk reader and writer.
    pub fn new(stream: S) -> Self {
        let (r, w) = tokio::io::split(stream);
        Self {
            reader: ChunkReader::new(r),
            writer: ChunkWriter::new(w),
            ack_window: 0,
            last_ack: 0,
        }
    }
}

#[async_trait]
impl<S> MessageChannel for MessageReadWriter<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    async fn read(&mut self) -> Result<Message> {
        let raw = self.reader.read().await?;

        let received = self.reader.bytes_read();
        if self.ack_window != 0 && received - self.last_ack >= self.ack_window as u64 {
            self.last_ack = received;
            self.writer
                .write(&Message::Acknowledge(received as u32).encode())
                .await?;
        }

        let msg = Message::decode(raw)?;
        match &msg {
            Message::SetChunkSize(size) => {
                tracing::debug!(size, "peer chunk size");
                self.reader.set_chunk_size(*size)?;
            }
            Message::SetWindowAckSize(size) => self.ack_window = *size,
            Message::Abort { chunk_stream_id } => self.reader.abort(*chunk_stream_id),
            _ => {}
        }
        Ok(msg)
    }

    async fn write(&mut self, msg: &Message) -> Result<()> {
        self.writer.write(&msg.encode()).await?;
        if let Message::SetChunkSize(size) = msg {
            self.writer.set_chunk_size(*size)?;
        }
        Ok(())
    }
}
