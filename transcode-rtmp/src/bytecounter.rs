//! Transport wrapper counting bytes in both directions.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Shared byte counters, readable while the stream is in use.
#[derive(Debug, Clone, Default)]
pub struct ByteCounts {
    received: Arc<AtomicU64>,
    sent: Arc<AtomicU64>,
}

impl ByteCounts {
    /// Bytes read from the transport.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Bytes written to the transport.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

/// Wraps a transport and counts the bytes passing through it.
#[derive(Debug)]
pub struct ByteCounter<S> {
    inner: S,
    counts: ByteCounts,
}

impl<S> ByteCounter<S> {
    /// Wrap a transport.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            counts: ByteCounts::default(),
        }
    }

    /// Handle to the counters.
    pub fn counts(&self) -> ByteCounts {
        self.counts.clone()
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ByteCounter<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let res = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = res {
            let n = buf.filled().len() - before;
            self.counts.received.fetch_add(n as u64, Ordering::Relaxed);
        }
        res
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ByteCounter<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let res = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = res {
            self.counts.sent.fetch_add(n as u64, Ordering::Relaxed);
        }
        res
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_counts_both_directions() {
        let (a, mut b) = tokio::io::duplex(64);
        let mut counter = ByteCounter::new(a);
        let counts = counter.counts();

        counter.write_all(b"hello").await.unwrap();
        b.write_all(b"abc").await.unwrap();
        let mut buf = [0u8; 3];
        counter.read_exact(&mut buf).await.unwrap();

        assert_eq!(counts.sent(), 5);
        assert_eq!(counts.received(), 3);
    }
}
