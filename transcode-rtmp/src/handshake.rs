//! Plain (unsigned) RTMP handshake.
//!
//! C0/S0 carry the version byte, C1/S1 and C2/S2 are 1536-byte blocks:
//! a 4-byte timestamp, 4 zero bytes and random filler.

use crate::error::{Result, RtmpError};
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// RTMP protocol version
pub const RTMP_VERSION: u8 = 3;

/// Size of C1/S1/C2/S2
pub const HANDSHAKE_SIZE: usize = 1536;

fn generate_handshake_data() -> Vec<u8> {
    let mut data = vec![0u8; HANDSHAKE_SIZE];

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u32;
    data[0..4].copy_from_slice(&timestamp.to_be_bytes());

    rand::thread_rng().fill(&mut data[8..]);

    data
}

async fn read_version<S: AsyncRead + Unpin>(stream: &mut S) -> Result<()> {
    let mut version = [0u8; 1];
    stream.read_exact(&mut version).await?;
    if version[0] != RTMP_VERSION {
        return Err(RtmpError::HandshakeFailed(format!(
            "unsupported RTMP version: {}",
            version[0]
        )));
    }
    Ok(())
}

/// Perform the handshake as client.
pub async fn do_client<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let c1 = generate_handshake_data();
    stream.write_all(&[RTMP_VERSION]).await?;
    stream.write_all(&c1).await?;
    stream.flush().await?;

    read_version(stream).await?;

    let mut s1 = vec![0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut s1).await?;

    let mut s2 = vec![0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut s2).await?;
    if s2[..4] != c1[..4] {
        tracing::warn!("S2 timestamp mismatch, continuing anyway");
    }

    // C2 echoes S1
    stream.write_all(&s1).await?;
    stream.flush().await?;

    tracing::debug!("RTMP client handshake completed");
    Ok(())
}

/// Perform the handshake as server.
pub async fn do_server<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    read_version(stream).await?;

    let mut c1 = vec![0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut c1).await?;

    let s1 = generate_handshake_data();
    stream.write_all(&[RTMP_VERSION]).await?;
    stream.write_all(&s1).await?;
    // S2 echoes C1
    stream.write_all(&c1).await?;
    stream.flush().await?;

    let mut c2 = vec![0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut c2).await?;
    if c2[..4] != s1[..4] {
        tracing::warn!("C2 timestamp mismatch, continuing anyway");
    }

    tracing::debug!("RTMP server handshake completed");
    Ok(())
}
