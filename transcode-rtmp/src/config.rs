//! Connection settings.

use crate::chunk::MAX_CHUNK_SIZE;
use crate::error::{Result, RtmpError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Flash version announced by clients and servers.
pub const FLASH_VERSION: &str = "LNX 9,0,124,2";

/// Negotiation values and timeouts of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnConfig {
    /// Window acknowledgement size sent to the peer.
    pub window_ack_size: u32,
    /// Peer bandwidth sent to the peer, with dynamic limit type.
    pub peer_bandwidth: u32,
    /// Chunk size used for outgoing messages.
    pub chunk_size: u32,
    /// Buffer length hint in milliseconds, sent by playing clients.
    pub buffer_length: u32,
    /// `flashVer` of `connect` and `fmsVer` of its result.
    pub flash_version: String,
    /// Deadline of each message read.
    pub read_timeout: Option<Duration>,
    /// Deadline of each message write.
    pub write_timeout: Option<Duration>,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            window_ack_size: 2_500_000,
            peer_bandwidth: 2_500_000,
            chunk_size: 65536,
            buffer_length: 0x64,
            flash_version: FLASH_VERSION.to_string(),
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl ConnConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(RtmpError::Configuration(format!(
                "chunk size {} out of valid range [1, {}]",
                self.chunk_size, MAX_CHUNK_SIZE
            )));
        }
        if self.window_ack_size == 0 || self.peer_bandwidth == 0 {
            return Err(RtmpError::Configuration(
                "window ack size and peer bandwidth must be positive".into(),
            ));
        }
        if self.read_timeout == Some(Duration::ZERO) || self.write_timeout == Some(Duration::ZERO) {
            return Err(RtmpError::Configuration("timeouts must be positive".into()));
        }
        Ok(())
    }
}
