//! RTMP connection errors.

use thiserror::Error;
use transcode_rtp::RtpError;

/// Errors produced by the RTMP connection engine.
#[derive(Error, Debug)]
pub enum RtmpError {
    /// Transport I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the connection
    #[error("connection closed")]
    ConnectionClosed,

    /// A read or write did not complete in time
    #[error("timeout: {0}")]
    Timeout(String),

    /// Handshake failed
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Unexpected command name or shape, missing argument, invalid metadata
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Peer answered a command with a non-success status
    #[error("server refused connect request")]
    Refused,

    /// Codec identifier that can't be handled
    #[error("unsupported {kind} codec {codec}")]
    UnsupportedCodec {
        /// "video" or "audio"
        kind: &'static str,
        /// Codec identifier as received
        codec: String,
    },

    /// No track could be discovered in the first second of traffic
    #[error("no tracks found")]
    NoTracksFound,

    /// Invalid decoder configuration record
    #[error("invalid {codec} config: {message}")]
    InvalidConfig {
        /// Codec of the configuration
        codec: &'static str,
        /// Description of the error
        message: String,
    },

    /// Malformed AMF0 data
    #[error("invalid AMF data: {0}")]
    Amf(String),

    /// Malformed or incomplete URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid settings
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Payload codec or track descriptor error
    #[error(transparent)]
    Rtp(#[from] RtpError),
}

impl From<url::ParseError> for RtmpError {
    fn from(e: url::ParseError) -> Self {
        RtmpError::InvalidUrl(e.to_string())
    }
}

/// Result type for RTMP operations
pub type Result<T> = std::result::Result<T, RtmpError>;
