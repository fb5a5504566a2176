//! RTP-specific error types.

use thiserror::Error;

/// Errors produced while handling RTP packets, payloads and track parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RtpError {
    /// Packet shorter than the fixed header or its declared fields.
    #[error("RTP packet too short: {0} bytes")]
    PacketTooShort(usize),

    /// Unsupported RTP version.
    #[error("Unsupported RTP version: {0}")]
    UnsupportedVersion(u8),

    /// Structurally invalid packet.
    #[error("Invalid RTP packet: {0}")]
    InvalidPacket(String),

    /// Invalid codec payload inside an otherwise valid packet.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The access unit is not complete yet.
    #[error("need more packets to complete the access unit")]
    MorePacketsNeeded,

    /// A continuation fragment arrived without its starting fragment.
    #[error("received a non-starting fragment without any previous starting fragment")]
    NonStartingPacketAndNoPrevious,

    /// An access unit grew past the decoder limits.
    #[error("Access unit too big: {0}")]
    AccessUnitTooBig(String),

    /// Encoding failed.
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// Invalid codec configuration record.
    #[error("Invalid {codec} configuration: {message}")]
    InvalidConfig {
        /// Codec the configuration belongs to.
        codec: String,
        /// Description of the error.
        message: String,
    },

    /// Invalid processor or encoder settings.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RtpError {
    /// Whether the error only means "wait for more data".
    ///
    /// These conditions are absorbed per batch and never end a stream.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Self::MorePacketsNeeded | Self::NonStartingPacketAndNoPrevious
        )
    }
}

/// Result type for RTP operations.
pub type Result<T> = std::result::Result<T, RtpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_errors() {
        assert!(RtpError::MorePacketsNeeded.is_benign());
        assert!(RtpError::NonStartingPacketAndNoPrevious.is_benign());
        assert!(!RtpError::InvalidPayload("x".into()).is_benign());
        assert!(!RtpError::Encode("x".into()).is_benign());
    }
}
