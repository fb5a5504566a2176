//! HLS muxer error types.

use thiserror::Error;

/// Errors that can occur while muxing.
#[derive(Error, Debug)]
pub enum HlsError {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The container writer failed.
    #[error("Segment writer error: {0}")]
    SegmentWriter(String),

    /// A segment grew past the configured maximum size.
    #[error("reached maximum segment size ({0} bytes)")]
    SegmentTooLarge(u64),

    /// A sample was written for a track the muxer was not created with.
    #[error("the muxer has no {0} track")]
    MissingTrack(&'static str),

    /// The stream carries no track the muxer can segment.
    #[error("the stream doesn't contain an H264 track or an AAC track")]
    NoTracks,
}

/// Result type for HLS operations.
pub type Result<T> = std::result::Result<T, HlsError>;
