//! RTP media plumbing for the streaming bridge.
//!
//! This crate provides:
//! - Track descriptors with concurrency-safe parameter sets ([`format`])
//! - The RTP packet model ([`packet`])
//! - RTP/H.265 payload decoding and encoding (RFC 7798, [`h265`])
//! - AVCC length-prefixed NAL unit framing ([`avcc`])
//! - Per-codec format processors that bridge packets and access units ([`processor`])
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use transcode_rtp::format::H265;
//! use transcode_rtp::processor::{FormatProcessor, H265Processor, ProcessorConfig, UnitH265};
//!
//! let track = Arc::new(H265::new(96));
//! let mut processor = H265Processor::new(track, ProcessorConfig::default(), false).unwrap();
//!
//! let mut unit = UnitH265::from_nalus(vec![Bytes::from_static(&[0x02, 0x01, 0xaa])]);
//! processor.process(&mut unit, false).unwrap();
//! ```

#![warn(missing_docs)]

pub mod avcc;
mod bits;
pub mod error;
pub mod format;
pub mod h265;
pub mod packet;
pub mod processor;

pub use error::{Result, RtpError};
pub use format::{H264, H265, Mpeg4Audio, VideoFormat};
pub use packet::{Header, Packet};
pub use processor::{FormatProcessor, H265Processor, ProcessorConfig, ProcessorMode, UnitH265};

/// Maximum size of an RTP packet that fits a 1500-byte MTU
/// once IPv4 and UDP headers are accounted for.
pub const MAX_PACKET_SIZE: usize = 1472;

/// Clock rate of every video payload.
pub const VIDEO_CLOCK_RATE: u32 = 90_000;
