//! Container writer seam.
//!
//! The muxer decides where segments and parts start and end; a
//! [`SegmentWriter`] supplied by the host turns the collected samples into
//! container bytes (MPEG-TS or fragmented MP4).

use crate::error::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use transcode_rtp::{Mpeg4Audio, H264};

/// Payload of a sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleData {
    /// H.264 access unit.
    H264 {
        /// NAL units without start codes or length prefixes.
        nalus: Vec<Bytes>,
        /// Whether the access unit contains an IDR slice.
        idr: bool,
    },
    /// AAC access unit.
    Aac(Bytes),
}

/// A timestamped access unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Wall-clock time of the sample.
    pub ntp: DateTime<Utc>,
    /// Presentation timestamp.
    pub pts: Duration,
    /// Payload.
    pub data: SampleData,
}

impl Sample {
    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        match &self.data {
            SampleData::H264 { nalus, .. } => nalus.iter().map(|n| n.len() as u64).sum(),
            SampleData::Aac(au) => au.len() as u64,
        }
    }

    /// Whether the sample is a video random access point.
    pub fn is_idr(&self) -> bool {
        matches!(self.data, SampleData::H264 { idr: true, .. })
    }

    /// Whether the sample is video.
    pub fn is_video(&self) -> bool {
        matches!(self.data, SampleData::H264 { .. })
    }
}

/// Produces container bytes for the muxer.
pub trait SegmentWriter: Send {
    /// Build the initialization segment of a fragmented MP4 stream.
    ///
    /// Never called for MPEG-TS.
    fn write_init(&mut self, video: Option<&H264>, audio: Option<&Mpeg4Audio>) -> Result<Bytes>;

    /// Build the bytes of a part (low-latency) or of a whole segment.
    ///
    /// `fragment` increases by one on each call.
    fn write_media(&mut self, fragment: u64, samples: &[Sample]) -> Result<Bytes>;
}
