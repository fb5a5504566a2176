//! Muxer variants and settings.

use crate::error::{HlsError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Container and playlist flavour produced by a muxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MuxerVariant {
    /// MPEG-TS segments.
    #[serde(rename = "mpegts")]
    MpegTs,
    /// Fragmented MP4 segments.
    Fmp4,
    /// Low-Latency HLS: fragmented MP4 segments split into parts.
    #[default]
    #[serde(rename = "lowLatency")]
    LowLatency,
}

impl MuxerVariant {
    /// Whether segments are fragmented MP4.
    pub fn is_fmp4(&self) -> bool {
        !matches!(self, Self::MpegTs)
    }

    /// Whether segments are split into parts.
    pub fn is_low_latency(&self) -> bool {
        matches!(self, Self::LowLatency)
    }

    /// Playlist protocol version.
    pub fn playlist_version(&self) -> u32 {
        if self.is_fmp4() {
            9
        } else {
            3
        }
    }

    /// Extension of segment and part files.
    pub fn segment_extension(&self) -> &'static str {
        if self.is_fmp4() {
            "mp4"
        } else {
            "ts"
        }
    }

    /// MIME type of segment and part files.
    pub fn segment_content_type(&self) -> &'static str {
        if self.is_fmp4() {
            "video/mp4"
        } else {
            "video/MP2T"
        }
    }
}

/// Muxer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxerConfig {
    /// Variant to produce.
    pub variant: MuxerVariant,
    /// Number of complete segments kept in the playlist.
    pub segment_count: usize,
    /// Minimum duration of a segment.
    pub segment_duration: Duration,
    /// Target duration of a part (low-latency only).
    pub part_duration: Duration,
    /// Maximum size of a segment in bytes.
    pub segment_max_size: u64,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            variant: MuxerVariant::default(),
            segment_count: 7,
            segment_duration: Duration::from_secs(1),
            part_duration: Duration::from_millis(200),
            segment_max_size: 50 * 1024 * 1024,
        }
    }
}

impl MuxerConfig {
    /// Create a configuration for the given variant.
    pub fn new(variant: MuxerVariant) -> Self {
        Self {
            variant,
            ..Default::default()
        }
    }

    /// Set the number of retained segments.
    pub fn with_segment_count(mut self, count: usize) -> Self {
        self.segment_count = count;
        self
    }

    /// Set the segment duration.
    pub fn with_segment_duration(mut self, duration: Duration) -> Self {
        self.segment_duration = duration;
        self
    }

    /// Set the part duration.
    pub fn with_part_duration(mut self, duration: Duration) -> Self {
        self.part_duration = duration;
        self
    }

    /// Set the maximum segment size.
    pub fn with_segment_max_size(mut self, size: u64) -> Self {
        self.segment_max_size = size;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let min_count = if self.variant.is_low_latency() { 7 } else { 3 };
        if self.segment_count < min_count {
            return Err(HlsError::InvalidConfig(format!(
                "the minimum segment count is {}",
                min_count
            )));
        }
        if self.segment_duration.is_zero() {
            return Err(HlsError::InvalidConfig("segment duration must be positive".into()));
        }
        if self.variant.is_low_latency()
            && (self.part_duration.is_zero() || self.part_duration > self.segment_duration)
        {
            return Err(HlsError::InvalidConfig(format!(
                "part duration {:?} out of valid range (0, {:?}]",
                self.part_duration, self.segment_duration
            )));
        }
        if self.segment_max_size == 0 {
            return Err(HlsError::InvalidConfig("segment max size must be positive".into()));
        }
        Ok(())
    }
}
