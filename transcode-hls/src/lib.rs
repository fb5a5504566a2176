//! HLS muxer for the streaming bridge.
//!
//! This crate cuts H.264 and AAC access units into segments (and, for
//! Low-Latency HLS, parts), keeps a sliding window of them and serves the
//! primary playlist, the media playlist, the initialization segment,
//! segments and parts by file name.
//!
//! Container bytes are delegated to a [`SegmentWriter`] supplied by the host.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use transcode_hls::{Muxer, MuxerConfig, MuxerVariant, Sample, SegmentWriter};
//! use transcode_rtp::{Mpeg4Audio, H264};
//!
//! struct Concat;
//!
//! impl SegmentWriter for Concat {
//!     fn write_init(&mut self, _: Option<&H264>, _: Option<&Mpeg4Audio>) -> transcode_hls::Result<Bytes> {
//!         Ok(Bytes::new())
//!     }
//!
//!     fn write_media(&mut self, _: u64, samples: &[Sample]) -> transcode_hls::Result<Bytes> {
//!         Ok(Bytes::from(vec![0; samples.len()]))
//!     }
//! }
//!
//! let muxer = Muxer::new(
//!     MuxerConfig::new(MuxerVariant::MpegTs),
//!     Some(Arc::new(H264::new(96))),
//!     None,
//!     Box::new(Concat),
//! )?;
//!
//! let index = muxer.file("index.m3u8", None, None, None);
//! assert_eq!(index.status, 200);
//! # Ok::<(), transcode_hls::HlsError>(())
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod muxer;
mod playlist;
mod segmenter;
mod writer;

pub use config::{MuxerConfig, MuxerVariant};
pub use error::{HlsError, Result};
pub use muxer::{Muxer, MuxerFileResponse};
pub use playlist::{
    codecs, MediaPlaylist, PartialSegment, PrimaryPlaylist, SegmentEntry, ServerControl,
    INIT_SEGMENT, MEDIA_PLAYLIST, PLAYLIST_CONTENT_TYPE, PRIMARY_PLAYLIST,
};
pub use writer::{Sample, SampleData, SegmentWriter};
