//! Track descriptors.
//!
//! A descriptor holds the negotiated parameters of one elementary stream.
//! Parameter sets may change mid-stream and are shared between the
//! publishing flow and every reader of the same stream, so each of them
//! lives behind its own lock and is only replaced when the bytes differ.

mod h264;
mod h265;
mod mpeg4audio;

pub use h264::H264;
pub use h265::H265;
pub use mpeg4audio::{AacConfig, Mpeg4Audio, SbrExtension};

use bytes::Bytes;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Dynamic payload type assigned to tracks discovered from RTMP.
pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;

/// A single parameter set guarded for concurrent access.
#[derive(Debug, Default)]
pub(crate) struct ParameterSet {
    value: RwLock<Option<Bytes>>,
}

impl ParameterSet {
    pub(crate) fn new(value: Option<Bytes>) -> Self {
        Self {
            value: RwLock::new(value.filter(|v| !v.is_empty())),
        }
    }

    pub(crate) fn get(&self) -> Option<Bytes> {
        self.value.read().clone()
    }

    pub(crate) fn set(&self, value: Option<Bytes>) {
        *self.value.write() = value;
    }

    /// Compare and replace in one critical section.
    ///
    /// Returns `true` if the stored value changed.
    pub(crate) fn update(&self, candidate: &[u8]) -> bool {
        if candidate.is_empty() {
            return false;
        }
        let value = self.value.upgradable_read();
        if value.as_deref() == Some(candidate) {
            return false;
        }
        let mut value = RwLockUpgradableReadGuard::upgrade(value);
        *value = Some(Bytes::copy_from_slice(candidate));
        true
    }
}

/// Counter of actual parameter-set stores on a descriptor.
#[derive(Debug, Default)]
pub(crate) struct Revision(AtomicU64);

impl Revision {
    pub(crate) fn bump(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Video track of a session.
#[derive(Debug, Clone)]
pub enum VideoFormat {
    /// H.264 / AVC.
    H264(Arc<H264>),
    /// H.265 / HEVC.
    H265(Arc<H265>),
}

impl VideoFormat {
    /// Codec name.
    pub fn codec(&self) -> &'static str {
        match self {
            Self::H264(_) => "H264",
            Self::H265(_) => "H265",
        }
    }

    /// RTP payload type.
    pub fn payload_type(&self) -> u8 {
        match self {
            Self::H264(f) => f.payload_type(),
            Self::H265(f) => f.payload_type(),
        }
    }

    /// The H.264 descriptor, if this is an H.264 track.
    pub fn as_h264(&self) -> Option<&Arc<H264>> {
        match self {
            Self::H264(f) => Some(f),
            Self::H265(_) => None,
        }
    }

    /// The H.265 descriptor, if this is an H.265 track.
    pub fn as_h265(&self) -> Option<&Arc<H265>> {
        match self {
            Self::H265(f) => Some(f),
            Self::H264(_) => None,
        }
    }
}
