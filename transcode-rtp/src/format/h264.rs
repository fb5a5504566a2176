use super::{ParameterSet, Revision};
use crate::VIDEO_CLOCK_RATE;
use bytes::Bytes;

/// H.264 track descriptor.
#[derive(Debug)]
pub struct H264 {
    payload_type: u8,
    packetization_mode: u8,
    sps: ParameterSet,
    pps: ParameterSet,
    revision: Revision,
}

impl H264 {
    /// Create a descriptor without parameter sets, in non-interleaved mode.
    pub fn new(payload_type: u8) -> Self {
        Self::with_parameter_sets(payload_type, None, None)
    }

    /// Create a descriptor with known parameter sets.
    pub fn with_parameter_sets(payload_type: u8, sps: Option<Bytes>, pps: Option<Bytes>) -> Self {
        Self {
            payload_type,
            packetization_mode: 1,
            sps: ParameterSet::new(sps),
            pps: ParameterSet::new(pps),
            revision: Revision::default(),
        }
    }

    /// Override the packetization mode.
    pub fn with_packetization_mode(mut self, mode: u8) -> Self {
        self.packetization_mode = mode;
        self
    }

    /// RTP payload type.
    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    /// RTP packetization mode.
    pub fn packetization_mode(&self) -> u8 {
        self.packetization_mode
    }

    /// RTP clock rate.
    pub fn clock_rate(&self) -> u32 {
        VIDEO_CLOCK_RATE
    }

    /// Current SPS.
    pub fn safe_sps(&self) -> Option<Bytes> {
        self.sps.get()
    }

    /// Current PPS.
    pub fn safe_pps(&self) -> Option<Bytes> {
        self.pps.get()
    }

    /// Replace the SPS unconditionally.
    pub fn safe_set_sps(&self, sps: Bytes) {
        self.sps.set(Some(sps));
        self.revision.bump();
    }

    /// Replace the PPS unconditionally.
    pub fn safe_set_pps(&self, pps: Bytes) {
        self.pps.set(Some(pps));
        self.revision.bump();
    }

    /// Store the SPS if non-empty and different. Returns whether it changed.
    pub fn update_sps(&self, sps: &[u8]) -> bool {
        let changed = self.sps.update(sps);
        if changed {
            self.revision.bump();
        }
        changed
    }

    /// Store the PPS if non-empty and different. Returns whether it changed.
    pub fn update_pps(&self, pps: &[u8]) -> bool {
        let changed = self.pps.update(pps);
        if changed {
            self.revision.bump();
        }
        changed
    }

    /// Number of parameter-set stores so far.
    pub fn revision(&self) -> u64 {
        self.revision.get()
    }
}
