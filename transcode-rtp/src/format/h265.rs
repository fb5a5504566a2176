use super::{ParameterSet, Revision};
use crate::h265::{Decoder, Encoder};
use crate::VIDEO_CLOCK_RATE;
use bytes::Bytes;

/// H.265 track descriptor.
#[derive(Debug)]
pub struct H265 {
    payload_type: u8,
    max_don_diff: u32,
    vps: ParameterSet,
    sps: ParameterSet,
    pps: ParameterSet,
    revision: Revision,
}

impl H265 {
    /// Create a descriptor without parameter sets.
    pub fn new(payload_type: u8) -> Self {
        Self::with_parameter_sets(payload_type, None, None, None)
    }

    /// Create a descriptor with known parameter sets.
    pub fn with_parameter_sets(
        payload_type: u8,
        vps: Option<Bytes>,
        sps: Option<Bytes>,
        pps: Option<Bytes>,
    ) -> Self {
        Self {
            payload_type,
            max_don_diff: 0,
            vps: ParameterSet::new(vps),
            sps: ParameterSet::new(sps),
            pps: ParameterSet::new(pps),
            revision: Revision::default(),
        }
    }

    /// Set `sprop-max-don-diff`.
    pub fn with_max_don_diff(mut self, max_don_diff: u32) -> Self {
        self.max_don_diff = max_don_diff;
        self
    }

    /// RTP payload type.
    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    /// Maximum decoding order number difference.
    pub fn max_don_diff(&self) -> u32 {
        self.max_don_diff
    }

    /// RTP clock rate.
    pub fn clock_rate(&self) -> u32 {
        VIDEO_CLOCK_RATE
    }

    /// A decoder for packets of this track.
    pub fn create_decoder(&self) -> Decoder {
        Decoder::new(self.max_don_diff)
    }

    /// An encoder with random initial state for this track.
    pub fn create_encoder(&self) -> Encoder {
        Encoder::new(self.payload_type).with_max_don_diff(self.max_don_diff)
    }

    /// Current VPS.
    pub fn safe_vps(&self) -> Option<Bytes> {
        self.vps.get()
    }

    /// Current SPS.
    pub fn safe_sps(&self) -> Option<Bytes> {
        self.sps.get()
    }

    /// Current PPS.
    pub fn safe_pps(&self) -> Option<Bytes> {
        self.pps.get()
    }

    /// Replace the VPS unconditionally.
    pub fn safe_set_vps(&self, vps: Bytes) {
        self.vps.set(Some(vps));
        self.revision.bump();
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

    /// Store the VPS if non-empty and different. Returns whether it changed.
    pub fn update_vps(&self, vps: &[u8]) -> bool {
        self.track(self.vps.update(vps))
    }

    /// Store the SPS if non-empty and different. Returns whether it changed.
    pub fn update_sps(&self, sps: &[u8]) -> bool {
        self.track(self.sps.update(sps))
    }

    /// Store the PPS if non-empty and different. Returns whether it changed.
    pub fn update_pps(&self, pps: &[u8]) -> bool {
        self.track(self.pps.update(pps))
    }

    fn track(&self, changed: bool) -> bool {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_concurrent_updates_store_once() {
        let track = Arc::new(H265::new(96));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let track = Arc::clone(&track);
                thread::spawn(move || track.update_sps(&[0x42, 0x01, 0x01]))
            })
            .collect();

        let stores = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|changed| *changed)
            .count();
        assert_eq!(stores, 1);
        assert_eq!(track.revision(), 1);
    }

    #[test]
    fn test_codec_factories() {
        let track = H265::new(97).with_max_don_diff(2);
        assert_eq!(track.create_encoder().payload_type(), 97);
        assert_eq!(track.clock_rate(), 90_000);
        assert_eq!(track.max_don_diff(), 2);
    }
}
