//! H.265 format processor.

use super::{FormatProcessor, ParameterSetInjection, ProcessorConfig, ProcessorMode};
use crate::error::Result;
use crate::format::H265;
use crate::h265::{is_random_access, Decoder, Encoder, NaluType};
use crate::packet::Packet;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// A batch of H.265 data at one presentation time.
///
/// Carries RTP packets, decoded NAL units, or both while re-encoding.
#[derive(Debug, Clone)]
pub struct UnitH265 {
    /// RTP packets.
    pub rtp_packets: Vec<Packet>,
    /// Wall-clock arrival time.
    pub ntp: DateTime<Utc>,
    /// Presentation time.
    pub pts: Duration,
    /// NAL units of one access unit.
    pub nalus: Vec<Bytes>,
}

impl UnitH265 {
    /// A unit carrying RTP packets received now.
    pub fn from_packets(rtp_packets: Vec<Packet>) -> Self {
        Self {
            rtp_packets,
            ntp: Utc::now(),
            pts: Duration::ZERO,
            nalus: Vec::new(),
        }
    }

    /// A unit carrying an access unit produced now.
    pub fn from_nalus(nalus: Vec<Bytes>) -> Self {
        Self {
            rtp_packets: Vec::new(),
            ntp: Utc::now(),
            pts: Duration::ZERO,
            nalus,
        }
    }

    /// Set the presentation time.
    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = pts;
        self
    }
}

/// Parameter sets found in a single packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSets {
    /// Video parameter set.
    pub vps: Option<Bytes>,
    /// Sequence parameter set.
    pub sps: Option<Bytes>,
    /// Picture parameter set.
    pub pps: Option<Bytes>,
}

impl ParameterSets {
    /// Whether nothing was found.
    pub fn is_empty(&self) -> bool {
        self.vps.is_none() && self.sps.is_none() && self.pps.is_none()
    }

    fn assign(&mut self, nalu: Bytes) {
        match NaluType::of(&nalu) {
            Some(NaluType::VPS) => self.vps = Some(nalu),
            Some(NaluType::SPS) => self.sps = Some(nalu),
            Some(NaluType::PPS) => self.pps = Some(nalu),
            _ => {}
        }
    }
}

/// Extract VPS, SPS and PPS from an RTP/H.265 payload without decoding it.
///
/// Aggregation packets are walked unit by unit. A declared length running
/// past the payload yields nothing for the whole packet.
pub fn extract_parameter_sets(payload: &Bytes, with_don: bool) -> ParameterSets {
    let mut found = ParameterSets::default();
    if payload.len() < 2 {
        return found;
    }

    match NaluType::from_header(payload[0]) {
        NaluType::VPS | NaluType::SPS | NaluType::PPS => {
            if with_don {
                if payload.len() < 4 {
                    return found;
                }
                let mut nalu = Vec::with_capacity(payload.len() - 2);
                nalu.extend_from_slice(&payload[..2]);
                nalu.extend_from_slice(&payload[4..]);
                found.assign(Bytes::from(nalu));
            } else {
                found.assign(payload.clone());
            }
        }

        NaluType::AGGREGATION_UNIT => {
            let mut rest = payload.slice(2..);
            let mut first = true;

            while !rest.is_empty() {
                if with_don {
                    let don_size = if first { 2 } else { 1 };
                    if rest.len() < don_size {
                        return ParameterSets::default();
                    }
                    rest = rest.slice(don_size..);
                }
                first = false;

                if rest.len() < 2 {
                    break;
                }
                let size = u16::from_be_bytes([rest[0], rest[1]]) as usize;
                rest = rest.slice(2..);

                if size == 0 {
                    break;
                }
                if size > rest.len() {
                    return ParameterSets::default();
                }

                found.assign(rest.slice(..size));
                rest = rest.slice(size..);
            }
        }

        _ => {}
    }

    found
}

/// Format processor for H.265 tracks.
#[derive(Debug)]
pub struct H265Processor {
    format: Arc<H265>,
    config: ProcessorConfig,
    encoder: Option<Encoder>,
    decoder: Option<Decoder>,
    /// Set when the encoder was started mid-stream and has not encoded yet.
    switching: bool,
    /// Decoded PTS of the first re-encoded access unit after a switch.
    switch_pts: Option<Duration>,
}

impl H265Processor {
    /// Create a processor.
    ///
    /// With `allocate_encoder`, output packets are always re-encoded.
    pub fn new(format: Arc<H265>, config: ProcessorConfig, allocate_encoder: bool) -> Result<Self> {
        config.validate()?;

        let encoder = allocate_encoder.then(|| {
            format
                .create_encoder()
                .with_payload_max_size(config.encoder_payload_max_size)
        });

        Ok(Self {
            format,
            config,
            encoder,
            decoder: None,
            switching: false,
            switch_pts: None,
        })
    }

    /// The track this processor updates.
    pub fn format(&self) -> &Arc<H265> {
        &self.format
    }

    /// The active re-encoder, if any.
    pub fn encoder(&self) -> Option<&Encoder> {
        self.encoder.as_ref()
    }

    fn update_track_from_packet(&self, pkt: &Packet) {
        let found = extract_parameter_sets(&pkt.payload, self.format.max_don_diff() > 0);
        self.store(found);
    }

    fn update_track_from_nalus(&self, nalus: &[Bytes]) {
        let mut found = ParameterSets::default();
        for nalu in nalus {
            found.assign(nalu.clone());
        }
        self.store(found);
    }

    fn store(&self, found: ParameterSets) {
        if found.is_empty() {
            return;
        }

        let mut changed = false;
        if let Some(vps) = &found.vps {
            changed |= self.format.update_vps(vps);
        }
        if let Some(sps) = &found.sps {
            changed |= self.format.update_sps(sps);
        }
        if let Some(pps) = &found.pps {
            changed |= self.format.update_pps(pps);
        }

        if changed {
            debug!(revision = self.format.revision(), "H265 parameter sets updated");
        }
    }

    fn remux(&self, nalus: Vec<Bytes>) -> Vec<Bytes> {
        if self.config.injection == ParameterSetInjection::Disabled || !is_random_access(&nalus) {
            return nalus;
        }

        let present = |typ: NaluType| nalus.iter().any(|n| NaluType::of(n) == Some(typ));

        let mut prefix = Vec::with_capacity(3);
        if !present(NaluType::VPS) {
            prefix.extend(self.format.safe_vps());
        }
        if !present(NaluType::SPS) {
            prefix.extend(self.format.safe_sps());
        }
        if !present(NaluType::PPS) {
            prefix.extend(self.format.safe_pps());
        }

        if prefix.is_empty() {
            return nalus;
        }

        trace!(count = prefix.len(), "injecting parameter sets before random access unit");
        prefix.extend(nalus);
        prefix
    }

    fn start_encoding(&mut self, pkt: &Packet) {
        debug!(
            size = pkt.marshal_size(),
            max = self.config.max_packet_size,
            ssrc = pkt.header.ssrc,
            "RTP packets exceed maximum size, re-encoding them"
        );

        self.encoder = Some(
            Encoder::new(pkt.header.payload_type)
                .with_ssrc(pkt.header.ssrc)
                .with_initial_sequence_number(pkt.header.sequence_number)
                .with_initial_timestamp(pkt.header.timestamp)
                .with_max_don_diff(self.format.max_don_diff())
                .with_payload_max_size(self.config.encoder_payload_max_size),
        );
        self.switching = true;
        self.switch_pts = None;
    }

    /// PTS handed to a mid-stream encoder, relative to the switch.
    ///
    /// The encoder is seeded with the timestamp of the triggering packet, so
    /// its time origin is the PTS of that packet rather than the decoder's.
    fn encoder_pts(&mut self, pts: Duration) -> Duration {
        if self.switching {
            self.switching = false;
            self.switch_pts = Some(pts);
        }
        match self.switch_pts {
            Some(origin) => pts.saturating_sub(origin),
            None => pts,
        }
    }
}

impl FormatProcessor for H265Processor {
    type Unit = UnitH265;

    fn process(&mut self, unit: &mut UnitH265, has_non_rtp_readers: bool) -> Result<()> {
        if let Some(first) = unit.rtp_packets.first_mut() {
            self.update_track_from_packet(first);

            if self.encoder.is_none() {
                first.strip_padding();
                if first.marshal_size() > self.config.max_packet_size {
                    let trigger = first.clone();
                    self.start_encoding(&trigger);
                }
            }

            if has_non_rtp_readers || self.encoder.is_some() {
                let pkt = unit.rtp_packets[0].clone();
                if self.encoder.is_some() {
                    unit.rtp_packets.clear();
                }

                let format = &self.format;
                let decoder = self.decoder.get_or_insert_with(|| format.create_decoder());

                // a whole access unit is needed, otherwise the encoder emits partial groups
                let (nalus, pts) = match decoder.decode_until_marker(&pkt) {
                    Ok(v) => v,
                    Err(e) if e.is_benign() => {
                        trace!(sequence_number = pkt.header.sequence_number, "{}", e);
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                };

                unit.nalus = self.remux(nalus);
                unit.pts = pts;
            }

            if self.encoder.is_none() {
                return Ok(());
            }
        } else {
            if unit.nalus.is_empty() {
                return Ok(());
            }
            self.update_track_from_nalus(&unit.nalus);
            unit.nalus = self.remux(std::mem::take(&mut unit.nalus));
        }

        let pts = self.encoder_pts(unit.pts);
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(());
        };
        unit.rtp_packets = encoder.encode(&unit.nalus, pts)?;
        Ok(())
    }

    fn mode(&self) -> ProcessorMode {
        if self.encoder.is_some() {
            ProcessorMode::Encoding
        } else if self.decoder.is_some() {
            ProcessorMode::Decoding
        } else {
            ProcessorMode::PassThrough
        }
    }
}
