//! RTP/H.265 depacketizer.

use super::NaluType;
use crate::error::{Result, RtpError};
use crate::packet::Packet;
use crate::VIDEO_CLOCK_RATE;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;
use tracing::trace;

/// Maximum number of NAL units in a single access unit.
pub const MAX_NALUS_PER_ACCESS_UNIT: usize = 25 * 10;

/// Maximum size in bytes of a single access unit.
pub const MAX_ACCESS_UNIT_SIZE: usize = 8 * 1024 * 1024;

/// Converts 32-bit RTP timestamps into a monotonic presentation time.
///
/// Timestamps are taken relative to the first one observed; wraparound of
/// the 32-bit counter is handled by accumulating signed differences.
#[derive(Debug, Clone)]
pub struct TimeDecoder {
    clock_rate: u32,
    initialized: bool,
    previous: u32,
    overall: i64,
}

impl TimeDecoder {
    /// Create a decoder for the given clock rate.
    pub fn new(clock_rate: u32) -> Self {
        Self {
            clock_rate: clock_rate.max(1),
            initialized: false,
            previous: 0,
            overall: 0,
        }
    }

    /// Presentation time of a timestamp, relative to the first one seen.
    pub fn decode(&mut self, timestamp: u32) -> Duration {
        if !self.initialized {
            self.initialized = true;
            self.previous = timestamp;
            return Duration::ZERO;
        }

        let diff = timestamp.wrapping_sub(self.previous) as i32;
        self.previous = timestamp;
        self.overall += diff as i64;

        let ticks = self.overall.max(0) as u128;
        let nanos = ticks * 1_000_000_000 / self.clock_rate as u128;
        Duration::from_nanos(nanos as u64)
    }
}

/// RTP/H.265 decoder (RFC 7798).
///
/// Handles single NAL unit packets, aggregation packets and fragmentation
/// units. DONL/DOND fields are expected when `max_don_diff` is positive.
#[derive(Debug)]
pub struct Decoder {
    max_don_diff: u32,
    time_decoder: TimeDecoder,
    fragments: Vec<Bytes>,
    fragments_size: usize,
    next_fragment_sequence: u16,
    frame: Vec<Bytes>,
    frame_size: usize,
}

impl Decoder {
    /// Create a decoder.
    pub fn new(max_don_diff: u32) -> Self {
        Self {
            max_don_diff,
            time_decoder: TimeDecoder::new(VIDEO_CLOCK_RATE),
            fragments: Vec::new(),
            fragments_size: 0,
            next_fragment_sequence: 0,
            frame: Vec::new(),
            frame_size: 0,
        }
    }

    fn has_don(&self) -> bool {
        self.max_don_diff > 0
    }

    fn reset_fragments(&mut self) {
        self.fragments.clear();
        self.fragments_size = 0;
    }

    /// Decode the NAL units carried by a single packet.
    ///
    /// Fragmentation units are reassembled across calls; intermediate
    /// fragments return [`RtpError::MorePacketsNeeded`].
    pub fn decode(&mut self, pkt: &Packet) -> Result<(Vec<Bytes>, Duration)> {
        let payload = &pkt.payload;
        if payload.len() < 2 {
            self.reset_fragments();
            return Err(RtpError::InvalidPayload("payload is too short".into()));
        }

        let typ = NaluType::from_header(payload[0]);

        if !self.fragments.is_empty() && typ != NaluType::FRAGMENTATION_UNIT {
            trace!(
                sequence_number = pkt.header.sequence_number,
                "discarding incomplete fragmented NAL unit"
            );
            self.reset_fragments();
        }

        let nalus = match typ {
            NaluType::AGGREGATION_UNIT => self.decode_aggregation(payload)?,
            NaluType::FRAGMENTATION_UNIT => match self.decode_fragment(pkt)? {
                Some(nalu) => vec![nalu],
                None => return Err(RtpError::MorePacketsNeeded),
            },
            NaluType::PACI => {
                return Err(RtpError::InvalidPayload(
                    "PACI packets are not supported".into(),
                ))
            }
            _ => vec![self.decode_single(payload)?],
        };

        let pts = self.time_decoder.decode(pkt.header.timestamp);
        Ok((nalus, pts))
    }

    /// Decode packets until one with the marker bit completes an access unit.
    ///
    /// Returns [`RtpError::MorePacketsNeeded`] while the access unit is
    /// still incomplete.
    pub fn decode_until_marker(&mut self, pkt: &Packet) -> Result<(Vec<Bytes>, Duration)> {
        let (nalus, pts) = match self.decode(pkt) {
            Ok(v) => v,
            Err(RtpError::MorePacketsNeeded) => return Err(RtpError::MorePacketsNeeded),
            Err(e) => {
                self.frame.clear();
                self.frame_size = 0;
                return Err(e);
            }
        };

        let added: usize = nalus.iter().map(Bytes::len).sum();
        if self.frame.len() + nalus.len() > MAX_NALUS_PER_ACCESS_UNIT {
            let count = self.frame.len() + nalus.len();
            self.frame.clear();
            self.frame_size = 0;
            return Err(RtpError::AccessUnitTooBig(format!(
                "NAL unit count ({}) exceeds maximum allowed ({})",
                count, MAX_NALUS_PER_ACCESS_UNIT
            )));
        }
        if self.frame_size + added > MAX_ACCESS_UNIT_SIZE {
            let size = self.frame_size + added;
            self.frame.clear();
            self.frame_size = 0;
            return Err(RtpError::AccessUnitTooBig(format!(
                "access unit size ({}) exceeds maximum allowed ({})",
                size, MAX_ACCESS_UNIT_SIZE
            )));
        }

        self.frame.extend(nalus);
        self.frame_size += added;

        if !pkt.header.marker {
            return Err(RtpError::MorePacketsNeeded);
        }

        self.frame_size = 0;
        Ok((std::mem::take(&mut self.frame), pts))
    }

    fn decode_single(&self, payload: &Bytes) -> Result<Bytes> {
        if !self.has_don() {
            return Ok(payload.clone());
        }

        if payload.len() < 4 {
            return Err(RtpError::InvalidPayload(
                "single NAL unit packet too short for DONL".into(),
            ));
        }
        let mut nalu = BytesMut::with_capacity(payload.len() - 2);
        nalu.put_slice(&payload[..2]);
        nalu.put_slice(&payload[4..]);
        Ok(nalu.freeze())
    }

    fn decode_aggregation(&self, payload: &Bytes) -> Result<Vec<Bytes>> {
        let mut rest = payload.slice(2..);
        let mut nalus = Vec::new();
        let mut first = true;

        while !rest.is_empty() {
            if self.has_don() {
                let don_size = if first { 2 } else { 1 };
                if rest.len() < don_size {
                    return Err(RtpError::InvalidPayload(
                        "aggregation unit truncated inside DON field".into(),
                    ));
                }
                rest = rest.slice(don_size..);
            }
            first = false;

            if rest.len() < 2 {
                return Err(RtpError::InvalidPayload(
                    "aggregation unit truncated inside NAL unit size".into(),
                ));
            }
            let size = u16::from_be_bytes([rest[0], rest[1]]) as usize;
            rest = rest.slice(2..);

            if size == 0 || size > rest.len() {
                return Err(RtpError::InvalidPayload(format!(
                    "invalid aggregation unit NAL unit size ({})",
                    size
                )));
            }

            nalus.push(rest.slice(..size));
            rest = rest.slice(size..);

            if nalus.len() > MAX_NALUS_PER_ACCESS_UNIT {
                return Err(RtpError::AccessUnitTooBig(format!(
                    "aggregation unit carries more than {} NAL units",
                    MAX_NALUS_PER_ACCESS_UNIT
                )));
            }
        }

        if nalus.is_empty() {
            return Err(RtpError::InvalidPayload(
                "aggregation unit doesn't contain any NAL unit".into(),
            ));
        }

        Ok(nalus)
    }

    fn decode_fragment(&mut self, pkt: &Packet) -> Result<Option<Bytes>> {
        let payload = &pkt.payload;
        if payload.len() < 3 {
            self.reset_fragments();
            return Err(RtpError::InvalidPayload(
                "fragmentation unit too short".into(),
            ));
        }

        let fu_header = payload[2];
        let start = fu_header & 0x80 != 0;
        let end = fu_header & 0x40 != 0;
        let mut data = payload.slice(3..);

        if start {
            self.reset_fragments();

            if end {
                return Err(RtpError::InvalidPayload(
                    "fragmentation unit can't contain both a start and end bit".into(),
                ));
            }

            if self.has_don() {
                if data.len() < 2 {
                    return Err(RtpError::InvalidPayload(
                        "fragmentation unit too short for DONL".into(),
                    ));
                }
                data = data.slice(2..);
            }

            let typ = fu_header & 0b11_1111;
            let head = [(payload[0] & 0b1000_0001) | (typ << 1), payload[1]];

            self.fragments_size = 2 + data.len();
            self.fragments.push(Bytes::copy_from_slice(&head));
            self.fragments.push(data);
            self.next_fragment_sequence = pkt.header.sequence_number.wrapping_add(1);
            return Ok(None);
        }

        if self.fragments.is_empty() {
            return Err(RtpError::NonStartingPacketAndNoPrevious);
        }

        if pkt.header.sequence_number != self.next_fragment_sequence {
            self.reset_fragments();
            return Err(RtpError::InvalidPayload(
                "discarding fragmented NAL unit since a packet is missing".into(),
            ));
        }
        self.next_fragment_sequence = pkt.header.sequence_number.wrapping_add(1);

        self.fragments_size += data.len();
        if self.fragments_size > MAX_ACCESS_UNIT_SIZE {
            let size = self.fragments_size;
            self.reset_fragments();
            return Err(RtpError::AccessUnitTooBig(format!(
                "NAL unit size ({}) exceeds maximum allowed ({})",
                size, MAX_ACCESS_UNIT_SIZE
            )));
        }
        self.fragments.push(data);

        if !end {
            return Ok(None);
        }

        let mut nalu = BytesMut::with_capacity(self.fragments_size);
        for fragment in self.fragments.drain(..) {
            nalu.put_slice(&fragment);
        }
        self.fragments_size = 0;
        Ok(Some(nalu.freeze()))
    }
}
