//! RTP/H.265 packetizer.

use super::NaluType;
use crate::error::{Result, RtpError};
use crate::packet::{Header, Packet};
use crate::VIDEO_CLOCK_RATE;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;

/// Default maximum payload size: a 1472-byte packet minus the RTP header.
pub const DEFAULT_PAYLOAD_MAX_SIZE: usize = 1460;

/// RTP/H.265 encoder (RFC 7798).
///
/// NAL units that fit together are packed into aggregation packets, a lone
/// NAL unit that fits is sent as a single NAL unit packet and larger ones
/// are split into fragmentation units.
#[derive(Debug, Clone)]
pub struct Encoder {
    payload_type: u8,
    ssrc: u32,
    initial_sequence_number: u16,
    initial_timestamp: u32,
    max_don_diff: u32,
    payload_max_size: usize,
    sequence_number: u16,
    don: u16,
}

impl Encoder {
    /// Create an encoder with random SSRC, sequence number and timestamp.
    pub fn new(payload_type: u8) -> Self {
        let initial_sequence_number = rand::random::<u16>();
        Self {
            payload_type,
            ssrc: rand::random(),
            initial_sequence_number,
            initial_timestamp: rand::random(),
            max_don_diff: 0,
            payload_max_size: DEFAULT_PAYLOAD_MAX_SIZE,
            sequence_number: initial_sequence_number,
            don: 0,
        }
    }

    /// Use a fixed synchronization source.
    pub fn with_ssrc(mut self, ssrc: u32) -> Self {
        self.ssrc = ssrc;
        self
    }

    /// Use a fixed initial sequence number.
    pub fn with_initial_sequence_number(mut self, sequence_number: u16) -> Self {
        self.initial_sequence_number = sequence_number;
        self.sequence_number = sequence_number;
        self
    }

    /// Use a fixed initial timestamp.
    pub fn with_initial_timestamp(mut self, timestamp: u32) -> Self {
        self.initial_timestamp = timestamp;
        self
    }

    /// Emit DONL/DOND fields when positive.
    pub fn with_max_don_diff(mut self, max_don_diff: u32) -> Self {
        self.max_don_diff = max_don_diff;
        self
    }

    /// Override the maximum RTP payload size.
    pub fn with_payload_max_size(mut self, size: usize) -> Self {
        self.payload_max_size = size;
        self
    }

    /// Payload type of generated packets.
    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    /// Synchronization source of generated packets.
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Sequence number of the first generated packet.
    pub fn initial_sequence_number(&self) -> u16 {
        self.initial_sequence_number
    }

    /// Timestamp corresponding to a zero presentation time.
    pub fn initial_timestamp(&self) -> u32 {
        self.initial_timestamp
    }

    /// Maximum RTP payload size.
    pub fn payload_max_size(&self) -> usize {
        self.payload_max_size
    }

    fn has_don(&self) -> bool {
        self.max_don_diff > 0
    }

    fn rtp_timestamp(&self, pts: Duration) -> u32 {
        let ticks = pts.as_nanos() * VIDEO_CLOCK_RATE as u128 / 1_000_000_000;
        self.initial_timestamp.wrapping_add(ticks as u32)
    }

    /// Encode an access unit into RTP packets.
    ///
    /// The marker bit is set on the last packet.
    pub fn encode(&mut self, nalus: &[Bytes], pts: Duration) -> Result<Vec<Packet>> {
        if nalus.is_empty() {
            return Err(RtpError::Encode("access unit contains no NAL units".into()));
        }
        if nalus.iter().any(|n| n.len() < 2) {
            return Err(RtpError::Encode("NAL unit shorter than its header".into()));
        }
        if self.payload_max_size < 8 {
            return Err(RtpError::Encode(format!(
                "payload max size {} is too small",
                self.payload_max_size
            )));
        }

        let timestamp = self.rtp_timestamp(pts);
        let mut packets = Vec::new();
        let mut batch: Vec<Bytes> = Vec::new();

        for nalu in nalus {
            if self.aggregated_size(&batch, nalu) <= self.payload_max_size {
                batch.push(nalu.clone());
            } else {
                if !batch.is_empty() {
                    self.write_batch(&batch, false, timestamp, &mut packets);
                }
                batch = vec![nalu.clone()];
            }
        }
        self.write_batch(&batch, true, timestamp, &mut packets);

        Ok(packets)
    }

    fn aggregated_size(&self, batch: &[Bytes], next: &Bytes) -> usize {
        let mut size = 2;
        for (i, nalu) in batch.iter().chain(std::iter::once(next)).enumerate() {
            if self.has_don() {
                size += if i == 0 { 2 } else { 1 };
            }
            size += 2 + nalu.len();
        }
        size
    }

    fn write_batch(&mut self, batch: &[Bytes], marker: bool, timestamp: u32, out: &mut Vec<Packet>) {
        if let [nalu] = batch {
            let don_size = if self.has_don() { 2 } else { 0 };
            if nalu.len() + don_size <= self.payload_max_size {
                self.write_single(nalu, marker, timestamp, out);
            } else {
                self.write_fragmented(nalu, marker, timestamp, out);
            }
            return;
        }
        self.write_aggregated(batch, marker, timestamp, out);
    }

    fn next_header(&mut self, marker: bool, timestamp: u32) -> Header {
        let header = Header {
            marker,
            payload_type: self.payload_type,
            sequence_number: self.sequence_number,
            timestamp,
            ssrc: self.ssrc,
            ..Default::default()
        };
        self.sequence_number = self.sequence_number.wrapping_add(1);
        header
    }

    fn next_don(&mut self) -> u16 {
        let don = self.don;
        self.don = self.don.wrapping_add(1);
        don
    }

    fn write_single(&mut self, nalu: &Bytes, marker: bool, timestamp: u32, out: &mut Vec<Packet>) {
        let payload = if self.has_don() {
            let don = self.next_don();
            let mut buf = BytesMut::with_capacity(nalu.len() + 2);
            buf.put_slice(&nalu[..2]);
            buf.put_u16(don);
            buf.put_slice(&nalu[2..]);
            buf.freeze()
        } else {
            nalu.clone()
        };
        let header = self.next_header(marker, timestamp);
        out.push(Packet::new(header, payload));
    }

    fn write_aggregated(&mut self, batch: &[Bytes], marker: bool, timestamp: u32, out: &mut Vec<Packet>) {
        let mut buf = BytesMut::new();

        // F bit is set if any unit has it, LayerId and TID take the minimum.
        let forbidden = batch.iter().any(|n| n[0] & 0x80 != 0);
        let layer_id = batch
            .iter()
            .map(|n| (((n[0] & 0x01) as u16) << 5) | (n[1] >> 3) as u16)
            .min()
            .unwrap_or(0);
        let tid = batch.iter().map(|n| n[1] & 0x07).min().unwrap_or(1);

        let mut b0 = (NaluType::AGGREGATION_UNIT.0 << 1) | ((layer_id >> 5) as u8 & 0x01);
        if forbidden {
            b0 |= 0x80;
        }
        buf.put_u8(b0);
        buf.put_u8((((layer_id & 0x1f) as u8) << 3) | tid);

        for (i, nalu) in batch.iter().enumerate() {
            if self.has_don() {
                let don = self.next_don();
                if i == 0 {
                    buf.put_u16(don);
                } else {
                    buf.put_u8(0);
                }
            }
            buf.put_u16(nalu.len() as u16);
            buf.put_slice(nalu);
        }

        let header = self.next_header(marker, timestamp);
        out.push(Packet::new(header, buf.freeze()));
    }

    fn write_fragmented(&mut self, nalu: &Bytes, marker: bool, timestamp: u32, out: &mut Vec<Packet>) {
        let typ = NaluType::from_header(nalu[0]).0;
        let head = [
            (nalu[0] & 0b1000_0001) | (NaluType::FRAGMENTATION_UNIT.0 << 1),
            nalu[1],
        ];
        let don = if self.has_don() { Some(self.next_don()) } else { None };

        let mut data = nalu.slice(2..);
        let mut first = true;

        while !data.is_empty() {
            let mut avail = self.payload_max_size - 3;
            if first && don.is_some() {
                avail -= 2;
            }
            let chunk = data.split_to(avail.min(data.len()));
            let last = data.is_empty();

            let mut fu_header = typ;
            if first {
                fu_header |= 0x80;
            }
            if last {
                fu_header |= 0x40;
            }

            let mut buf = BytesMut::with_capacity(5 + chunk.len());
            buf.put_slice(&head);
            buf.put_u8(fu_header);
            if first {
                if let Some(don) = don {
                    buf.put_u16(don);
                }
            }
            buf.put_slice(&chunk);

            let header = self.next_header(marker && last, timestamp);
            out.push(Packet::new(header, buf.freeze()));
            first = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::Decoder;
    use super::*;

    fn encoder() -> Encoder {
        Encoder::new(96)
            .with_ssrc(0x9dbb7812)
            .with_initial_sequence_number(0x44ed)
            .with_initial_timestamp(0x88776655)
    }

    #[test]
    fn test_single_packet() {
        let mut enc = encoder();
        let nalu = Bytes::from_static(&[0x26, 0x01, 0xaa, 0xbb]);
        let pkts = enc.encode(&[nalu.clone()], Duration::ZERO).unwrap();
        assert_eq!(pkts.len(), 1);
        assert!(pkts[0].header.marker);
        assert_eq!(pkts[0].header.ssrc, 0x9dbb7812);
        assert_eq!(pkts[0].header.sequence_number, 0x44ed);
        assert_eq!(pkts[0].header.timestamp, 0x88776655);
        assert_eq!(pkts[0].payload, nalu);
    }

    #[test]
    fn test_aggregation() {
        let mut enc = encoder();
        let nalus = [
            Bytes::from_static(&[0x40, 0x01, 0x0c]),
            Bytes::from_static(&[0x42, 0x01, 0x01]),
            Bytes::from_static(&[0x44, 0x01, 0xc0]),
        ];
        let pkts = enc.encode(&nalus, Duration::from_secs(1)).unwrap();
        assert_eq!(pkts.len(), 1);
        assert_eq!(NaluType::of(&pkts[0].payload), Some(NaluType::AGGREGATION_UNIT));
        assert_eq!(pkts[0].header.timestamp, 0x88776655u32.wrapping_add(90_000));
        assert_eq!(
            &pkts[0].payload[..],
            &[
                0x60, 0x01, 0x00, 0x03, 0x40, 0x01, 0x0c, 0x00, 0x03, 0x42, 0x01, 0x01, 0x00,
                0x03, 0x44, 0x01, 0xc0,
            ]
        );
    }

    #[test]
    fn test_fragmentation_and_sequence_numbers() {
        let mut enc = encoder().with_payload_max_size(100);
        let mut big = vec![0x26, 0x01];
        big.extend((0..250u32).map(|i| i as u8));
        let big = Bytes::from(big);

        let pkts = enc.encode(&[big.clone()], Duration::ZERO).unwrap();
        assert_eq!(pkts.len(), 3);
        for (i, pkt) in pkts.iter().enumerate() {
            assert_eq!(pkt.header.sequence_number, 0x44ed + i as u16);
            assert!(pkt.payload.len() <= 100);
            assert_eq!(pkt.header.marker, i == 2);
        }
        assert_eq!(pkts[0].payload[2] & 0x80, 0x80);
        assert_eq!(pkts[2].payload[2] & 0x40, 0x40);

        let mut dec = Decoder::new(0);
        let mut out = Vec::new();
        for pkt in &pkts {
            if let Ok((nalus, _)) = dec.decode_until_marker(pkt) {
                out = nalus;
            }
        }
        assert_eq!(out, vec![big]);
    }

    #[test]
    fn test_sequence_number_wraps() {
        let mut enc = Encoder::new(96).with_initial_sequence_number(u16::MAX);
        let nalu = Bytes::from_static(&[0x02, 0x01, 0x00]);
        let first = enc.encode(&[nalu.clone()], Duration::ZERO).unwrap();
        let second = enc.encode(&[nalu], Duration::ZERO).unwrap();
        assert_eq!(first[0].header.sequence_number, u16::MAX);
        assert_eq!(second[0].header.sequence_number, 0);
    }

    #[test]
    fn test_rejects_empty_access_unit() {
        let mut enc = encoder();
        assert!(matches!(
            enc.encode(&[], Duration::ZERO),
            Err(RtpError::Encode(_))
        ));
    }
}
