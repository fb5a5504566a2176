//! AVCDecoderConfigurationRecord, as carried by AVC sequence headers.

use crate::error::{Result, RtmpError};
use bytes::{BufMut, Bytes, BytesMut};

fn invalid(message: &str) -> RtmpError {
    RtmpError::InvalidConfig {
        codec: "H264",
        message: message.to_string(),
    }
}

/// SPS and PPS of an AVC decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H264Conf {
    /// Sequence parameter set.
    pub sps: Bytes,
    /// Picture parameter set.
    pub pps: Bytes,
}

impl H264Conf {
    /// Parse a configuration record. The first SPS and PPS are kept.
    pub fn unmarshal(data: &[u8]) -> Result<Self> {
        if data.len() < 6 {
            return Err(invalid("configuration record too short"));
        }

        let num_sps = (data[5] & 0x1F) as usize;
        if num_sps == 0 {
            return Err(invalid("no SPS"));
        }
        let mut offset = 6;
        let mut sps = None;
        for _ in 0..num_sps {
            let unit = read_unit(data, &mut offset, "SPS")?;
            sps.get_or_insert(unit);
        }

        let Some(&num_pps) = data.get(offset) else {
            return Err(invalid("no PPS count"));
        };
        offset += 1;
        if num_pps == 0 {
            return Err(invalid("no PPS"));
        }
        let mut pps = None;
        for _ in 0..num_pps {
            let unit = read_unit(data, &mut offset, "PPS")?;
            pps.get_or_insert(unit);
        }

        match (sps, pps) {
            (Some(sps), Some(pps)) => Ok(Self { sps, pps }),
            _ => Err(invalid("missing parameter sets")),
        }
    }

    /// Encode as a configuration record with 4-byte NALU lengths.
    pub fn marshal(&self) -> Result<Bytes> {
        if self.sps.len() < 4 {
            return Err(invalid("SPS too short"));
        }
        if self.sps.len() > u16::MAX as usize || self.pps.len() > u16::MAX as usize {
            return Err(invalid("parameter set too big"));
        }

        let mut buf = BytesMut::with_capacity(11 + self.sps.len() + self.pps.len());
        buf.put_u8(1);
        // profile, compatibility and level come from the SPS
        buf.put_slice(&self.sps[1..4]);
        buf.put_u8(0xFF);
        buf.put_u8(0xE1);
        buf.put_u16(self.sps.len() as u16);
        buf.put_slice(&self.sps);
        buf.put_u8(1);
        buf.put_u16(self.pps.len() as u16);
        buf.put_slice(&self.pps);
        Ok(buf.freeze())
    }
}

fn read_unit(data: &[u8], offset: &mut usize, what: &str) -> Result<Bytes> {
    if *offset + 2 > data.len() {
        return Err(invalid(&format!("{} length truncated", what)));
    }
    let len = u16::from_be_bytes([data[*offset], data[*offset + 1]]) as usize;
    *offset += 2;
    if *offset + len > data.len() {
        return Err(invalid(&format!("{} data truncated", what)));
    }
    let unit = Bytes::copy_from_slice(&data[*offset..*offset + len]);
    *offset += len;
    Ok(unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: [u8; 17] = [
        0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x04, 0x67, 0x64, 0x00, 0x1F, 0x01, 0x00, 0x02,
        0x68, 0xEF,
    ];

    #[test]
    fn test_parse() {
        let conf = H264Conf::unmarshal(&RECORD).unwrap();
        assert_eq!(&conf.sps[..], &[0x67, 0x64, 0x00, 0x1F]);
        assert_eq!(&conf.pps[..], &[0x68, 0xEF]);
    }

    #[test]
    fn test_marshal_matches_record() {
        let conf = H264Conf {
            sps: Bytes::from_static(&[0x67, 0x64, 0x00, 0x1F]),
            pps: Bytes::from_static(&[0x68, 0xEF]),
        };
        assert_eq!(&conf.marshal().unwrap()[..], &RECORD[..]);
    }

    #[test]
    fn test_truncated() {
        assert!(H264Conf::unmarshal(&RECORD[..10]).is_err());
        assert!(H264Conf::unmarshal(&RECORD[..12]).is_err());
        assert!(H264Conf::unmarshal(&[1, 2, 3]).is_err());
    }
}
