//! AVCC framing: NAL units prefixed by a 4-byte big-endian length.

use crate::error::{Result, RtpError};
use bytes::{BufMut, Bytes, BytesMut};

/// Upper bound on NAL units accepted from a single AVCC buffer.
pub const MAX_NALUS_PER_BUFFER: usize = 1024;

/// Split an AVCC buffer into its NAL units.
pub fn unmarshal(buf: &[u8]) -> Result<Vec<Bytes>> {
    let mut nalus = Vec::new();
    let mut pos = 0;

    while pos < buf.len() {
        if buf.len() - pos < 4 {
            return Err(RtpError::InvalidPayload("truncated AVCC length prefix".into()));
        }
        let len = u32::from_be_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]) as usize;
        pos += 4;

        if len == 0 {
            return Err(RtpError::InvalidPayload("empty NAL unit in AVCC buffer".into()));
        }
        if len > buf.len() - pos {
            return Err(RtpError::InvalidPayload(format!(
                "AVCC NAL unit length {} exceeds remaining {} bytes",
                len,
                buf.len() - pos
            )));
        }
        if nalus.len() == MAX_NALUS_PER_BUFFER {
            return Err(RtpError::AccessUnitTooBig(format!(
                "more than {} NAL units in AVCC buffer",
                MAX_NALUS_PER_BUFFER
            )));
        }

        nalus.push(Bytes::copy_from_slice(&buf[pos..pos + len]));
        pos += len;
    }

    Ok(nalus)
}

/// Join NAL units into an AVCC buffer.
pub fn marshal(nalus: &[Bytes]) -> Bytes {
    let size = nalus.iter().map(|n| 4 + n.len()).sum();
    let mut buf = BytesMut::with_capacity(size);
    for nalu in nalus {
        buf.put_u32(nalu.len() as u32);
        buf.put_slice(nalu);
    }
    buf.freeze()
}
