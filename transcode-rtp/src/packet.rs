//! RTP packet model (RFC 3550).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           synchronization source (SSRC) identifier            |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! |            contributing source (CSRC) identifiers             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::error::{Result, RtpError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the fixed RTP header.
pub const HEADER_SIZE: usize = 12;

/// RTP protocol version.
pub const VERSION: u8 = 2;

/// Header extension (RFC 3550 §5.3.1).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Extension {
    /// Profile-defined identifier.
    pub profile: u16,
    /// Extension body, a multiple of 4 bytes.
    pub payload: Bytes,
}

/// RTP fixed header plus CSRC list and extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Protocol version (always 2).
    pub version: u8,
    /// Padding flag.
    pub padding: bool,
    /// Marker bit; set on the last packet of an access unit.
    pub marker: bool,
    /// Payload type.
    pub payload_type: u8,
    /// Sequence number.
    pub sequence_number: u16,
    /// Media clock timestamp.
    pub timestamp: u32,
    /// Synchronization source.
    pub ssrc: u32,
    /// Contributing sources.
    pub csrc: Vec<u32>,
    /// Optional header extension.
    pub extension: Option<Extension>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            version: VERSION,
            padding: false,
            marker: false,
            payload_type: 0,
            sequence_number: 0,
            timestamp: 0,
            ssrc: 0,
            csrc: Vec::new(),
            extension: None,
        }
    }
}

impl Header {
    /// Size of the serialized header.
    pub fn marshal_size(&self) -> usize {
        let mut size = HEADER_SIZE + 4 * self.csrc.len();
        if let Some(ext) = &self.extension {
            size += 4 + ext.payload.len();
        }
        size
    }

    fn marshal_to(&self, buf: &mut BytesMut) {
        let mut b0 = (self.version & 0x03) << 6;
        if self.padding {
            b0 |= 0x20;
        }
        if self.extension.is_some() {
            b0 |= 0x10;
        }
        b0 |= (self.csrc.len() as u8) & 0x0F;
        buf.put_u8(b0);

        let mut b1 = self.payload_type & 0x7F;
        if self.marker {
            b1 |= 0x80;
        }
        buf.put_u8(b1);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if let Some(ext) = &self.extension {
            buf.put_u16(ext.profile);
            buf.put_u16((ext.payload.len() / 4) as u16);
            buf.put_slice(&ext.payload);
        }
    }

    fn unmarshal(data: &mut Bytes) -> Result<Self> {
        let total = data.len();
        if total < HEADER_SIZE {
            return Err(RtpError::PacketTooShort(total));
        }

        let b0 = data.get_u8();
        let version = b0 >> 6;
        if version != VERSION {
            return Err(RtpError::UnsupportedVersion(version));
        }
        let padding = b0 & 0x20 != 0;
        let has_extension = b0 & 0x10 != 0;
        let csrc_count = (b0 & 0x0F) as usize;

        let b1 = data.get_u8();
        let marker = b1 & 0x80 != 0;
        let payload_type = b1 & 0x7F;
        let sequence_number = data.get_u16();
        let timestamp = data.get_u32();
        let ssrc = data.get_u32();

        if data.remaining() < csrc_count * 4 {
            return Err(RtpError::PacketTooShort(total));
        }
        let csrc = (0..csrc_count).map(|_| data.get_u32()).collect();

        let extension = if has_extension {
            if data.remaining() < 4 {
                return Err(RtpError::PacketTooShort(total));
            }
            let profile = data.get_u16();
            let len = data.get_u16() as usize * 4;
            if data.remaining() < len {
                return Err(RtpError::PacketTooShort(total));
            }
            Some(Extension {
                profile,
                payload: data.split_to(len),
            })
        } else {
            None
        };

        Ok(Self {
            version,
            padding,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension,
        })
    }
}

/// A single RTP packet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    /// Packet header.
    pub header: Header,
    /// Codec payload.
    pub payload: Bytes,
    /// Number of padding bytes appended after the payload.
    pub padding_size: u8,
}

impl Packet {
    /// Create a packet without padding.
    pub fn new(header: Header, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
            padding_size: 0,
        }
    }

    /// Parse a packet from its wire representation.
    pub fn unmarshal(data: &[u8]) -> Result<Self> {
        let mut data = Bytes::copy_from_slice(data);
        let header = Header::unmarshal(&mut data)?;

        let mut padding_size = 0;
        if header.padding {
            let last = *data
                .last()
                .ok_or_else(|| RtpError::InvalidPacket("padding flag set on empty payload".into()))?;
            if last == 0 || last as usize > data.len() {
                return Err(RtpError::InvalidPacket(format!(
                    "invalid padding size {}",
                    last
                )));
            }
            padding_size = last;
            data.truncate(data.len() - last as usize);
        }

        Ok(Self {
            header,
            payload: data,
            padding_size,
        })
    }

    /// Size of the serialized packet.
    pub fn marshal_size(&self) -> usize {
        let padding = if self.header.padding {
            self.padding_size as usize
        } else {
            0
        };
        self.header.marshal_size() + self.payload.len() + padding
    }

    /// Serialize the packet.
    pub fn marshal(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.header.marshal_to(&mut buf);
        buf.put_slice(&self.payload);
        if self.header.padding && self.padding_size > 0 {
            buf.put_bytes(0, self.padding_size as usize - 1);
            buf.put_u8(self.padding_size);
        }
        buf.freeze()
    }

    /// Drop transport-level padding.
    pub fn strip_padding(&mut self) {
        self.header.padding = false;
        self.padding_size = 0;
    }
}
