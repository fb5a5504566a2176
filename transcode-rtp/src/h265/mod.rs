//! H.265 NAL unit classification and the RTP/H.265 payload format (RFC 7798).

mod decoder;
mod encoder;

pub use decoder::{Decoder, TimeDecoder, MAX_ACCESS_UNIT_SIZE, MAX_NALUS_PER_ACCESS_UNIT};
pub use encoder::{Encoder, DEFAULT_PAYLOAD_MAX_SIZE};

use std::fmt;

/// H.265 NAL unit type, read from bits 1..7 of the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaluType(pub u8);

impl NaluType {
    /// Broken link access, first IRAP type.
    pub const BLA_W_LP: Self = Self(16);
    /// Instantaneous decoder refresh with RADL pictures.
    pub const IDR_W_RADL: Self = Self(19);
    /// Instantaneous decoder refresh without leading pictures.
    pub const IDR_N_LP: Self = Self(20);
    /// Clean random access.
    pub const CRA_NUT: Self = Self(21);
    /// Last reserved IRAP type.
    pub const RSV_IRAP_VCL23: Self = Self(23);
    /// Video parameter set.
    pub const VPS: Self = Self(32);
    /// Sequence parameter set.
    pub const SPS: Self = Self(33);
    /// Picture parameter set.
    pub const PPS: Self = Self(34);
    /// Access unit delimiter.
    pub const AUD: Self = Self(35);
    /// RTP aggregation packet.
    pub const AGGREGATION_UNIT: Self = Self(48);
    /// RTP fragmentation unit.
    pub const FRAGMENTATION_UNIT: Self = Self(49);
    /// RTP payload content information.
    pub const PACI: Self = Self(50);

    /// Extract the type from a header byte.
    pub fn from_header(byte0: u8) -> Self {
        Self((byte0 >> 1) & 0b11_1111)
    }

    /// Type of a NAL unit, `None` if it is empty.
    pub fn of(nalu: &[u8]) -> Option<Self> {
        nalu.first().map(|b| Self::from_header(*b))
    }

    /// Intra random access point picture (BLA, IDR, CRA or reserved IRAP).
    pub fn is_irap(self) -> bool {
        (Self::BLA_W_LP.0..=Self::RSV_IRAP_VCL23.0).contains(&self.0)
    }

    /// VPS, SPS or PPS.
    pub fn is_parameter_set(self) -> bool {
        matches!(self, Self::VPS | Self::SPS | Self::PPS)
    }
}

impl fmt::Display for NaluType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::VPS => "VPS",
            Self::SPS => "SPS",
            Self::PPS => "PPS",
            Self::AUD => "AUD",
            Self::IDR_W_RADL => "IDR_W_RADL",
            Self::IDR_N_LP => "IDR_N_LP",
            Self::CRA_NUT => "CRA",
            Self::AGGREGATION_UNIT => "AggregationUnit",
            Self::FRAGMENTATION_UNIT => "FragmentationUnit",
            Self::PACI => "PACI",
            _ => return write!(f, "NALU({})", self.0),
        };
        f.write_str(name)
    }
}

/// Whether any NAL unit of an access unit is a random access point.
pub fn is_random_access(nalus: &[bytes::Bytes]) -> bool {
    nalus
        .iter()
        .filter_map(|n| NaluType::of(n))
        .any(NaluType::is_irap)
}
