//! Per-codec format processors.
//!
//! A processor sits on one elementary stream and bridges its two
//! representations: RTP packets and codec access units. It keeps the track
//! descriptor's parameter sets current and switches to re-encoding when
//! incoming packets are too large to be relayed as-is.

mod h265;

pub use h265::{extract_parameter_sets, H265Processor, ParameterSets, UnitH265};

use crate::error::{Result, RtpError};
use crate::h265::DEFAULT_PAYLOAD_MAX_SIZE;
use crate::packet::HEADER_SIZE;
use crate::MAX_PACKET_SIZE;
use serde::{Deserialize, Serialize};

/// Processing step applied to every unit of one elementary stream.
pub trait FormatProcessor: Send {
    /// The unit type this processor consumes and produces.
    type Unit;

    /// Process a unit in place.
    ///
    /// `has_non_rtp_readers` tells whether some consumer needs decoded
    /// access units rather than packets.
    fn process(&mut self, unit: &mut Self::Unit, has_non_rtp_readers: bool) -> Result<()>;

    /// Current operating mode.
    fn mode(&self) -> ProcessorMode;
}

/// Where a processor currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessorMode {
    /// Packets are routed untouched.
    PassThrough,
    /// Packets are routed untouched and also decoded into access units.
    Decoding,
    /// Packets are decoded and re-encoded.
    Encoding,
}

/// What to do with parameter sets when an access unit starts a random access point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSetInjection {
    /// Forward access units unchanged.
    Disabled,
    /// Prepend stored parameter sets missing from random access units.
    #[default]
    BeforeRandomAccess,
}

/// Format processor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Largest RTP packet relayed without re-encoding.
    pub max_packet_size: usize,
    /// Parameter-set injection policy.
    pub injection: ParameterSetInjection,
    /// Maximum payload size of re-encoded packets.
    pub encoder_payload_max_size: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            injection: ParameterSetInjection::default(),
            encoder_payload_max_size: DEFAULT_PAYLOAD_MAX_SIZE,
        }
    }
}

impl ProcessorConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `max_packet_size` can't hold an RTP header plus a minimal payload
    /// - re-encoded packets would exceed `max_packet_size`
    pub fn validate(&self) -> Result<()> {
        if self.max_packet_size < HEADER_SIZE + 8 {
            return Err(RtpError::Configuration(format!(
                "max packet size {} is too small",
                self.max_packet_size
            )));
        }

        if self.encoder_payload_max_size < 8
            || self.encoder_payload_max_size + HEADER_SIZE > self.max_packet_size
        {
            return Err(RtpError::Configuration(format!(
                "encoder payload size {} out of valid range [8, {}]",
                self.encoder_payload_max_size,
                self.max_packet_size - HEADER_SIZE
            )));
        }

        Ok(())
    }
}
