use crate::bits::{BitReader, BitWriter};
use crate::error::{Result, RtpError};
use bytes::Bytes;

/// Object types that carry a GASpecificConfig.
const GA_OBJECT_TYPES: [u8; 12] = [1, 2, 3, 4, 6, 7, 17, 19, 20, 21, 22, 23];

/// Explicit SBR or PS signalling (object types 5 and 29).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SbrExtension {
    /// Signalled object type, 5 (SBR) or 29 (PS).
    pub object_type: u8,
    /// Output sample rate index (15 for explicit).
    pub sample_rate_index: u8,
    /// Explicit output sample rate, if `sample_rate_index == 15`.
    pub explicit_sample_rate: Option<u32>,
}

impl SbrExtension {
    /// Output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        rate_of(self.sample_rate_index, self.explicit_sample_rate)
    }
}

/// MPEG-4 AudioSpecificConfig.
///
/// Carried by RTMP as the AAC sequence header. Fields the parser does not
/// interpret are kept verbatim so that [`AacConfig::marshal`] reproduces the
/// input bit for bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AacConfig {
    /// Audio object type of the core coder (1 = AAC Main, 2 = AAC LC, ...).
    pub audio_object_type: u8,
    /// Sample rate index of the core coder (0-12, or 15 for explicit).
    pub sample_rate_index: u8,
    /// Explicit sample rate, if `sample_rate_index == 15`.
    pub explicit_sample_rate: Option<u32>,
    /// Channel configuration.
    pub channel_config: u8,
    /// SBR/PS extension, when signalled explicitly.
    pub extension: Option<SbrExtension>,
    /// 960-sample frames instead of 1024.
    pub frame_length_flag: bool,
    /// Core coder delay, present when dependsOnCoreCoder is set.
    pub core_coder_delay: Option<u16>,
    /// GASpecificConfig extensionFlag.
    pub extension_flag: bool,
    trailing: Bytes,
    trailing_bits: usize,
}

fn rate_of(index: u8, explicit: Option<u32>) -> u32 {
    match explicit {
        Some(rate) => rate,
        None => AacConfig::SAMPLE_RATES
            .get(index as usize)
            .copied()
            .unwrap_or(44100),
    }
}

fn invalid(message: impl Into<String>) -> RtpError {
    RtpError::InvalidConfig {
        codec: "AAC".to_string(),
        message: message.into(),
    }
}

fn read(reader: &mut BitReader<'_>, n: u8) -> Result<u32> {
    reader
        .read_bits(n)
        .map_err(|_| invalid("AudioSpecificConfig too short"))
}

fn read_object_type(reader: &mut BitReader<'_>) -> Result<u8> {
    let object_type = read(reader, 5)? as u8;
    if object_type == 31 {
        return Ok(32 + read(reader, 6)? as u8);
    }
    Ok(object_type)
}

fn read_sample_rate(reader: &mut BitReader<'_>) -> Result<(u8, Option<u32>)> {
    let index = read(reader, 4)? as u8;
    match index {
        15 => Ok((index, Some(read(reader, 24)?))),
        i if (i as usize) < AacConfig::SAMPLE_RATES.len() => Ok((index, None)),
        i => Err(invalid(format!("reserved sample rate index {}", i))),
    }
}

fn write_object_type(writer: &mut BitWriter, object_type: u8) {
    if object_type >= 31 {
        writer.write_bits(31, 5);
        writer.write_bits(u32::from(object_type.saturating_sub(32)), 6);
    } else {
        writer.write_bits(u32::from(object_type), 5);
    }
}

fn write_sample_rate(writer: &mut BitWriter, index: u8, explicit: Option<u32>) {
    writer.write_bits(u32::from(index), 4);
    if index == 15 {
        writer.write_bits(explicit.unwrap_or(44100), 24);
    }
}

impl AacConfig {
    /// Standard AAC sample rates.
    pub const SAMPLE_RATES: [u32; 13] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
    ];

    /// Create a config, falling back to an explicit rate for non-standard rates.
    pub fn new(audio_object_type: u8, sample_rate: u32, channel_config: u8) -> Self {
        let sample_rate_index = Self::SAMPLE_RATES
            .iter()
            .position(|&r| r == sample_rate)
            .map(|i| i as u8)
            .unwrap_or(15);

        Self {
            audio_object_type,
            sample_rate_index,
            explicit_sample_rate: (sample_rate_index == 15).then_some(sample_rate),
            channel_config,
            extension: None,
            frame_length_flag: false,
            core_coder_delay: None,
            extension_flag: false,
            trailing: Bytes::new(),
            trailing_bits: 0,
        }
    }

    /// AAC-LC config.
    pub fn aac_lc(sample_rate: u32, channel_config: u8) -> Self {
        Self::new(2, sample_rate, channel_config)
    }

    fn has_ga_specific_config(&self) -> bool {
        GA_OBJECT_TYPES.contains(&self.audio_object_type)
            && !(self.extension.is_some() && self.audio_object_type == 22)
    }

    /// Parse raw AudioSpecificConfig bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = BitReader::new(data);

        let mut audio_object_type = read_object_type(&mut reader)?;
        if audio_object_type == 0 {
            return Err(invalid("unsupported audio object type 0"));
        }
        let (sample_rate_index, explicit_sample_rate) = read_sample_rate(&mut reader)?;
        let channel_config = read(&mut reader, 4)? as u8;

        let mut extension = None;
        if audio_object_type == 5 || audio_object_type == 29 {
            let (index, explicit) = read_sample_rate(&mut reader)?;
            extension = Some(SbrExtension {
                object_type: audio_object_type,
                sample_rate_index: index,
                explicit_sample_rate: explicit,
            });
            audio_object_type = read_object_type(&mut reader)?;
        }

        let mut config = Self {
            audio_object_type,
            sample_rate_index,
            explicit_sample_rate,
            channel_config,
            extension,
            ..Self::new(audio_object_type, 44100, channel_config)
        };

        if config.has_ga_specific_config() {
            config.frame_length_flag = read(&mut reader, 1)? != 0;
            if read(&mut reader, 1)? != 0 {
                config.core_coder_delay = Some(read(&mut reader, 14)? as u16);
            }
            config.extension_flag = read(&mut reader, 1)? != 0;
        }

        // Anything left is kept verbatim, except zero padding up to the byte boundary.
        let remaining = reader.remaining_bits();
        let mut trailing = BitWriter::with_capacity(remaining / 8 + 1);
        let mut padding = remaining < 8;
        for _ in 0..remaining {
            let bit = reader.read_bit()?;
            padding &= !bit;
            trailing.write_bit(bit);
        }
        if !padding {
            config.trailing = Bytes::from(trailing.into_data());
            config.trailing_bits = remaining;
        }

        Ok(config)
    }

    /// Serialize to AudioSpecificConfig bytes.
    pub fn marshal(&self) -> Bytes {
        let mut writer = BitWriter::with_capacity(5 + self.trailing.len());

        match &self.extension {
            Some(ext) => write_object_type(&mut writer, ext.object_type),
            None => write_object_type(&mut writer, self.audio_object_type),
        }
        write_sample_rate(&mut writer, self.sample_rate_index, self.explicit_sample_rate);
        writer.write_bits(u32::from(self.channel_config & 0x0F), 4);

        if let Some(ext) = &self.extension {
            write_sample_rate(&mut writer, ext.sample_rate_index, ext.explicit_sample_rate);
            write_object_type(&mut writer, self.audio_object_type);
        }

        if self.has_ga_specific_config() {
            writer.write_bit(self.frame_length_flag);
            writer.write_bit(self.core_coder_delay.is_some());
            if let Some(delay) = self.core_coder_delay {
                writer.write_bits(u32::from(delay), 14);
            }
            writer.write_bit(self.extension_flag);
        }

        let mut tail = BitReader::new(&self.trailing);
        for _ in 0..self.trailing_bits {
            match tail.read_bit() {
                Ok(bit) => writer.write_bit(bit),
                Err(_) => break,
            }
        }

        Bytes::from(writer.into_data())
    }

    /// Output sample rate in Hz, including SBR upsampling when signalled.
    pub fn sample_rate(&self) -> u32 {
        match &self.extension {
            Some(ext) => ext.sample_rate(),
            None => self.core_sample_rate(),
        }
    }

    /// Sample rate of the core coder in Hz.
    pub fn core_sample_rate(&self) -> u32 {
        rate_of(self.sample_rate_index, self.explicit_sample_rate)
    }

    /// Number of channels.
    pub fn channels(&self) -> u8 {
        match self.channel_config {
            7 => 8,
            c if c <= 6 => c,
            _ => 2,
        }
    }
}

/// MPEG-4 audio (AAC) track descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mpeg4Audio {
    /// RTP payload type.
    pub payload_type: u8,
    /// Decoder configuration.
    pub config: AacConfig,
    /// AU-size field length in bits (RFC 3640).
    pub size_length: u8,
    /// AU-Index field length in bits.
    pub index_length: u8,
    /// AU-Index-delta field length in bits.
    pub index_delta_length: u8,
}

impl Mpeg4Audio {
    /// Create a descriptor in AAC-hbr mode.
    pub fn new(payload_type: u8, config: AacConfig) -> Self {
        Self {
            payload_type,
            config,
            size_length: 13,
            index_length: 3,
            index_delta_length: 3,
        }
    }

    /// Create a descriptor from an AudioSpecificConfig.
    pub fn from_decoder_config(payload_type: u8, data: &[u8]) -> Result<Self> {
        Ok(Self::new(payload_type, AacConfig::parse(data)?))
    }

    /// RTP clock rate, equal to the sample rate.
    pub fn clock_rate(&self) -> u32 {
        self.config.sample_rate()
    }
}
