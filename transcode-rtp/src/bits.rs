//! Bit-level access for codec configuration records.

use crate::error::{Result, RtpError};

/// MSB-first bit reader.
#[derive(Debug, Clone)]
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub(crate) fn remaining_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.position)
    }

    pub(crate) fn read_bit(&mut self) -> Result<bool> {
        let byte = self
            .data
            .get(self.position / 8)
            .ok_or_else(|| RtpError::InvalidPayload("unexpected end of bitstream".to_string()))?;
        let bit = (byte >> (7 - self.position % 8)) & 1;
        self.position += 1;
        Ok(bit != 0)
    }

    /// Read up to 32 bits as an unsigned integer.
    pub(crate) fn read_bits(&mut self, n: u8) -> Result<u32> {
        if self.remaining_bits() < n as usize {
            return Err(RtpError::InvalidPayload(
                "unexpected end of bitstream".to_string(),
            ));
        }
        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | self.read_bit()? as u32;
        }
        Ok(value)
    }
}

/// MSB-first bit writer.
#[derive(Debug, Default)]
pub(crate) struct BitWriter {
    data: Vec<u8>,
    position: usize,
}

impl BitWriter {
    pub(crate) fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            position: 0,
        }
    }

    pub(crate) fn write_bit(&mut self, bit: bool) {
        if self.position % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            if let Some(last) = self.data.last_mut() {
                *last |= 1 << (7 - self.position % 8);
            }
        }
        self.position += 1;
    }

    /// Write the low `n` bits of `value`, most significant first.
    pub(crate) fn write_bits(&mut self, value: u32, n: u8) {
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 != 0);
        }
    }

    /// Take the written bytes. The last byte is zero-padded.
    pub(crate) fn into_data(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_across_bytes() {
        let mut reader = BitReader::new(&[0b1010_1100, 0b0101_0000]);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(8).unwrap(), 0b0110_0010);
        assert_eq!(reader.remaining_bits(), 5);
        assert!(reader.read_bits(6).is_err());
    }

    #[test]
    fn test_writer_pads_last_byte() {
        let mut writer = BitWriter::default();
        writer.write_bits(0b101, 3);
        writer.write_bits(0x3f, 6);
        assert_eq!(writer.into_data(), vec![0b1011_1111, 0b1000_0000]);
    }
}
