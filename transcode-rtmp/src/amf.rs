//! AMF0 values carried by RTMP commands and data messages.
//!
//! Objects keep their keys in wire order: peers compare and echo them
//! positionally, so a hash map would reorder replies.

use crate::error::{Result, RtmpError};
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;

// AMF0 type markers
const AMF0_NUMBER: u8 = 0x00;
const AMF0_BOOLEAN: u8 = 0x01;
const AMF0_STRING: u8 = 0x02;
const AMF0_OBJECT: u8 = 0x03;
const AMF0_NULL: u8 = 0x05;
const AMF0_UNDEFINED: u8 = 0x06;
const AMF0_ECMA_ARRAY: u8 = 0x08;
const AMF0_OBJECT_END: u8 = 0x09;
const AMF0_STRICT_ARRAY: u8 = 0x0A;
const AMF0_DATE: u8 = 0x0B;
const AMF0_LONG_STRING: u8 = 0x0C;

/// Maximum nesting of objects and arrays.
const MAX_DEPTH: usize = 32;

/// Ordered string-keyed AMF0 object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmfMap(Vec<(String, AmfValue)>);

impl AmfMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builder-style insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AmfValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AmfValue>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.0.push((key, value)),
        }
    }

    /// Value of a key, if present.
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// String value of a key; `None` if absent or not a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(AmfValue::as_str)
    }

    /// Numeric value of a key; `None` if absent or not a number.
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(AmfValue::as_number)
    }

    /// Boolean value of a key; `None` if absent or not a boolean.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(AmfValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AmfValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<AmfValue>> FromIterator<(K, V)> for AmfMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = AmfMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// AMF0 value.
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// Number (f64).
    Number(f64),
    /// Boolean.
    Boolean(bool),
    /// String (short or long on the wire).
    String(String),
    /// Anonymous object.
    Object(AmfMap),
    /// Null.
    Null,
    /// Undefined.
    Undefined,
    /// Associative array.
    EcmaArray(AmfMap),
    /// Indexed array.
    StrictArray(Vec<AmfValue>),
    /// Date: milliseconds since the epoch and a timezone offset.
    Date {
        /// Milliseconds since the Unix epoch.
        millis: f64,
        /// Timezone offset in minutes (ignored by most peers).
        timezone: i16,
    },
}

impl AmfValue {
    /// Decode one value.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        Self::decode_nested(buf, 0)
    }

    /// Decode values until the buffer is exhausted.
    pub fn decode_all<B: Buf>(buf: &mut B) -> Result<Vec<Self>> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(Self::decode(buf)?);
        }
        Ok(values)
    }

    fn decode_nested<B: Buf>(buf: &mut B, depth: usize) -> Result<Self> {
        if depth > MAX_DEPTH {
            return Err(RtmpError::Amf("nesting too deep".into()));
        }
        if !buf.has_remaining() {
            return Err(RtmpError::Amf("empty AMF0 data".into()));
        }

        let marker = buf.get_u8();
        match marker {
            AMF0_NUMBER => {
                need(buf, 8, "number")?;
                Ok(AmfValue::Number(buf.get_f64()))
            }
            AMF0_BOOLEAN => {
                need(buf, 1, "boolean")?;
                Ok(AmfValue::Boolean(buf.get_u8() != 0))
            }
            AMF0_STRING => {
                need(buf, 2, "string length")?;
                let len = buf.get_u16() as usize;
                read_utf8(buf, len).map(AmfValue::String)
            }
            AMF0_LONG_STRING => {
                need(buf, 4, "long string length")?;
                let len = buf.get_u32() as usize;
                read_utf8(buf, len).map(AmfValue::String)
            }
            AMF0_OBJECT => Self::decode_properties(buf, depth).map(AmfValue::Object),
            AMF0_NULL => Ok(AmfValue::Null),
            AMF0_UNDEFINED => Ok(AmfValue::Undefined),
            AMF0_ECMA_ARRAY => {
                need(buf, 4, "ECMA array count")?;
                // the count is advisory, the end marker terminates the array
                let _count = buf.get_u32();
                Self::decode_properties(buf, depth).map(AmfValue::EcmaArray)
            }
            AMF0_STRICT_ARRAY => {
                need(buf, 4, "strict array count")?;
                let count = buf.get_u32() as usize;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(Self::decode_nested(buf, depth + 1)?);
                }
                Ok(AmfValue::StrictArray(items))
            }
            AMF0_DATE => {
                need(buf, 10, "date")?;
                let millis = buf.get_f64();
                let timezone = buf.get_i16();
                Ok(AmfValue::Date { millis, timezone })
            }
            _ => Err(RtmpError::Amf(format!("unknown AMF0 marker: {:#x}", marker))),
        }
    }

    fn decode_properties<B: Buf>(buf: &mut B, depth: usize) -> Result<AmfMap> {
        let mut map = AmfMap::new();

        loop {
            need(buf, 2, "property key length")?;
            let key_len = buf.get_u16() as usize;

            if key_len == 0 {
                need(buf, 1, "object end marker")?;
                let end = buf.get_u8();
                if end != AMF0_OBJECT_END {
                    return Err(RtmpError::Amf(format!(
                        "expected object end marker, got {:#x}",
                        end
                    )));
                }
                return Ok(map);
            }

            let key = read_utf8(buf, key_len)?;
            let value = Self::decode_nested(buf, depth + 1)?;
            map.0.push((key, value));
        }
    }

    /// Encode the value.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            AmfValue::Number(n) => {
                buf.put_u8(AMF0_NUMBER);
                buf.put_f64(*n);
            }
            AmfValue::Boolean(b) => {
                buf.put_u8(AMF0_BOOLEAN);
                buf.put_u8(u8::from(*b));
            }
            AmfValue::String(s) => {
                if s.len() > u16::MAX as usize {
                    buf.put_u8(AMF0_LONG_STRING);
                    buf.put_u32(s.len() as u32);
                } else {
                    buf.put_u8(AMF0_STRING);
                    buf.put_u16(s.len() as u16);
                }
                buf.put_slice(s.as_bytes());
            }
            AmfValue::Object(map) => {
                buf.put_u8(AMF0_OBJECT);
                Self::encode_properties(map, buf);
            }
            AmfValue::Null => buf.put_u8(AMF0_NULL),
            AmfValue::Undefined => buf.put_u8(AMF0_UNDEFINED),
            AmfValue::EcmaArray(map) => {
                buf.put_u8(AMF0_ECMA_ARRAY);
                buf.put_u32(map.len() as u32);
                Self::encode_properties(map, buf);
            }
            AmfValue::StrictArray(items) => {
                buf.put_u8(AMF0_STRICT_ARRAY);
                buf.put_u32(items.len() as u32);
                for item in items {
                    item.encode(buf);
                }
            }
            AmfValue::Date { millis, timezone } => {
                buf.put_u8(AMF0_DATE);
                buf.put_f64(*millis);
                buf.put_i16(*timezone);
            }
        }
    }

    /// Encode a sequence of values back to back.
    pub fn encode_all(values: &[AmfValue], buf: &mut BytesMut) {
        for value in values {
            value.encode(buf);
        }
    }

    fn encode_properties(map: &AmfMap, buf: &mut BytesMut) {
        for (key, value) in map.iter() {
            buf.put_u16(key.len() as u16);
            buf.put_slice(key.as_bytes());
            value.encode(buf);
        }
        buf.put_u16(0);
        buf.put_u8(AMF0_OBJECT_END);
    }

    /// String contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Object or ECMA array contents.
    pub fn as_map(&self) -> Option<&AmfMap> {
        match self {
            AmfValue::Object(m) | AmfValue::EcmaArray(m) => Some(m),
            _ => None,
        }
    }

    /// Whether this is null or undefined.
    pub fn is_null(&self) -> bool {
        matches!(self, AmfValue::Null | AmfValue::Undefined)
    }
}

fn need<B: Buf>(buf: &B, n: usize, what: &str) -> Result<()> {
    if buf.remaining() < n {
        return Err(RtmpError::Amf(format!("incomplete AMF0 {}", what)));
    }
    Ok(())
}

fn read_utf8<B: Buf>(buf: &mut B, len: usize) -> Result<String> {
    need(buf, len, "string")?;
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

impl fmt::Display for AmfValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfValue::Number(n) => write!(f, "{}", n),
            AmfValue::Boolean(b) => write!(f, "{}", b),
            AmfValue::String(s) => write!(f, "{:?}", s),
            AmfValue::Null => f.write_str("null"),
            AmfValue::Undefined => f.write_str("undefined"),
            AmfValue::Object(m) | AmfValue::EcmaArray(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            AmfValue::StrictArray(items) => {
                f.write_str("[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
            AmfValue::Date { millis, .. } => write!(f, "Date({})", millis),
        }
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Number(v)
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        AmfValue::Number(v as f64)
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

impl From<AmfMap> for AmfValue {
    fn from(v: AmfMap) -> Self {
        AmfValue::Object(v)
    }
}
