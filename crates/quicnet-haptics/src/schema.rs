//! Nested payload schemas
//!
//! Subscription frames carry an `Auth` message and signal frames carry a
//! `Signal` message, both in protobuf wire form. Only the handful of wire
//! types these messages use are implemented; unknown fields are skipped.

use crate::error::{HapticError, Result};

const WIRE_TYPE_VARINT: u8 = 0;
const WIRE_TYPE_FIXED64: u8 = 1;
const WIRE_TYPE_LEN: u8 = 2;
const WIRE_TYPE_FIXED32: u8 = 5;

// ----------------------------------------------------------------------------
// Wire Primitives
// ----------------------------------------------------------------------------

fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn decode_varint(buf: &mut &[u8]) -> Option<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;

    loop {
        let (&byte, rest) = buf.split_first()?;
        *buf = rest;

        result |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Some(result);
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
}

fn encode_tag(field_number: u32, wire_type: u8, buf: &mut Vec<u8>) {
    encode_varint((u64::from(field_number) << 3) | u64::from(wire_type), buf);
}

fn decode_tag(buf: &mut &[u8]) -> Option<(u32, u8)> {
    let tag = decode_varint(buf)?;
    Some(((tag >> 3) as u32, (tag & 0x07) as u8))
}

fn decode_length_delimited<'a>(buf: &mut &'a [u8]) -> Option<&'a [u8]> {
    let len = usize::try_from(decode_varint(buf)?).ok()?;
    if buf.len() < len {
        return None;
    }
    let (data, rest) = buf.split_at(len);
    *buf = rest;
    Some(data)
}

fn decode_fixed64(buf: &mut &[u8]) -> Option<u64> {
    if buf.len() < 8 {
        return None;
    }
    let (data, rest) = buf.split_at(8);
    *buf = rest;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(data);
    Some(u64::from_le_bytes(bytes))
}

fn skip_field(wire_type: u8, buf: &mut &[u8]) -> Option<()> {
    match wire_type {
        WIRE_TYPE_VARINT => {
            decode_varint(buf)?;
        }
        WIRE_TYPE_FIXED64 => {
            decode_fixed64(buf)?;
        }
        WIRE_TYPE_LEN => {
            decode_length_delimited(buf)?;
        }
        WIRE_TYPE_FIXED32 => {
            if buf.len() < 4 {
                return None;
            }
            *buf = &buf[4..];
        }
        _ => return None,
    }
    Some(())
}

fn truncated(message: &str) -> HapticError {
    HapticError::schema(format!("{message} is truncated or malformed"))
}

// ----------------------------------------------------------------------------
// Auth
// ----------------------------------------------------------------------------

/// Authorization sent as the payload of the first subscription frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Auth {
    pub jwt_token: String,
}

impl Auth {
    pub fn new(jwt_token: impl Into<String>) -> Self {
        Self {
            jwt_token: jwt_token.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.jwt_token.len() + 4);
        // proto3 leaves default values off the wire
        if !self.jwt_token.is_empty() {
            encode_tag(1, WIRE_TYPE_LEN, &mut buf);
            encode_varint(self.jwt_token.len() as u64, &mut buf);
            buf.extend_from_slice(self.jwt_token.as_bytes());
        }
        buf
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        let mut auth = Auth::default();
        while !buf.is_empty() {
            let (field, wire_type) = decode_tag(&mut buf).ok_or_else(|| truncated("Auth"))?;
            match (field, wire_type) {
                (1, WIRE_TYPE_LEN) => {
                    let data = decode_length_delimited(&mut buf).ok_or_else(|| truncated("Auth"))?;
                    auth.jwt_token = String::from_utf8(data.to_vec())
                        .map_err(|_| HapticError::schema("Auth token is not valid UTF-8"))?;
                }
                _ => skip_field(wire_type, &mut buf).ok_or_else(|| truncated("Auth"))?,
            }
        }
        Ok(auth)
    }
}

// ----------------------------------------------------------------------------
// Signal
// ----------------------------------------------------------------------------

/// One haptic sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Signal {
    /// Sample time in milliseconds
    pub timestamp_ms: i64,
    pub value: f64,
}

impl Signal {
    pub fn new(timestamp_ms: i64, value: f64) -> Self {
        Self { timestamp_ms, value }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(20);
        if self.timestamp_ms != 0 {
            encode_tag(1, WIRE_TYPE_VARINT, &mut buf);
            // int64 is sign-extended to ten bytes when negative
            encode_varint(self.timestamp_ms as u64, &mut buf);
        }
        if self.value.to_bits() != 0 {
            encode_tag(2, WIRE_TYPE_FIXED64, &mut buf);
            buf.extend_from_slice(&self.value.to_le_bytes());
        }
        buf
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        let mut signal = Signal::default();
        while !buf.is_empty() {
            let (field, wire_type) = decode_tag(&mut buf).ok_or_else(|| truncated("Signal"))?;
            match (field, wire_type) {
                (1, WIRE_TYPE_VARINT) => {
                    let raw = decode_varint(&mut buf).ok_or_else(|| truncated("Signal"))?;
                    signal.timestamp_ms = raw as i64;
                }
                (2, WIRE_TYPE_FIXED64) => {
                    let raw = decode_fixed64(&mut buf).ok_or_else(|| truncated("Signal"))?;
                    signal.value = f64::from_bits(raw);
                }
                _ => skip_field(wire_type, &mut buf).ok_or_else(|| truncated("Signal"))?,
            }
        }
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_wire_form() {
        let encoded = Auth::new("abc").encode();
        assert_eq!(encoded, vec![0x0a, 0x03, b'a', b'b', b'c']);
        assert_eq!(Auth::decode(&encoded).unwrap().jwt_token, "abc");
        assert!(Auth::new("").encode().is_empty());
    }

    #[test]
    fn test_signal_wire_form() {
        let signal = Signal::new(1500, 0.5);
        let encoded = signal.encode();

        let mut expected = vec![0x08, 0xdc, 0x0b, 0x11];
        expected.extend_from_slice(&0.5f64.to_le_bytes());
        assert_eq!(encoded, expected);
        assert_eq!(Signal::decode(&encoded).unwrap(), signal);
    }

    #[test]
    fn test_negative_timestamp() {
        let signal = Signal::new(-42, -1.25);
        let encoded = signal.encode();
        assert_eq!(encoded.len(), 1 + 10 + 1 + 8);
        assert_eq!(Signal::decode(&encoded).unwrap(), signal);
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let mut buf = vec![0x18, 0x05]; // field 3, varint
        buf.extend_from_slice(&[0x22, 0x02, 0xff, 0xff]); // field 4, bytes
        buf.extend_from_slice(&Signal::new(7, 2.0).encode());

        assert_eq!(Signal::decode(&buf).unwrap(), Signal::new(7, 2.0));
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let encoded = Signal::new(7, 2.0).encode();
        let err = Signal::decode(&encoded[..encoded.len() - 1]).unwrap_err();
        assert!(matches!(err, HapticError::Schema { .. }));

        assert!(Auth::decode(&[0x0a, 0x05, b'a']).is_err());
    }
}
