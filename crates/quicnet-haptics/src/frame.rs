//! Haptic frames
//!
//! Wire form: `[type: u8][total length: u16 LE][payload]`, where the total
//! length counts the three header bytes and never exceeds 1024.

use bytes::{BufMut, Bytes, BytesMut};
use quicnet_core::QuicMessage;

use crate::error::{HapticError, Result};
use crate::schema::{Auth, Signal};

pub const HEADER_LENGTH: usize = 3;
pub const MAX_DATA_LENGTH: usize = 1021;
pub const MAX_FRAME_LENGTH: usize = 1024;

// ----------------------------------------------------------------------------
// Frame Type
// ----------------------------------------------------------------------------

/// Frame type octet; zero is reserved and never valid on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Subscription = 1,
    Signal = 2,
}

impl TryFrom<u8> for FrameType {
    type Error = HapticError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(FrameType::Subscription),
            2 => Ok(FrameType::Signal),
            _ => Err(HapticError::UnknownFrameType { value }),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(frame_type: FrameType) -> u8 {
        frame_type as u8
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One immutable application frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HapticFrame {
    frame_type: FrameType,
    payload: Bytes,
}

impl HapticFrame {
    /// Build a frame with a payload of 1 to 1021 bytes
    ///
    /// A total length of 3 is rejected by decoders, so empty payloads are
    /// refused here as well.
    pub fn new(frame_type: FrameType, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.is_empty() {
            return Err(HapticError::EmptyPayload);
        }
        if payload.len() > MAX_DATA_LENGTH {
            return Err(HapticError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_DATA_LENGTH,
            });
        }
        Ok(Self { frame_type, payload })
    }

    /// Subscription frame carrying an authorization token
    pub fn subscription(auth: &Auth) -> Result<Self> {
        Self::new(FrameType::Subscription, auth.encode())
    }

    pub fn signal(signal: &Signal) -> Result<Self> {
        Self::new(FrameType::Signal, signal.encode())
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Total length on the wire, header included
    pub fn encoded_len(&self) -> usize {
        HEADER_LENGTH + self.payload.len()
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u8(self.frame_type.into());
        // Payload length is capped at construction, so the total fits
        buf.put_u16_le(self.encoded_len() as u16);
        buf.put_slice(&self.payload);
    }

    /// Encoded frame as an outbound stream message
    pub fn to_message(&self) -> QuicMessage {
        QuicMessage::new(self.encode())
    }

    /// Decode the nested signal sample of a signal frame
    pub fn as_signal(&self) -> Result<Signal> {
        if self.frame_type != FrameType::Signal {
            return Err(HapticError::schema(format!(
                "Expected a signal frame, found {:?}",
                self.frame_type
            )));
        }
        Signal::decode(&self.payload)
    }

    pub fn as_auth(&self) -> Result<Auth> {
        if self.frame_type != FrameType::Subscription {
            return Err(HapticError::schema(format!(
                "Expected a subscription frame, found {:?}",
                self.frame_type
            )));
        }
        Auth::decode(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_example_bytes() {
        let frame = HapticFrame::new(FrameType::Subscription, vec![0x01, 0x02, 0x03]).unwrap();
        assert_eq!(
            frame.encode().as_ref(),
            &[0x01, 0x06, 0x00, 0x01, 0x02, 0x03]
        );
        assert_eq!(frame.to_message().len(), 6);
    }

    #[test]
    fn test_payload_limit() {
        assert!(HapticFrame::new(FrameType::Signal, vec![0u8; MAX_DATA_LENGTH]).is_ok());
        assert!(matches!(
            HapticFrame::new(FrameType::Signal, Vec::new()),
            Err(HapticError::EmptyPayload)
        ));

        let err = HapticFrame::new(FrameType::Signal, vec![0u8; MAX_DATA_LENGTH + 1]).unwrap_err();
        assert!(matches!(
            err,
            HapticError::PayloadTooLarge {
                size: 1022,
                max: 1021
            }
        ));
    }

    #[test]
    fn test_max_frame_length_field() {
        let frame = HapticFrame::new(FrameType::Signal, vec![0xaa; MAX_DATA_LENGTH]).unwrap();
        let encoded = frame.encode();
        assert_eq!(encoded.len(), MAX_FRAME_LENGTH);
        assert_eq!(u16::from_le_bytes([encoded[1], encoded[2]]), 1024);
    }

    #[test]
    fn test_frame_type_octets() {
        assert_eq!(FrameType::try_from(1).unwrap(), FrameType::Subscription);
        assert_eq!(FrameType::try_from(2).unwrap(), FrameType::Signal);
        assert!(matches!(
            FrameType::try_from(0),
            Err(HapticError::UnknownFrameType { value: 0 })
        ));
    }

    #[test]
    fn test_nested_schemas() {
        let signal = Signal::new(1_700_000_000_000, 0.75);
        let frame = HapticFrame::signal(&signal).unwrap();
        assert_eq!(frame.as_signal().unwrap(), signal);
        assert!(frame.as_auth().is_err());

        let auth = Auth::new("token");
        let frame = HapticFrame::subscription(&auth).unwrap();
        assert_eq!(frame.as_auth().unwrap(), auth);
        assert!(frame.as_signal().is_err());
    }
}
