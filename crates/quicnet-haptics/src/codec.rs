//! Streaming frame codec
//!
//! Decoding pulls exactly the bytes of one frame from a [`FrameSource`]: one
//! type octet, two length octets, then the payload. A source that cannot
//! supply the requested bytes in time yields a short read, which surfaces as
//! [`HapticError::TruncatedFrame`].

use bytes::Bytes;
use quicnet_core::ReceiveBuffer;

use crate::error::{HapticError, Result};
use crate::frame::{FrameType, HapticFrame, HEADER_LENGTH, MAX_FRAME_LENGTH};

/// Blocking byte source for the decoder
pub trait FrameSource {
    /// Fill as much of `buf` as the source can; returns the bytes copied
    fn read_into(&mut self, buf: &mut [u8]) -> usize;
}

impl FrameSource for &ReceiveBuffer {
    fn read_into(&mut self, buf: &mut [u8]) -> usize {
        self.read_default(buf)
    }
}

impl FrameSource for &[u8] {
    fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let data: &[u8] = *self;
        let count = buf.len().min(data.len());
        let (head, rest) = data.split_at(count);
        buf[..count].copy_from_slice(head);
        *self = rest;
        count
    }
}

fn read_exact<S: FrameSource + ?Sized>(source: &mut S, buf: &mut [u8]) -> Result<()> {
    let actual = source.read_into(buf);
    if actual < buf.len() {
        return Err(HapticError::TruncatedFrame {
            expected: buf.len(),
            actual,
        });
    }
    Ok(())
}

/// Decode the next frame from `source`
pub fn decode_frame<S: FrameSource + ?Sized>(source: &mut S) -> Result<HapticFrame> {
    let mut type_octet = [0u8; 1];
    read_exact(source, &mut type_octet)?;
    let frame_type = FrameType::try_from(type_octet[0])?;

    let mut length_octets = [0u8; 2];
    read_exact(source, &mut length_octets)?;
    let length = u16::from_le_bytes(length_octets);
    let total = usize::from(length);
    if total <= HEADER_LENGTH || total > MAX_FRAME_LENGTH {
        return Err(HapticError::InvalidFrameLength { length });
    }

    let mut payload = vec![0u8; total - HEADER_LENGTH];
    read_exact(source, &mut payload)?;

    HapticFrame::new(frame_type, payload)
}

/// Decode exactly one frame from the front of `bytes`
pub fn decode(mut bytes: &[u8]) -> Result<HapticFrame> {
    decode_frame(&mut bytes)
}

/// Decode back-to-back frames until `bytes` is exhausted
pub fn decode_all(mut bytes: &[u8]) -> Result<Vec<HapticFrame>> {
    let mut frames = Vec::new();
    while !bytes.is_empty() {
        frames.push(decode_frame(&mut bytes)?);
    }
    Ok(frames)
}

/// Encode a frame directly from its parts
pub fn encode(frame_type: FrameType, payload: impl Into<Bytes>) -> Result<Bytes> {
    Ok(HapticFrame::new(frame_type, payload)?.encode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_decode_example_bytes() {
        let frame = decode(&[0x01, 0x06, 0x00, 0x01, 0x02, 0x03]).unwrap();
        assert_eq!(frame.frame_type(), FrameType::Subscription);
        assert_eq!(frame.payload().as_ref(), &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_unknown_type() {
        let err = decode(&[0x00, 0x04, 0x00, 0xff]).unwrap_err();
        assert!(matches!(err, HapticError::UnknownFrameType { value: 0 }));

        let err = decode(&[0x07, 0x04, 0x00, 0xff]).unwrap_err();
        assert!(matches!(err, HapticError::UnknownFrameType { value: 7 }));
    }

    #[test]
    fn test_invalid_lengths() {
        for length in [0u16, 1, 2, 3, 1025, u16::MAX] {
            let [lo, hi] = length.to_le_bytes();
            let err = decode(&[0x02, lo, hi, 0x00]).unwrap_err();
            assert!(
                matches!(err, HapticError::InvalidFrameLength { length: l } if l == length),
                "length {length} gave {err}"
            );
        }
    }

    #[test]
    fn test_truncated_frames() {
        assert!(matches!(
            decode(&[]),
            Err(HapticError::TruncatedFrame {
                expected: 1,
                actual: 0
            })
        ));
        assert!(matches!(
            decode(&[0x02, 0x06]),
            Err(HapticError::TruncatedFrame {
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(
            decode(&[0x02, 0x06, 0x00, 0x01]),
            Err(HapticError::TruncatedFrame {
                expected: 3,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_decode_all_back_to_back() {
        let mut bytes = encode(FrameType::Subscription, vec![9]).unwrap().to_vec();
        bytes.extend_from_slice(&encode(FrameType::Signal, vec![1, 2]).unwrap());

        let frames = decode_all(&bytes).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].frame_type(), FrameType::Signal);
        assert_eq!(frames[1].payload().as_ref(), &[1, 2]);
    }

    #[test]
    fn test_decode_from_receive_buffer() {
        let buffer = ReceiveBuffer::new(
            quicnet_core::ReceiveBufferConfig::new().with_read_timeout(Duration::from_millis(20)),
        );
        buffer.write(&[0x02, 0x05]).unwrap();
        buffer.write(&[0x00, 0xaa]).unwrap();
        buffer.write(&[0xbb]).unwrap();

        let frame = decode_frame(&mut &buffer).unwrap();
        assert_eq!(frame.payload().as_ref(), &[0xaa, 0xbb]);

        // Nothing left: the read times out short
        assert!(matches!(
            decode_frame(&mut &buffer),
            Err(HapticError::TruncatedFrame { actual: 0, .. })
        ));
    }
}
