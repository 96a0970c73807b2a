//! Error types for the haptic frame protocol

use quicnet_core::QuicError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Protocol and stream errors
///
/// Frame errors mean the byte stream is desynchronized; the consumer stops on
/// the first one instead of trying to resume.
#[derive(Error, Debug)]
pub enum HapticError {
    #[error("Unknown frame type: {value:#04x}")]
    UnknownFrameType { value: u8 },

    #[error("Invalid frame length: {length}")]
    InvalidFrameLength { length: u16 },

    #[error("Truncated frame: expected {expected} bytes, received {actual}")]
    TruncatedFrame { expected: usize, actual: usize },

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Frame payload is empty")]
    EmptyPayload,

    #[error("Malformed payload: {reason}")]
    Schema { reason: String },

    #[error("Transport error: {0}")]
    Quic(#[from] QuicError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl HapticError {
    pub fn schema<T: Into<String>>(reason: T) -> Self {
        HapticError::Schema {
            reason: reason.into(),
        }
    }

    /// Whether the error means the inbound byte stream can no longer be framed
    pub fn is_protocol_fault(&self) -> bool {
        matches!(
            self,
            HapticError::UnknownFrameType { .. }
                | HapticError::InvalidFrameLength { .. }
                | HapticError::TruncatedFrame { .. }
        )
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = std::result::Result<T, HapticError>;
