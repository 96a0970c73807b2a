//! Error types for the transport binding layer
//!
//! Errors fall into four groups: precondition faults (an operation was called
//! in a state that does not allow it), transport faults (a synchronous engine
//! call failed), asynchronous shutdown (a pending operation was cancelled), and
//! configuration problems. None of them is ever raised on an engine callback
//! thread; callbacks only ever answer with a [`QuicStatus`].

use thiserror::Error;

use crate::status::QuicStatus;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors surfaced by connections, streams and their collaborators
#[derive(Error, Debug)]
pub enum QuicError {
    #[error("Already opening")]
    AlreadyOpening,

    #[error("Already open")]
    AlreadyOpen,

    #[error("Already closing")]
    AlreadyClosing,

    #[error("Not open")]
    NotOpen,

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Connection is not active")]
    ConnectionInactive,

    #[error("Stream is closed")]
    StreamClosed,

    #[error("Stream is not active")]
    StreamInactive,

    #[error("No {kind} event callback is configured")]
    CallbackNotConfigured { kind: &'static str },

    #[error("Engine call {operation} failed: {status}")]
    Transport {
        operation: &'static str,
        status: QuicStatus,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Receive buffer is closed")]
    BufferClosed,

    #[error("Event handler panicked: {message}")]
    HandlerPanicked { message: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerializing(#[from] toml::ser::Error),
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl QuicError {
    /// Create a transport error for a failed engine call
    pub fn transport(operation: &'static str, status: QuicStatus) -> Self {
        QuicError::Transport { operation, status }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        QuicError::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether the error reports an operation called in the wrong state
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            QuicError::AlreadyOpening
                | QuicError::AlreadyOpen
                | QuicError::AlreadyClosing
                | QuicError::NotOpen
                | QuicError::ConnectionClosed
                | QuicError::ConnectionInactive
                | QuicError::StreamClosed
                | QuicError::StreamInactive
                | QuicError::CallbackNotConfigured { .. }
        )
    }

    /// Whether a pending operation was cancelled by a shutdown
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QuicError::Cancelled)
    }

    /// Engine status carried by a transport fault
    pub fn status(&self) -> Option<QuicStatus> {
        match self {
            QuicError::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = std::result::Result<T, QuicError>;
