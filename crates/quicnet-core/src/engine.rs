//! Transport engine seam
//!
//! The native QUIC engine is modelled as a trait object. Every object the
//! engine allocates is identified by an opaque [`RawHandle`], and every event it
//! delivers goes through one of the two process-wide callbacks installed when
//! the object is opened.

use std::fmt;
use std::num::NonZeroU64;
use std::ops::BitOr;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::event::{ConnectionEvent, StreamEvent};
use crate::status::QuicStatus;

// ----------------------------------------------------------------------------
// Handles
// ----------------------------------------------------------------------------

/// Opaque engine object identifier
///
/// Handles are never zero, so `Option<RawHandle>` costs nothing and doubles as
/// the "no native object" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(NonZeroU64);

impl RawHandle {
    /// Wrap a raw value; zero is not a valid handle
    pub fn new(value: u64) -> Option<Self> {
        NonZeroU64::new(value).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

// ----------------------------------------------------------------------------
// Callbacks
// ----------------------------------------------------------------------------

/// Callback the engine invokes for every connection event
pub type ConnectionCallback = Arc<dyn Fn(RawHandle, ConnectionEvent) -> QuicStatus + Send + Sync>;

/// Callback the engine invokes for every stream event
pub type StreamCallback = Arc<dyn Fn(RawHandle, StreamEvent) -> QuicStatus + Send + Sync>;

// ----------------------------------------------------------------------------
// Flags
// ----------------------------------------------------------------------------

macro_rules! engine_flags {
    ($(#[$meta:meta])* $name:ident { $($flag:ident = $value:expr),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            $(pub const $flag: Self = Self($value);)*

            pub fn bits(self) -> u32 {
                self.0
            }

            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

engine_flags!(
    /// Flags for shutting down a connection
    ConnectionShutdownFlags { NONE = 0, SILENT = 1 }
);

engine_flags!(
    /// Flags for shutting down a stream
    StreamShutdownFlags {
        NONE = 0,
        GRACEFUL = 1,
        ABORT_SEND = 2,
        ABORT_RECEIVE = 4,
        ABORT = 6,
        IMMEDIATE = 8,
    }
);

engine_flags!(
    /// Flags for opening a stream
    StreamOpenFlags { NONE = 0, UNIDIRECTIONAL = 1, ZERO_RTT = 2 }
);

engine_flags!(
    /// Flags for starting a stream
    StreamStartFlags {
        NONE = 0,
        IMMEDIATE = 1,
        FAIL_BLOCKED = 2,
        SHUTDOWN_ON_FAIL = 4,
    }
);

engine_flags!(
    /// Flags for a single send
    SendFlags { NONE = 0, ALLOW_0_RTT = 1, START = 2, FIN = 4 }
);

engine_flags!(
    /// Flags for the credential attached to a configuration
    CredentialFlags {
        NONE = 0,
        CLIENT = 1,
        NO_CERTIFICATE_VALIDATION = 4,
    }
);

// ----------------------------------------------------------------------------
// Configuration Parameters
// ----------------------------------------------------------------------------

/// Parameters for opening a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationParams {
    pub alpn: String,
    pub peer_bidi_stream_count: u16,
    pub peer_unidi_stream_count: u16,
    pub credential_flags: CredentialFlags,
}

// ----------------------------------------------------------------------------
// Engine Trait
// ----------------------------------------------------------------------------

/// Synchronous surface of a native QUIC engine
///
/// Calls report failures as a [`QuicStatus`]. Events for an object may be
/// delivered on any engine thread, including the calling thread while a call
/// is still in progress, so implementors must not hold locks across callback
/// invocations.
pub trait TransportEngine: Send + Sync {
    fn registration_open(&self, app_name: &str) -> Result<RawHandle, QuicStatus>;

    fn registration_close(&self, registration: RawHandle);

    fn configuration_open(
        &self,
        registration: RawHandle,
        params: &ConfigurationParams,
    ) -> Result<RawHandle, QuicStatus>;

    fn configuration_close(&self, configuration: RawHandle);

    fn connection_open(
        &self,
        registration: RawHandle,
        callback: ConnectionCallback,
    ) -> Result<RawHandle, QuicStatus>;

    fn connection_start(
        &self,
        connection: RawHandle,
        configuration: RawHandle,
        host: &str,
        port: u16,
    ) -> QuicStatus;

    fn connection_shutdown(
        &self,
        connection: RawHandle,
        flags: ConnectionShutdownFlags,
        error_code: u64,
    );

    fn connection_close(&self, connection: RawHandle);

    fn stream_open(
        &self,
        connection: RawHandle,
        flags: StreamOpenFlags,
        callback: StreamCallback,
    ) -> Result<RawHandle, QuicStatus>;

    fn stream_start(&self, stream: RawHandle, flags: StreamStartFlags) -> QuicStatus;

    /// Queue a buffer for sending; `context` comes back in `SendComplete`
    fn stream_send(&self, stream: RawHandle, buffer: Bytes, flags: SendFlags, context: u64) -> QuicStatus;

    fn stream_shutdown(&self, stream: RawHandle, flags: StreamShutdownFlags, error_code: u64) -> QuicStatus;

    fn stream_close(&self, stream: RawHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_not_a_handle() {
        assert!(RawHandle::new(0).is_none());
        assert_eq!(RawHandle::new(42).map(RawHandle::get), Some(42));
    }

    #[test]
    fn test_flags_combine() {
        let flags = CredentialFlags::CLIENT | CredentialFlags::NO_CERTIFICATE_VALIDATION;
        assert_eq!(flags.bits(), 5);
        assert!(flags.contains(CredentialFlags::CLIENT));
        assert!(!StreamShutdownFlags::ABORT_SEND.contains(StreamShutdownFlags::ABORT));
    }
}
