//! Status codes exchanged with the transport engine
//!
//! Every engine call that can fail reports one of these codes, and every event
//! callback answers the engine with one. Only [`QuicStatus::Success`] counts as
//! success; anything else is treated as a failure by the binding layer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QuicError, Result};

// ----------------------------------------------------------------------------
// Status Codes
// ----------------------------------------------------------------------------

/// Engine status code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuicStatus {
    #[default]
    Success,
    Pending,
    Continue,
    OutOfMemory,
    InvalidParameter,
    InvalidState,
    NotSupported,
    NotFound,
    BufferTooSmall,
    HandshakeFailure,
    Aborted,
    AddressInUse,
    InvalidAddress,
    ConnectionTimeout,
    ConnectionIdle,
    Unreachable,
    InternalError,
    ConnectionRefused,
    ProtocolError,
    VerNegError,
    TlsError,
    UserCanceled,
    AlpnNegFailure,
    StreamLimitReached,
    AlpnInUse,
    CloseNotify,
    BadCertificate,
    UnsupportedCertificate,
    RevokedCertificate,
    ExpiredCertificate,
    UnknownCertificate,
    RequiredCertificate,
    CertExpired,
    CertUntrustedRoot,
    CertNoCert,
    AddressNotAvailable,
}

impl QuicStatus {
    /// Whether this status reports success
    pub fn is_success(self) -> bool {
        self == QuicStatus::Success
    }

    /// Whether this status reports any kind of failure
    pub fn is_failure(self) -> bool {
        !self.is_success()
    }

    /// Convert the status of an engine call into a result
    pub fn into_result(self, operation: &'static str) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(QuicError::transport(operation, self))
        }
    }

    /// Stable upper-case name, matching the engine's own naming
    pub fn name(self) -> &'static str {
        match self {
            QuicStatus::Success => "SUCCESS",
            QuicStatus::Pending => "PENDING",
            QuicStatus::Continue => "CONTINUE",
            QuicStatus::OutOfMemory => "OUT_OF_MEMORY",
            QuicStatus::InvalidParameter => "INVALID_PARAMETER",
            QuicStatus::InvalidState => "INVALID_STATE",
            QuicStatus::NotSupported => "NOT_SUPPORTED",
            QuicStatus::NotFound => "NOT_FOUND",
            QuicStatus::BufferTooSmall => "BUFFER_TOO_SMALL",
            QuicStatus::HandshakeFailure => "HANDSHAKE_FAILURE",
            QuicStatus::Aborted => "ABORTED",
            QuicStatus::AddressInUse => "ADDRESS_IN_USE",
            QuicStatus::InvalidAddress => "INVALID_ADDRESS",
            QuicStatus::ConnectionTimeout => "CONNECTION_TIMEOUT",
            QuicStatus::ConnectionIdle => "CONNECTION_IDLE",
            QuicStatus::Unreachable => "UNREACHABLE",
            QuicStatus::InternalError => "INTERNAL_ERROR",
            QuicStatus::ConnectionRefused => "CONNECTION_REFUSED",
            QuicStatus::ProtocolError => "PROTOCOL_ERROR",
            QuicStatus::VerNegError => "VER_NEG_ERROR",
            QuicStatus::TlsError => "TLS_ERROR",
            QuicStatus::UserCanceled => "USER_CANCELED",
            QuicStatus::AlpnNegFailure => "ALPN_NEG_FAILURE",
            QuicStatus::StreamLimitReached => "STREAM_LIMIT_REACHED",
            QuicStatus::AlpnInUse => "ALPN_IN_USE",
            QuicStatus::CloseNotify => "CLOSE_NOTIFY",
            QuicStatus::BadCertificate => "BAD_CERTIFICATE",
            QuicStatus::UnsupportedCertificate => "UNSUPPORTED_CERTIFICATE",
            QuicStatus::RevokedCertificate => "REVOKED_CERTIFICATE",
            QuicStatus::ExpiredCertificate => "EXPIRED_CERTIFICATE",
            QuicStatus::UnknownCertificate => "UNKNOWN_CERTIFICATE",
            QuicStatus::RequiredCertificate => "REQUIRED_CERTIFICATE",
            QuicStatus::CertExpired => "CERT_EXPIRED",
            QuicStatus::CertUntrustedRoot => "CERT_UNTRUSTED_ROOT",
            QuicStatus::CertNoCert => "CERT_NO_CERT",
            QuicStatus::AddressNotAvailable => "ADDRESS_NOT_AVAILABLE",
        }
    }
}

impl fmt::Display for QuicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
