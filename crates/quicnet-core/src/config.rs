//! Transport binding configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{CredentialFlags, StreamOpenFlags, StreamStartFlags};
use crate::error::{QuicError, Result};

// ----------------------------------------------------------------------------
// QUIC Settings
// ----------------------------------------------------------------------------

/// Application protocol version negotiated through ALPN
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuicVersion {
    #[default]
    Default,
    Version1,
    Version2,
}

impl QuicVersion {
    pub fn alpn(self) -> &'static str {
        match self {
            QuicVersion::Default => "h3",
            QuicVersion::Version1 => "h3-01",
            QuicVersion::Version2 => "h3-02",
        }
    }
}

/// Settings for the registration and configuration shared by all connections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuicSettings {
    /// Application name reported to the engine
    pub app_name: String,
    pub version: QuicVersion,
    /// Overrides the version's ALPN when non-empty
    pub custom_alpn: String,
    pub credential_flags: CredentialFlags,
    pub peer_bidi_stream_count: u16,
    pub peer_unidi_stream_count: u16,
}

impl Default for QuicSettings {
    fn default() -> Self {
        Self {
            app_name: "quicnet".to_string(),
            version: QuicVersion::Default,
            custom_alpn: String::new(),
            credential_flags: CredentialFlags::CLIENT,
            peer_bidi_stream_count: 1,
            peer_unidi_stream_count: 3,
        }
    }
}

impl QuicSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn with_version(mut self, version: QuicVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_custom_alpn(mut self, alpn: impl Into<String>) -> Self {
        self.custom_alpn = alpn.into();
        self
    }

    pub fn with_credential_flags(mut self, flags: CredentialFlags) -> Self {
        self.credential_flags = flags;
        self
    }

    /// Disable server certificate validation
    pub fn without_certificate_validation(mut self) -> Self {
        self.credential_flags = self.credential_flags | CredentialFlags::NO_CERTIFICATE_VALIDATION;
        self
    }

    /// ALPN offered during the handshake
    pub fn resolve_alpn(&self) -> &str {
        if self.custom_alpn.is_empty() {
            self.version.alpn()
        } else {
            &self.custom_alpn
        }
    }
}

// ----------------------------------------------------------------------------
// Connection and Stream Settings
// ----------------------------------------------------------------------------

pub const DEFAULT_PORT: u16 = 443;

/// Remote endpoint of a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
        }
    }
}

impl ConnectionSettings {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(QuicError::config_error("Connection host must not be empty"));
        }
        if self.port == 0 {
            return Err(QuicError::config_error("Connection port must be greater than 0"));
        }
        Ok(())
    }
}

/// Flags used when opening and starting a stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub open_flags: StreamOpenFlags,
    pub start_flags: StreamStartFlags,
}

impl StreamSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_open_flags(mut self, flags: StreamOpenFlags) -> Self {
        self.open_flags = flags;
        self
    }

    pub fn with_start_flags(mut self, flags: StreamStartFlags) -> Self {
        self.start_flags = flags;
        self
    }
}

// ----------------------------------------------------------------------------
// Receive Buffer Settings
// ----------------------------------------------------------------------------

/// Configuration for blocking reads from a receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveBufferConfig {
    /// Upper bound for a single blocking read, in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for ReceiveBufferConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 1000,
        }
    }
}

impl ReceiveBufferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        // Saturates; anything past u64::MAX ms means wait without a deadline
        self.read_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

// ----------------------------------------------------------------------------
// Aggregate Configuration
// ----------------------------------------------------------------------------

/// Complete configuration, as loaded from a TOML file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuicNetConfig {
    pub quic: QuicSettings,
    pub connection: ConnectionSettings,
    pub stream: StreamSettings,
    pub receive_buffer: ReceiveBufferConfig,
}

impl QuicNetConfig {
    /// Parse from TOML text; missing sections take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: QuicNetConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;

        if self.receive_buffer.read_timeout_ms == 0 {
            return Err(QuicError::config_error(
                "Receive buffer read timeout must be greater than 0",
            ));
        }

        if self.quic.resolve_alpn().len() > u8::MAX as usize {
            return Err(QuicError::config_error("ALPN must be at most 255 bytes"));
        }

        Ok(())
    }
}
