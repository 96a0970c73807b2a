//! Haptic stream configuration

use std::time::Duration;

use quicnet_core::ReceiveBufferConfig;
use serde::{Deserialize, Serialize};

/// Configuration for a haptic stream's receive side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HapticStreamConfig {
    pub receive_buffer: ReceiveBufferConfig,
    /// Name given to the frame consumer thread
    pub consumer_thread_name: String,
}

impl Default for HapticStreamConfig {
    fn default() -> Self {
        Self {
            receive_buffer: ReceiveBufferConfig::default(),
            consumer_thread_name: "haptic-consumer".to_string(),
        }
    }
}

impl HapticStreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_receive_buffer(mut self, config: ReceiveBufferConfig) -> Self {
        self.receive_buffer = config;
        self
    }

    /// Set how long the consumer waits for the rest of a partial frame
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.receive_buffer = self.receive_buffer.with_read_timeout(timeout);
        self
    }

    pub fn with_consumer_thread_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_thread_name = name.into();
        self
    }
}
