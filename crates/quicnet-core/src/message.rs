use bytes::Bytes;

use crate::token::CompletionToken;

/// Outbound buffer tracked until the engine reports its send complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuicMessage {
    buffer: Bytes,
    token: Option<CompletionToken>,
}

impl QuicMessage {
    pub fn new(buffer: impl Into<Bytes>) -> Self {
        Self {
            buffer: buffer.into(),
            token: None,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.buffer
    }

    /// Token correlating this message with its send completion, once issued
    pub fn token(&self) -> Option<CompletionToken> {
        self.token
    }

    pub(crate) fn attach(&mut self, token: CompletionToken) {
        self.token = Some(token);
    }
}

impl From<Bytes> for QuicMessage {
    fn from(buffer: Bytes) -> Self {
        Self::new(buffer)
    }
}

impl From<Vec<u8>> for QuicMessage {
    fn from(buffer: Vec<u8>) -> Self {
        Self::new(buffer)
    }
}
