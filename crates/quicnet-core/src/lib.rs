//! QuicNet Core
//!
//! Binding layer between a callback-driven QUIC engine and async Rust. The
//! engine is reached through [`TransportEngine`] and reports progress through
//! notifications on its own threads; this crate routes those notifications to
//! connection and stream state machines and exposes `open`, `close` and `send`
//! as operations whose completion can be awaited.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod connection;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod message;
pub mod pending;
pub mod receive_buffer;
pub mod registry;
pub mod status;
pub mod stream;
pub mod token;

mod sync;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{
    ConnectionSettings, QuicNetConfig, QuicSettings, QuicVersion, ReceiveBufferConfig, StreamSettings,
    DEFAULT_PORT,
};
pub use connection::{ConnectionEventHandler, ConnectionState, NoopConnectionHandler, QuicConnection};
pub use context::QuicContext;
pub use dispatch::Dispatcher;
pub use engine::{
    ConfigurationParams, ConnectionCallback, ConnectionShutdownFlags, CredentialFlags, RawHandle,
    SendFlags, StreamCallback, StreamOpenFlags, StreamShutdownFlags, StreamStartFlags, TransportEngine,
};
pub use error::{QuicError, Result};
pub use event::{ConnectionEvent, ReceiveBuffers, StreamEvent};
pub use message::QuicMessage;
pub use pending::{Completion, PendingOperation};
pub use receive_buffer::ReceiveBuffer;
pub use registry::HandleRegistry;
pub use status::QuicStatus;
pub use stream::{NoopStreamHandler, QuicStream, StreamEventHandler, StreamHandle, UNCORRELATED_MESSAGE_ID};
pub use token::{CompletionToken, TokenTable};
