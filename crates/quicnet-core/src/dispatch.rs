//! Dispatch table
//!
//! Routes raw engine notifications to the connection or stream that owns the
//! handle. Each context owns one dispatcher; the callbacks it hands to the
//! engine only hold a weak reference back to it, so a dropped context never
//! outlives itself through the engine.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock, Weak};

use tracing::{debug, error, warn};

use crate::connection::ConnectionShared;
use crate::engine::{ConnectionCallback, RawHandle, StreamCallback};
use crate::error::QuicError;
use crate::event::{ConnectionEvent, StreamEvent};
use crate::registry::HandleRegistry;
use crate::status::QuicStatus;
use crate::stream::StreamShared;

/// Routing table from engine handles to state machines
pub struct Dispatcher {
    pub(crate) connections: HandleRegistry<Arc<ConnectionShared>>,
    pub(crate) streams: HandleRegistry<Arc<StreamShared>>,
    connection_callback: RwLock<Option<ConnectionCallback>>,
    stream_callback: RwLock<Option<StreamCallback>>,
}

impl Dispatcher {
    /// Create a dispatcher with its routing callbacks installed
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Dispatcher>| {
            let connections = weak.clone();
            let streams = weak.clone();

            let connection_callback: ConnectionCallback =
                Arc::new(move |handle: RawHandle, event: ConnectionEvent| match connections.upgrade() {
                    Some(dispatcher) => dispatcher.dispatch_connection_event(handle, event),
                    None => QuicStatus::InternalError,
                });
            let stream_callback: StreamCallback =
                Arc::new(move |handle: RawHandle, event: StreamEvent| match streams.upgrade() {
                    Some(dispatcher) => dispatcher.dispatch_stream_event(handle, event),
                    None => QuicStatus::InternalError,
                });

            Dispatcher {
                connections: HandleRegistry::new(),
                streams: HandleRegistry::new(),
                connection_callback: RwLock::new(Some(connection_callback)),
                stream_callback: RwLock::new(Some(stream_callback)),
            }
        })
    }

    // ----------------------------------------------------------------------------
    // Routing
    // ----------------------------------------------------------------------------

    /// Route a connection notification; unknown handles get `InternalError`
    pub fn dispatch_connection_event(&self, handle: RawHandle, event: ConnectionEvent) -> QuicStatus {
        let Some(connection) = self.connections.lookup(handle) else {
            debug!("Dropping {} for unregistered connection {}", event.kind(), handle);
            return QuicStatus::InternalError;
        };

        let kind = event.kind();
        match panic::catch_unwind(AssertUnwindSafe(|| connection.on_event(event))) {
            Ok(status) => status,
            Err(payload) => {
                let err = handler_panicked(payload);
                error!("Connection {} handler failed on {}: {}", handle, kind, err);
                report(|| connection.report_unhandled(&err));
                QuicStatus::InternalError
            }
        }
    }

    /// Route a stream notification; unknown handles get `InternalError`
    pub fn dispatch_stream_event(&self, handle: RawHandle, event: StreamEvent) -> QuicStatus {
        let Some(stream) = self.streams.lookup(handle) else {
            debug!("Dropping {} for unregistered stream {}", event.kind(), handle);
            return QuicStatus::InternalError;
        };

        let kind = event.kind();
        match panic::catch_unwind(AssertUnwindSafe(|| stream.on_event(event))) {
            Ok(status) => status,
            Err(payload) => {
                let err = handler_panicked(payload);
                error!("Stream {} handler failed on {}: {}", handle, kind, err);
                report(|| stream.report_unhandled(&err));
                QuicStatus::InternalError
            }
        }
    }

    // ----------------------------------------------------------------------------
    // Callback Configuration
    // ----------------------------------------------------------------------------

    /// Callback handed to the engine when a connection is opened
    pub fn connection_callback(&self) -> Option<ConnectionCallback> {
        self.connection_callback
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Callback handed to the engine when a stream is opened
    pub fn stream_callback(&self) -> Option<StreamCallback> {
        self.stream_callback
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace or remove the connection callback
    ///
    /// Without a callback, connections refuse to open.
    pub fn set_connection_callback(&self, callback: Option<ConnectionCallback>) {
        *self
            .connection_callback
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = callback;
    }

    pub fn set_stream_callback(&self, callback: Option<StreamCallback>) {
        *self
            .stream_callback
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = callback;
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn is_connection_registered(&self, handle: RawHandle) -> bool {
        self.connections.contains(handle)
    }

    pub fn is_stream_registered(&self, handle: RawHandle) -> bool {
        self.streams.contains(handle)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("connections", &self.connections.len())
            .field("streams", &self.streams.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Panic Containment
// ----------------------------------------------------------------------------

pub(crate) fn handler_panicked(payload: Box<dyn Any + Send>) -> QuicError {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    };
    QuicError::HandlerPanicked { message }
}

/// Run a handler hook that must not unwind into the engine
pub(crate) fn report<F: FnOnce()>(hook: F) {
    if panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
        warn!("Unhandled error hook panicked");
    }
}
