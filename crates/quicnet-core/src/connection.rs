//! Connection state machine
//!
//! A connection is created idle, becomes open once the engine hands out a
//! handle, and becomes active when the engine reports it connected. Any
//! shutdown notification makes it inactive. The engine handle is released
//! exactly once, by `close`, by `dispose`, or by dropping the connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info, warn};

use crate::config::{ConnectionSettings, StreamSettings};
use crate::context::QuicContext;
use crate::engine::{ConnectionShutdownFlags, RawHandle};
use crate::error::{QuicError, Result};
use crate::event::ConnectionEvent;
use crate::pending::{Completion, PendingOperation};
use crate::status::QuicStatus;
use crate::stream::{QuicStream, StreamEventHandler, StreamShared};
use crate::sync::lock;

// ----------------------------------------------------------------------------
// Event Handler
// ----------------------------------------------------------------------------

/// Application reactions to connection events
///
/// Called on engine threads after the connection has applied its own state
/// transition. Implementations must not block.
#[allow(unused_variables)]
pub trait ConnectionEventHandler: Send + Sync {
    /// Called when an event callback panicked
    fn unhandled_error(&self, error: &QuicError) {}

    fn connected(&self, session_resumed: bool) -> QuicStatus {
        QuicStatus::Success
    }

    fn shutdown_initiated_by_transport(&self, status: QuicStatus, error_code: u64) -> QuicStatus {
        QuicStatus::Success
    }

    fn shutdown_initiated_by_peer(&self, error_code: u64) -> QuicStatus {
        QuicStatus::Success
    }

    fn shutdown_complete(&self) -> QuicStatus {
        QuicStatus::Success
    }

    fn local_address_changed(&self) -> QuicStatus {
        QuicStatus::Success
    }

    fn peer_address_changed(&self) -> QuicStatus {
        QuicStatus::Success
    }

    fn peer_stream_started(&self) -> QuicStatus {
        QuicStatus::Success
    }

    /// Peer-initiated streams are not accepted unless a handler says so
    fn streams_available(&self, bidirectional: u16, unidirectional: u16) -> QuicStatus {
        QuicStatus::Aborted
    }

    fn peer_needs_streams(&self) -> QuicStatus {
        QuicStatus::Success
    }

    fn ideal_processor_changed(&self) -> QuicStatus {
        QuicStatus::Success
    }

    fn datagram_state_changed(&self) -> QuicStatus {
        QuicStatus::Success
    }

    fn datagram_received(&self) -> QuicStatus {
        QuicStatus::Success
    }

    fn datagram_send_state_changed(&self) -> QuicStatus {
        QuicStatus::Success
    }

    fn resumed(&self) -> QuicStatus {
        QuicStatus::Success
    }

    fn resumption_ticket_received(&self) -> QuicStatus {
        QuicStatus::Success
    }

    fn peer_certificate_received(&self) -> QuicStatus {
        QuicStatus::Success
    }
}

/// Handler that accepts every default reaction
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConnectionHandler;

impl ConnectionEventHandler for NoopConnectionHandler {}

fn forward(handler: &dyn ConnectionEventHandler, event: ConnectionEvent) -> QuicStatus {
    match event {
        ConnectionEvent::Connected { session_resumed } => handler.connected(session_resumed),
        ConnectionEvent::ShutdownInitiatedByTransport { status, error_code } => {
            handler.shutdown_initiated_by_transport(status, error_code)
        }
        ConnectionEvent::ShutdownInitiatedByPeer { error_code } => {
            handler.shutdown_initiated_by_peer(error_code)
        }
        ConnectionEvent::ShutdownComplete => handler.shutdown_complete(),
        ConnectionEvent::LocalAddressChanged => handler.local_address_changed(),
        ConnectionEvent::PeerAddressChanged => handler.peer_address_changed(),
        ConnectionEvent::PeerStreamStarted => handler.peer_stream_started(),
        ConnectionEvent::StreamsAvailable {
            bidirectional,
            unidirectional,
        } => handler.streams_available(bidirectional, unidirectional),
        ConnectionEvent::PeerNeedsStreams => handler.peer_needs_streams(),
        ConnectionEvent::IdealProcessorChanged => handler.ideal_processor_changed(),
        ConnectionEvent::DatagramStateChanged => handler.datagram_state_changed(),
        ConnectionEvent::DatagramReceived => handler.datagram_received(),
        ConnectionEvent::DatagramSendStateChanged => handler.datagram_send_state_changed(),
        ConnectionEvent::Resumed => handler.resumed(),
        ConnectionEvent::ResumptionTicketReceived => handler.resumption_ticket_received(),
        ConnectionEvent::PeerCertificateReceived => handler.peer_certificate_received(),
        ConnectionEvent::Unknown { kind } => {
            warn!("Unknown connection event kind {}", kind);
            QuicStatus::InternalError
        }
    }
}

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Observable lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never opened
    Idle,
    Opening,
    Active,
    /// Open, but not connected or already shutting down
    Inactive,
    Closing,
    Closed,
}

pub(crate) struct ConnectionShared {
    context: QuicContext,
    settings: ConnectionSettings,
    handler: Arc<dyn ConnectionEventHandler>,
    handle: Mutex<Option<RawHandle>>,
    streams: Mutex<Vec<Weak<StreamShared>>>,
    is_open: AtomicBool,
    is_active: AtomicBool,
    closed: AtomicBool,
    open_op: PendingOperation<()>,
    close_op: PendingOperation<()>,
}

impl ConnectionShared {
    pub(crate) fn context(&self) -> &QuicContext {
        &self.context
    }

    pub(crate) fn handle(&self) -> Option<RawHandle> {
        *lock(&self.handle)
    }

    pub(crate) fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Acquire)
    }

    pub(crate) fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Acquire)
    }

    pub(crate) fn adopt_stream(&self, stream: Weak<StreamShared>) {
        let mut streams = lock(&self.streams);
        streams.retain(|existing| existing.strong_count() > 0);
        streams.push(stream);
    }

    pub(crate) fn report_unhandled(&self, error: &QuicError) {
        self.handler.unhandled_error(error);
    }

    fn state(&self) -> ConnectionState {
        if self.close_op.is_pending() {
            ConnectionState::Closing
        } else if self.open_op.is_pending() {
            ConnectionState::Opening
        } else if self.closed.load(Ordering::Acquire) {
            ConnectionState::Closed
        } else if !self.is_open() {
            ConnectionState::Idle
        } else if self.is_active() {
            ConnectionState::Active
        } else {
            ConnectionState::Inactive
        }
    }

    fn open(self: &Arc<Self>) -> Result<Completion<()>> {
        let completion = self.open_op.begin().ok_or(QuicError::AlreadyOpening)?;
        match self.start_open() {
            Ok(()) => Ok(completion),
            Err(err) => {
                self.open_op.clear();
                Err(err)
            }
        }
    }

    fn start_open(self: &Arc<Self>) -> Result<()> {
        let dispatcher = self.context.dispatcher();
        let callback = dispatcher
            .connection_callback()
            .ok_or(QuicError::CallbackNotConfigured { kind: "connection" })?;
        if self.handle().is_some() {
            return Err(QuicError::AlreadyOpen);
        }

        self.is_active.store(false, Ordering::Release);
        self.closed.store(false, Ordering::Release);

        let engine = self.context.engine();
        let handle = engine
            .connection_open(self.context.registration(), callback)
            .map_err(|status| QuicError::transport("ConnectionOpen", status))?;

        *lock(&self.handle) = Some(handle);
        dispatcher.connections.insert(handle, Arc::clone(self));
        // Marked open before starting so inline notifications see a usable connection
        self.is_open.store(true, Ordering::Release);

        let status = engine.connection_start(
            handle,
            self.context.configuration(),
            &self.settings.host,
            self.settings.port,
        );
        if status.is_failure() {
            warn!(
                "Connection start to {}:{} failed with {}",
                self.settings.host, self.settings.port, status
            );
            lock(&self.handle).take();
            dispatcher.connections.remove(handle);
            self.is_open.store(false, Ordering::Release);
            engine.connection_shutdown(handle, ConnectionShutdownFlags::SILENT, 0);
            engine.connection_close(handle);
            return Err(QuicError::transport("ConnectionStart", status));
        }

        info!(
            "Opening connection {} to {}:{}",
            handle, self.settings.host, self.settings.port
        );
        Ok(())
    }

    fn close(&self) -> Result<Completion<()>> {
        let completion = self.close_op.begin().ok_or(QuicError::AlreadyClosing)?;
        let Some(handle) = lock(&self.handle).take() else {
            self.close_op.clear();
            return Err(QuicError::NotOpen);
        };

        info!("Closing connection {}", handle);
        self.is_open.store(false, Ordering::Release);
        self.closed.store(true, Ordering::Release);
        self.release(handle, ConnectionShutdownFlags::NONE);

        if self.open_op.cancel() {
            debug!("Cancelled pending open of connection {}", handle);
        }
        // No notification can be routed once the handle is unregistered
        if self.close_op.resolve(()) {
            debug!("Connection {} closed without shutdown confirmation", handle);
        }
        Ok(completion)
    }

    /// Release every engine resource; safe to call repeatedly
    fn dispose(&self) {
        let streams: Vec<_> = lock(&self.streams).drain(..).collect();
        for stream in streams.iter().filter_map(Weak::upgrade) {
            stream.dispose();
        }

        self.is_open.store(false, Ordering::Release);
        self.closed.store(true, Ordering::Release);
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            debug!("Disposing connection {}", handle);
            self.release(handle, ConnectionShutdownFlags::SILENT);
        }
        self.is_active.store(false, Ordering::Release);
        self.open_op.cancel();
        self.close_op.cancel();
    }

    /// Shut down and close an engine object whose handle was already taken
    ///
    /// The registry entry stays until the engine close returns, so a
    /// shutdown-complete delivered during the call still reaches us.
    fn release(&self, handle: RawHandle, flags: ConnectionShutdownFlags) {
        let engine = self.context.engine();
        engine.connection_shutdown(handle, flags, 0);
        engine.connection_close(handle);

        self.context.dispatcher().connections.remove(handle);
        self.is_active.store(false, Ordering::Release);
    }

    pub(crate) fn on_event(&self, event: ConnectionEvent) -> QuicStatus {
        match &event {
            ConnectionEvent::Connected { .. } => {
                debug!("Connection to {} is active", self.settings.host);
                self.is_active.store(true, Ordering::Release);
                self.open_op.resolve(());
            }
            ConnectionEvent::ShutdownInitiatedByTransport { status, .. } => {
                debug!("Transport shut down connection to {}: {}", self.settings.host, status);
                self.is_active.store(false, Ordering::Release);
                self.open_op.cancel();
            }
            ConnectionEvent::ShutdownInitiatedByPeer { error_code } => {
                debug!("Peer shut down connection to {} with code {}", self.settings.host, error_code);
                self.is_active.store(false, Ordering::Release);
                self.open_op.cancel();
            }
            ConnectionEvent::ShutdownComplete => {
                self.is_active.store(false, Ordering::Release);
                self.open_op.cancel();
                self.close_op.resolve(());
            }
            _ => {}
        }

        forward(self.handler.as_ref(), event)
    }
}

// ----------------------------------------------------------------------------
// Connection
// ----------------------------------------------------------------------------

/// One logical connection to a remote endpoint
pub struct QuicConnection {
    shared: Arc<ConnectionShared>,
}

impl QuicConnection {
    pub(crate) fn new(
        context: QuicContext,
        settings: ConnectionSettings,
        handler: Arc<dyn ConnectionEventHandler>,
    ) -> Self {
        Self {
            shared: Arc::new(ConnectionShared {
                context,
                settings,
                handler,
                handle: Mutex::new(None),
                streams: Mutex::new(Vec::new()),
                is_open: AtomicBool::new(false),
                is_active: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                open_op: PendingOperation::new(),
                close_op: PendingOperation::new(),
            }),
        }
    }

    /// Start connecting
    ///
    /// Fails immediately on a precondition or a synchronous engine failure.
    /// Otherwise the returned completion resolves once the engine reports the
    /// connection established, or is cancelled if it shuts down first.
    pub fn open(&self) -> Result<Completion<()>> {
        self.shared.open()
    }

    /// Shut the connection down and release its engine handle
    pub fn close(&self) -> Result<Completion<()>> {
        self.shared.close()
    }

    /// Release the engine handle from any state; idempotent
    pub fn dispose(&self) {
        self.shared.dispose();
    }

    /// Create an unopened stream on this connection
    pub fn create_stream<H>(&self, settings: StreamSettings, handler: Arc<H>) -> QuicStream
    where
        H: StreamEventHandler + 'static,
    {
        QuicStream::new(Arc::clone(&self.shared), settings, handler)
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn handle(&self) -> Option<RawHandle> {
        self.shared.handle()
    }

    pub fn host(&self) -> &str {
        &self.shared.settings.host
    }

    pub fn port(&self) -> u16 {
        self.shared.settings.port
    }

    pub fn context(&self) -> &QuicContext {
        self.shared.context()
    }
}

impl Drop for QuicConnection {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

impl std::fmt::Debug for QuicConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuicConnection")
            .field("host", &self.shared.settings.host)
            .field("port", &self.shared.settings.port)
            .field("state", &self.shared.state())
            .finish()
    }
}
