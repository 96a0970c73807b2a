//! Stream state machine
//!
//! A stream lives inside an open, active connection. It becomes active when
//! the engine confirms its start, tracks every outbound message until the
//! engine reports the send complete, and forwards received bytes to its
//! handler in arrival order.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use dashmap::DashMap;
use tracing::{debug, info, trace, warn};

use crate::config::StreamSettings;
use crate::connection::ConnectionShared;
use crate::dispatch::report;
use crate::engine::{RawHandle, SendFlags, StreamShutdownFlags};
use crate::error::{QuicError, Result};
use crate::event::StreamEvent;
use crate::message::QuicMessage;
use crate::pending::{Completion, PendingOperation};
use crate::status::QuicStatus;
use crate::sync::lock;
use crate::token::{CompletionToken, TokenTable};

// ----------------------------------------------------------------------------
// Event Handler
// ----------------------------------------------------------------------------

/// Message id reported for send completions that match no outstanding send
///
/// Ids handed out by `send` start at 1.
pub const UNCORRELATED_MESSAGE_ID: u64 = 0;

/// Application reactions to stream events
///
/// Event methods run on engine threads after the stream applied its own
/// transition, and their status is returned to the engine. They must not
/// block.
#[allow(unused_variables)]
pub trait StreamEventHandler: Send + Sync {
    /// The stream was opened and its start was requested
    fn open_initiated(&self, stream: &StreamHandle) {}

    /// The stream handle was released by `close`
    fn close_initiated(&self, stream: &StreamHandle) {}

    /// A handler method panicked while processing an event
    fn unhandled_error(&self, error: &QuicError) {}

    fn start_complete(&self, stream: &StreamHandle, status: QuicStatus) -> QuicStatus {
        QuicStatus::Success
    }

    /// One received chunk; called once per chunk, in order
    fn receive(&self, stream: &StreamHandle, chunk: Bytes) -> QuicStatus {
        QuicStatus::Success
    }

    /// `message_id` is [`UNCORRELATED_MESSAGE_ID`] when the completion matches no
    /// outstanding send
    fn send_complete(&self, stream: &StreamHandle, message_id: u64, canceled: bool) -> QuicStatus {
        QuicStatus::Success
    }

    fn peer_send_shutdown(&self, stream: &StreamHandle) -> QuicStatus {
        QuicStatus::Success
    }

    fn peer_send_aborted(&self, stream: &StreamHandle, error_code: u64) -> QuicStatus {
        QuicStatus::Success
    }

    fn peer_receive_aborted(&self, stream: &StreamHandle, error_code: u64) -> QuicStatus {
        QuicStatus::Success
    }

    fn send_shutdown_complete(&self, stream: &StreamHandle, graceful: bool) -> QuicStatus {
        QuicStatus::Success
    }

    fn shutdown_complete(&self, stream: &StreamHandle) -> QuicStatus {
        QuicStatus::Success
    }

    fn ideal_send_buffer_size(&self, stream: &StreamHandle, byte_count: u64) -> QuicStatus {
        QuicStatus::Success
    }

    fn peer_accepted(&self, stream: &StreamHandle) -> QuicStatus {
        QuicStatus::Success
    }
}

/// Handler that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStreamHandler;

impl StreamEventHandler for NoopStreamHandler {}

// ----------------------------------------------------------------------------
// Shared Stream State
// ----------------------------------------------------------------------------

pub(crate) struct StreamShared {
    connection: Arc<ConnectionShared>,
    settings: StreamSettings,
    handler: Arc<dyn StreamEventHandler>,
    handle: Mutex<Option<RawHandle>>,
    is_open: AtomicBool,
    is_active: AtomicBool,
    next_message_id: AtomicU64,
    in_flight: DashMap<u64, QuicMessage>,
    tokens: TokenTable<u64>,
    open_op: PendingOperation<bool>,
    close_op: PendingOperation<bool>,
}

impl StreamShared {
    fn handle(&self) -> Option<RawHandle> {
        *lock(&self.handle)
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Acquire)
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Acquire)
    }

    pub(crate) fn report_unhandled(&self, error: &QuicError) {
        self.handler.unhandled_error(error);
    }

    fn open(self: &Arc<Self>) -> Result<Completion<bool>> {
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
        let context = self.connection.context();
        let dispatcher = context.dispatcher();
        let callback = dispatcher
            .stream_callback()
            .ok_or(QuicError::CallbackNotConfigured { kind: "stream" })?;
        if self.handle().is_some() {
            return Err(QuicError::AlreadyOpen);
        }
        if !self.connection.is_open() {
            return Err(QuicError::ConnectionClosed);
        }
        if !self.connection.is_active() {
            return Err(QuicError::ConnectionInactive);
        }
        let connection = self.connection.handle().ok_or(QuicError::ConnectionClosed)?;

        self.is_active.store(false, Ordering::Release);

        let engine = context.engine();
        let handle = engine
            .stream_open(connection, self.settings.open_flags, callback)
            .map_err(|status| QuicError::transport("StreamOpen", status))?;

        *lock(&self.handle) = Some(handle);
        dispatcher.streams.insert(handle, Arc::clone(self));
        // Marked open before starting so an inline start-complete can send
        self.is_open.store(true, Ordering::Release);

        let status = engine.stream_start(handle, self.settings.start_flags);
        if status.is_failure() {
            warn!("Stream start on connection {} failed with {}", connection, status);
            lock(&self.handle).take();
            self.is_open.store(false, Ordering::Release);
            self.is_active.store(false, Ordering::Release);
            engine.stream_shutdown(handle, StreamShutdownFlags::NONE, 0);
            engine.stream_close(handle);
            dispatcher.streams.remove(handle);
            return Err(QuicError::transport("StreamStart", status));
        }

        self.connection.adopt_stream(Arc::downgrade(self));
        info!("Opening stream {} on connection {}", handle, connection);

        let stream = StreamHandle::from(self);
        report(|| self.handler.open_initiated(&stream));
        Ok(())
    }

    fn close(self: &Arc<Self>) -> Result<Completion<bool>> {
        let completion = self.close_op.begin().ok_or(QuicError::AlreadyClosing)?;
        let Some(handle) = lock(&self.handle).take() else {
            self.close_op.clear();
            return Err(QuicError::NotOpen);
        };

        info!("Closing stream {}", handle);
        self.is_open.store(false, Ordering::Release);
        self.release(handle);

        if self.open_op.cancel() {
            debug!("Cancelled pending open of stream {}", handle);
        }

        let stream = StreamHandle::from(self);
        report(|| self.handler.close_initiated(&stream));

        // No notification can be routed once the handle is unregistered
        if self.close_op.resolve(true) {
            debug!("Stream {} closed without shutdown confirmation", handle);
        }
        Ok(completion)
    }

    pub(crate) fn dispose(&self) {
        self.is_open.store(false, Ordering::Release);
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            debug!("Disposing stream {}", handle);
            self.release(handle);
        }
        self.is_active.store(false, Ordering::Release);
        self.open_op.cancel();
        self.close_op.cancel();
        self.release_in_flight();
    }

    /// Shut down and close an engine object whose handle was already taken
    fn release(&self, handle: RawHandle) {
        let context = self.connection.context();
        let engine = context.engine();
        let status = engine.stream_shutdown(handle, StreamShutdownFlags::NONE, 0);
        if status.is_failure() {
            debug!("Stream {} shutdown reported {}", handle, status);
        }
        engine.stream_close(handle);

        context.dispatcher().streams.remove(handle);
        self.is_active.store(false, Ordering::Release);
    }

    fn release_in_flight(&self) {
        let released = self.tokens.drain().len();
        self.in_flight.clear();
        if released > 0 {
            debug!("Released {} unsent messages", released);
        }
    }

    fn send(&self, mut message: QuicMessage) -> Result<u64> {
        if !self.connection.is_open() {
            return Err(QuicError::ConnectionClosed);
        }
        if !self.connection.is_active() {
            return Err(QuicError::ConnectionInactive);
        }
        if !self.is_open() {
            return Err(QuicError::StreamClosed);
        }
        if !self.is_active() {
            return Err(QuicError::StreamInactive);
        }
        let handle = self.handle().ok_or(QuicError::StreamClosed)?;

        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.tokens.create(message_id);
        message.attach(token);
        let buffer = message.as_bytes().clone();
        self.in_flight.insert(message_id, message);

        let engine = self.connection.context().engine();
        let status = engine.stream_send(handle, buffer, SendFlags::NONE, token.into_context());
        if status.is_failure() {
            self.in_flight.remove(&message_id);
            self.tokens.take(token);
            return Err(QuicError::transport("StreamSend", status));
        }

        trace!("Queued message {} on stream {}", message_id, handle);
        Ok(message_id)
    }

    /// Retire the message behind a send-complete context
    fn complete_send(&self, context: u64) -> Option<u64> {
        let Some(token) = CompletionToken::from_context(context) else {
            debug!("Ignoring send completion without a message context");
            return None;
        };
        let Some(message_id) = self.tokens.take(token) else {
            debug!("Ignoring send completion for stale token {}", token);
            return None;
        };
        if self.in_flight.remove(&message_id).is_none() {
            debug!("Send completion for message {} found no buffer", message_id);
        }
        Some(message_id)
    }

    pub(crate) fn on_event(self: &Arc<Self>, event: StreamEvent) -> QuicStatus {
        let stream = StreamHandle::from(self);
        let handler = self.handler.as_ref();

        match event {
            StreamEvent::StartComplete { status, .. } => {
                let active = status.is_success();
                self.is_active.store(active, Ordering::Release);
                self.open_op.resolve(active);
                debug!("Stream start completed with {}", status);
                handler.start_complete(&stream, status)
            }
            StreamEvent::Receive { buffers } => {
                for chunk in buffers {
                    let status = handler.receive(&stream, chunk);
                    if status.is_failure() {
                        return status;
                    }
                }
                QuicStatus::Success
            }
            StreamEvent::SendComplete { context, canceled } => {
                let message_id = self.complete_send(context).unwrap_or(UNCORRELATED_MESSAGE_ID);
                handler.send_complete(&stream, message_id, canceled)
            }
            StreamEvent::PeerSendShutdown => {
                self.is_active.store(false, Ordering::Release);
                self.open_op.cancel();
                handler.peer_send_shutdown(&stream)
            }
            StreamEvent::PeerSendAborted { error_code } => handler.peer_send_aborted(&stream, error_code),
            StreamEvent::PeerReceiveAborted { error_code } => {
                handler.peer_receive_aborted(&stream, error_code)
            }
            StreamEvent::SendShutdownComplete { graceful } => {
                handler.send_shutdown_complete(&stream, graceful)
            }
            StreamEvent::ShutdownComplete => {
                self.is_active.store(false, Ordering::Release);
                self.open_op.cancel();
                self.close_op.resolve(true);
                handler.shutdown_complete(&stream)
            }
            StreamEvent::IdealSendBufferSize { byte_count } => {
                handler.ideal_send_buffer_size(&stream, byte_count)
            }
            StreamEvent::PeerAccepted => handler.peer_accepted(&stream),
            StreamEvent::Unknown { kind } => {
                warn!("Unknown stream event kind {}", kind);
                QuicStatus::InternalError
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Stream Handle
// ----------------------------------------------------------------------------

/// Cloneable view of a stream, handed to event handlers
///
/// Holding a handle does not keep the engine object open.
#[derive(Clone)]
pub struct StreamHandle {
    shared: Arc<StreamShared>,
}

impl From<&Arc<StreamShared>> for StreamHandle {
    fn from(shared: &Arc<StreamShared>) -> Self {
        Self {
            shared: Arc::clone(shared),
        }
    }
}

impl StreamHandle {
    /// Queue a message; returns its identifier
    pub fn send(&self, message: QuicMessage) -> Result<u64> {
        self.shared.send(message)
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    pub fn handle(&self) -> Option<RawHandle> {
        self.shared.handle()
    }

    /// Messages sent and not yet reported complete
    pub fn in_flight_count(&self) -> usize {
        self.shared.in_flight.len()
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("handle", &self.shared.handle())
            .field("open", &self.shared.is_open())
            .field("active", &self.shared.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Stream
// ----------------------------------------------------------------------------

/// One multiplexed byte stream within a connection
pub struct QuicStream {
    inner: StreamHandle,
}

impl QuicStream {
    pub(crate) fn new(
        connection: Arc<ConnectionShared>,
        settings: StreamSettings,
        handler: Arc<dyn StreamEventHandler>,
    ) -> Self {
        Self {
            inner: StreamHandle {
                shared: Arc::new(StreamShared {
                    connection,
                    settings,
                    handler,
                    handle: Mutex::new(None),
                    is_open: AtomicBool::new(false),
                    is_active: AtomicBool::new(false),
                    next_message_id: AtomicU64::new(0),
                    in_flight: DashMap::new(),
                    tokens: TokenTable::new(),
                    open_op: PendingOperation::new(),
                    close_op: PendingOperation::new(),
                }),
            },
        }
    }

    /// Open and start the stream
    ///
    /// The completion yields whether the engine confirmed the start. It is
    /// cancelled if the stream shuts down or is closed first.
    pub fn open(&self) -> Result<Completion<bool>> {
        self.inner.shared.open()
    }

    pub fn close(&self) -> Result<Completion<bool>> {
        self.inner.shared.close()
    }

    pub fn send(&self, message: QuicMessage) -> Result<u64> {
        self.inner.send(message)
    }

    pub fn dispose(&self) {
        self.inner.shared.dispose();
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn handle(&self) -> Option<RawHandle> {
        self.inner.handle()
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight_count()
    }

    /// Handle that can be cloned into other tasks for sending
    pub fn stream_handle(&self) -> StreamHandle {
        self.inner.clone()
    }
}

impl Drop for QuicStream {
    fn drop(&mut self) {
        self.inner.shared.dispose();
    }
}

impl std::fmt::Debug for QuicStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("QuicStream").field(&self.inner).finish()
    }
}
