//! Scriptable in-memory engine for tests
//!
//! `MockEngine` hands out handles, records every call, lets a test make the
//! next call of an operation fail, and fires notifications through the
//! callbacks the binding layer installed. Callbacks are always invoked with no
//! engine lock held, as a real engine would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::engine::{
    ConfigurationParams, ConnectionCallback, ConnectionShutdownFlags, RawHandle, SendFlags,
    StreamCallback, StreamOpenFlags, StreamShutdownFlags, StreamStartFlags, TransportEngine,
};
use crate::event::{ConnectionEvent, StreamEvent};
use crate::registry::HandleRegistry;
use crate::status::QuicStatus;
use crate::sync::lock;

/// Engine call as recorded by [`MockEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    RegistrationOpen { app_name: String },
    RegistrationClose(RawHandle),
    ConfigurationOpen(ConfigurationParams),
    ConfigurationClose(RawHandle),
    ConnectionOpen(RawHandle),
    ConnectionStart { connection: RawHandle, host: String, port: u16 },
    ConnectionShutdown { connection: RawHandle, flags: ConnectionShutdownFlags },
    ConnectionClose(RawHandle),
    StreamOpen { connection: RawHandle, stream: RawHandle },
    StreamStart(RawHandle),
    StreamSend { stream: RawHandle, len: usize, context: u64 },
    StreamShutdown(RawHandle),
    StreamClose(RawHandle),
}

impl EngineCall {
    /// Operation name, as used by [`MockEngine::fail_next`]
    pub fn operation(&self) -> &'static str {
        match self {
            EngineCall::RegistrationOpen { .. } => "RegistrationOpen",
            EngineCall::RegistrationClose(_) => "RegistrationClose",
            EngineCall::ConfigurationOpen(_) => "ConfigurationOpen",
            EngineCall::ConfigurationClose(_) => "ConfigurationClose",
            EngineCall::ConnectionOpen(_) => "ConnectionOpen",
            EngineCall::ConnectionStart { .. } => "ConnectionStart",
            EngineCall::ConnectionShutdown { .. } => "ConnectionShutdown",
            EngineCall::ConnectionClose(_) => "ConnectionClose",
            EngineCall::StreamOpen { .. } => "StreamOpen",
            EngineCall::StreamStart(_) => "StreamStart",
            EngineCall::StreamSend { .. } => "StreamSend",
            EngineCall::StreamShutdown(_) => "StreamShutdown",
            EngineCall::StreamClose(_) => "StreamClose",
        }
    }
}

/// A buffer accepted by `stream_send`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentBuffer {
    pub stream: RawHandle,
    pub buffer: Bytes,
    pub context: u64,
}

#[derive(Clone)]
enum MockObject {
    Registration,
    Configuration,
    Connection(ConnectionCallback),
    Stream(StreamCallback),
}

#[derive(Default)]
struct MockState {
    calls: Vec<EngineCall>,
    failures: HashMap<&'static str, QuicStatus>,
    sent: Vec<SentBuffer>,
    connections: Vec<RawHandle>,
    streams: Vec<RawHandle>,
    inline_shutdown: bool,
}

/// In-memory [`TransportEngine`]
#[derive(Default)]
pub struct MockEngine {
    objects: HandleRegistry<MockObject>,
    state: Mutex<MockState>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next call of `operation` fail with `status`
    pub fn fail_next(&self, operation: &'static str, status: QuicStatus) {
        lock(&self.state).failures.insert(operation, status);
    }

    /// Deliver `ShutdownComplete` from inside connection and stream close calls
    pub fn set_inline_shutdown(&self, enabled: bool) {
        lock(&self.state).inline_shutdown = enabled;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        lock(&self.state).calls.clone()
    }

    pub fn count_calls(&self, operation: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    pub fn sent(&self) -> Vec<SentBuffer> {
        lock(&self.state).sent.clone()
    }

    pub fn last_connection(&self) -> Option<RawHandle> {
        lock(&self.state).connections.last().copied()
    }

    pub fn last_stream(&self) -> Option<RawHandle> {
        lock(&self.state).streams.last().copied()
    }

    /// Whether the engine object behind `handle` has not been closed
    pub fn is_live(&self, handle: RawHandle) -> bool {
        self.objects.contains(handle)
    }

    /// Number of engine objects not yet closed
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    /// Fire a connection notification; `None` if the handle is closed
    pub fn fire_connection_event(&self, handle: RawHandle, event: ConnectionEvent) -> Option<QuicStatus> {
        match self.objects.lookup(handle)? {
            MockObject::Connection(callback) => Some(callback(handle, event)),
            _ => None,
        }
    }

    /// Fire a stream notification; `None` if the handle is closed
    pub fn fire_stream_event(&self, handle: RawHandle, event: StreamEvent) -> Option<QuicStatus> {
        match self.objects.lookup(handle)? {
            MockObject::Stream(callback) => Some(callback(handle, event)),
            _ => None,
        }
    }

    /// Complete a recorded send, as the engine would after transmitting it
    pub fn complete_send(&self, sent: &SentBuffer) -> Option<QuicStatus> {
        self.fire_stream_event(
            sent.stream,
            StreamEvent::SendComplete {
                context: sent.context,
                canceled: false,
            },
        )
    }

    fn record(&self, call: EngineCall) -> QuicStatus {
        let mut state = lock(&self.state);
        let failure = state.failures.remove(call.operation());
        state.calls.push(call);
        failure.unwrap_or(QuicStatus::Success)
    }

    fn inline_shutdown(&self) -> bool {
        lock(&self.state).inline_shutdown
    }
}

impl TransportEngine for MockEngine {
    fn registration_open(&self, app_name: &str) -> Result<RawHandle, QuicStatus> {
        let status = self.record(EngineCall::RegistrationOpen {
            app_name: app_name.to_string(),
        });
        if status.is_failure() {
            return Err(status);
        }
        Ok(self.objects.register(MockObject::Registration))
    }

    fn registration_close(&self, registration: RawHandle) {
        self.record(EngineCall::RegistrationClose(registration));
        self.objects.remove(registration);
    }

    fn configuration_open(
        &self,
        _registration: RawHandle,
        params: &ConfigurationParams,
    ) -> Result<RawHandle, QuicStatus> {
        let status = self.record(EngineCall::ConfigurationOpen(params.clone()));
        if status.is_failure() {
            return Err(status);
        }
        Ok(self.objects.register(MockObject::Configuration))
    }

    fn configuration_close(&self, configuration: RawHandle) {
        self.record(EngineCall::ConfigurationClose(configuration));
        self.objects.remove(configuration);
    }

    fn connection_open(
        &self,
        _registration: RawHandle,
        callback: ConnectionCallback,
    ) -> Result<RawHandle, QuicStatus> {
        let handle = self.objects.register(MockObject::Connection(callback));
        let status = self.record(EngineCall::ConnectionOpen(handle));
        if status.is_failure() {
            self.objects.remove(handle);
            return Err(status);
        }
        lock(&self.state).connections.push(handle);
        Ok(handle)
    }

    fn connection_start(
        &self,
        connection: RawHandle,
        _configuration: RawHandle,
        host: &str,
        port: u16,
    ) -> QuicStatus {
        self.record(EngineCall::ConnectionStart {
            connection,
            host: host.to_string(),
            port,
        })
    }

    fn connection_shutdown(&self, connection: RawHandle, flags: ConnectionShutdownFlags, _error_code: u64) {
        self.record(EngineCall::ConnectionShutdown { connection, flags });
    }

    fn connection_close(&self, connection: RawHandle) {
        self.record(EngineCall::ConnectionClose(connection));
        if self.inline_shutdown() {
            self.fire_connection_event(connection, ConnectionEvent::ShutdownComplete);
        }
        self.objects.remove(connection);
    }

    fn stream_open(
        &self,
        connection: RawHandle,
        _flags: StreamOpenFlags,
        callback: StreamCallback,
    ) -> Result<RawHandle, QuicStatus> {
        let stream = self.objects.register(MockObject::Stream(callback));
        let status = self.record(EngineCall::StreamOpen { connection, stream });
        if status.is_failure() {
            self.objects.remove(stream);
            return Err(status);
        }
        lock(&self.state).streams.push(stream);
        Ok(stream)
    }

    fn stream_start(&self, stream: RawHandle, _flags: StreamStartFlags) -> QuicStatus {
        self.record(EngineCall::StreamStart(stream))
    }

    fn stream_send(&self, stream: RawHandle, buffer: Bytes, _flags: SendFlags, context: u64) -> QuicStatus {
        let status = self.record(EngineCall::StreamSend {
            stream,
            len: buffer.len(),
            context,
        });
        if status.is_success() {
            lock(&self.state).sent.push(SentBuffer {
                stream,
                buffer,
                context,
            });
        }
        status
    }

    fn stream_shutdown(&self, stream: RawHandle, _flags: StreamShutdownFlags, _error_code: u64) -> QuicStatus {
        self.record(EngineCall::StreamShutdown(stream))
    }

    fn stream_close(&self, stream: RawHandle) {
        self.record(EngineCall::StreamClose(stream));
        if self.inline_shutdown() {
            self.fire_stream_event(stream, StreamEvent::ShutdownComplete);
        }
        self.objects.remove(stream);
    }
}
