//! Connection lifecycle tests against the in-memory engine

use std::sync::{Arc, Mutex};

use quicnet_core::testing::{EngineCall, MockEngine};
use quicnet_core::*;
use tokio_test::{assert_pending, assert_ready, task};

// ----------------------------------------------------------------------------
// Test Helpers
// ----------------------------------------------------------------------------

fn create_test_context() -> (Arc<MockEngine>, QuicContext) {
    let engine = MockEngine::new();
    let context = QuicContext::new(engine.clone(), QuicSettings::default()).unwrap();
    (engine, context)
}

fn create_test_connection(context: &QuicContext) -> QuicConnection {
    context
        .create_connection(
            ConnectionSettings::new("localhost").with_port(4433),
            Arc::new(NoopConnectionHandler),
        )
        .unwrap()
}

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<&'static str>>,
    errors: Mutex<Vec<String>>,
    panic_on_connect: bool,
}

impl RecordingHandler {
    fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

impl ConnectionEventHandler for RecordingHandler {
    fn unhandled_error(&self, error: &QuicError) {
        self.errors.lock().unwrap().push(error.to_string());
    }

    fn connected(&self, _session_resumed: bool) -> QuicStatus {
        if self.panic_on_connect {
            panic!("connected handler failed");
        }
        self.events.lock().unwrap().push("connected");
        QuicStatus::Success
    }

    fn shutdown_complete(&self) -> QuicStatus {
        self.events.lock().unwrap().push("shutdown_complete");
        QuicStatus::Success
    }
}

// ----------------------------------------------------------------------------
// Context Tests
// ----------------------------------------------------------------------------

#[test]
fn test_context_opens_configuration() {
    let (engine, context) = create_test_context();

    let calls = engine.calls();
    let params = calls
        .iter()
        .find_map(|call| match call {
            EngineCall::ConfigurationOpen(params) => Some(params.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(params.alpn, "h3");
    assert_eq!(params.peer_bidi_stream_count, 1);
    assert_eq!(params.peer_unidi_stream_count, 3);
    assert!(params.credential_flags.contains(CredentialFlags::CLIENT));

    drop(context);
    assert_eq!(engine.count_calls("ConfigurationClose"), 1);
    assert_eq!(engine.count_calls("RegistrationClose"), 1);
    assert_eq!(engine.live_objects(), 0);
}

#[test]
fn test_context_closes_registration_on_configuration_failure() {
    let engine = MockEngine::new();
    engine.fail_next("ConfigurationOpen", QuicStatus::AlpnNegFailure);

    let err = QuicContext::new(engine.clone(), QuicSettings::default()).unwrap_err();
    assert_eq!(err.status(), Some(QuicStatus::AlpnNegFailure));
    assert_eq!(engine.count_calls("RegistrationClose"), 1);
    assert_eq!(engine.live_objects(), 0);
}

#[test]
fn test_create_connection_requires_host() {
    let (_engine, context) = create_test_context();
    let result = context.create_connection(ConnectionSettings::new(""), Arc::new(NoopConnectionHandler));
    assert!(matches!(result, Err(QuicError::Configuration { .. })));
}

// ----------------------------------------------------------------------------
// Open Tests
// ----------------------------------------------------------------------------

#[test]
fn test_open_resolves_on_connected() {
    let (engine, context) = create_test_context();
    let connection = create_test_connection(&context);
    assert_eq!(connection.state(), ConnectionState::Idle);

    let mut open = task::spawn(connection.open().unwrap());
    assert_pending!(open.poll());
    assert_eq!(connection.state(), ConnectionState::Opening);
    assert!(connection.is_open());
    assert!(!connection.is_active());

    let handle = engine.last_connection().unwrap();
    assert!(engine.calls().contains(&EngineCall::ConnectionStart {
        connection: handle,
        host: "localhost".to_string(),
        port: 4433,
    }));

    let status = engine.fire_connection_event(handle, ConnectionEvent::Connected { session_resumed: false });
    assert_eq!(status, Some(QuicStatus::Success));

    assert_ready!(open.poll()).unwrap();
    assert!(connection.is_active());
    assert_eq!(connection.state(), ConnectionState::Active);
    assert_eq!(connection.handle(), Some(handle));
}

#[test]
fn test_open_rejects_reentry() {
    let (engine, context) = create_test_context();
    let connection = create_test_connection(&context);

    let _open = connection.open().unwrap();
    assert!(matches!(connection.open(), Err(QuicError::AlreadyOpening)));

    let handle = engine.last_connection().unwrap();
    engine.fire_connection_event(handle, ConnectionEvent::Connected { session_resumed: false });
    assert!(matches!(connection.open(), Err(QuicError::AlreadyOpen)));
    assert_eq!(engine.count_calls("ConnectionOpen"), 1);
}

#[test]
fn test_open_without_callback_fails() {
    let (engine, context) = create_test_context();
    context.dispatcher().set_connection_callback(None);
    let connection = create_test_connection(&context);

    assert!(matches!(
        connection.open(),
        Err(QuicError::CallbackNotConfigured { kind: "connection" })
    ));
    assert_eq!(engine.count_calls("ConnectionOpen"), 0);
    assert_eq!(connection.state(), ConnectionState::Idle);
}

#[test]
fn test_start_failure_tears_down() {
    let (engine, context) = create_test_context();
    let connection = create_test_connection(&context);
    engine.fail_next("ConnectionStart", QuicStatus::Unreachable);

    let err = connection.open().unwrap_err();
    assert!(matches!(
        err,
        QuicError::Transport {
            operation: "ConnectionStart",
            status: QuicStatus::Unreachable
        }
    ));

    let handle = engine.last_connection().unwrap();
    assert!(engine.calls().contains(&EngineCall::ConnectionShutdown {
        connection: handle,
        flags: ConnectionShutdownFlags::SILENT,
    }));
    assert!(!engine.is_live(handle));
    assert_eq!(context.dispatcher().connection_count(), 0);
    assert_eq!(connection.handle(), None);
    assert!(!connection.is_open());

    // A failed attempt leaves the connection ready for another one
    assert!(connection.open().is_ok());
}

#[test]
fn test_open_failure_leaves_nothing_behind() {
    let (engine, context) = create_test_context();
    let connection = create_test_connection(&context);
    engine.fail_next("ConnectionOpen", QuicStatus::OutOfMemory);

    let err = connection.open().unwrap_err();
    assert_eq!(err.status(), Some(QuicStatus::OutOfMemory));
    assert_eq!(context.dispatcher().connection_count(), 0);
    assert_eq!(engine.count_calls("ConnectionStart"), 0);
}

#[tokio::test]
async fn test_peer_shutdown_cancels_pending_open() {
    let (engine, context) = create_test_context();
    let connection = create_test_connection(&context);

    let open = connection.open().unwrap();
    let handle = engine.last_connection().unwrap();
    engine.fire_connection_event(handle, ConnectionEvent::ShutdownInitiatedByPeer { error_code: 7 });

    assert!(open.await.unwrap_err().is_cancelled());
    assert!(connection.is_open());
    assert!(!connection.is_active());
    assert_eq!(connection.state(), ConnectionState::Inactive);
}

#[tokio::test]
async fn test_transport_shutdown_cancels_pending_open() {
    let (engine, context) = create_test_context();
    let connection = create_test_connection(&context);

    let open = connection.open().unwrap();
    let handle = engine.last_connection().unwrap();
    engine.fire_connection_event(
        handle,
        ConnectionEvent::ShutdownInitiatedByTransport {
            status: QuicStatus::ConnectionIdle,
            error_code: 0,
        },
    );

    assert!(open.await.unwrap_err().is_cancelled());
}

// ----------------------------------------------------------------------------
// Close Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_close_releases_handle() {
    let (engine, context) = create_test_context();
    let connection = create_test_connection(&context);

    let open = connection.open().unwrap();
    let handle = engine.last_connection().unwrap();
    engine.fire_connection_event(handle, ConnectionEvent::Connected { session_resumed: false });
    open.await.unwrap();

    connection.close().unwrap().await.unwrap();

    assert!(engine.calls().contains(&EngineCall::ConnectionShutdown {
        connection: handle,
        flags: ConnectionShutdownFlags::NONE,
    }));
    assert_eq!(engine.count_calls("ConnectionClose"), 1);
    assert_eq!(context.dispatcher().connection_count(), 0);
    assert_eq!(connection.state(), ConnectionState::Closed);

    // Late notifications for the released handle are ignored
    let status = context
        .dispatcher()
        .dispatch_connection_event(handle, ConnectionEvent::ShutdownComplete);
    assert_eq!(status, QuicStatus::InternalError);

    assert!(matches!(connection.close(), Err(QuicError::NotOpen)));
}

#[tokio::test]
async fn test_close_observes_inline_shutdown_complete() {
    let (engine, context) = create_test_context();
    let handler = Arc::new(RecordingHandler::default());
    let connection = context
        .create_connection(ConnectionSettings::new("localhost"), handler.clone())
        .unwrap();
    engine.set_inline_shutdown(true);

    let _open = connection.open().unwrap();
    connection.close().unwrap().await.unwrap();

    assert_eq!(handler.events(), vec!["shutdown_complete"]);
}

#[tokio::test]
async fn test_close_cancels_pending_open() {
    let (_engine, context) = create_test_context();
    let connection = create_test_connection(&context);

    let open = connection.open().unwrap();
    connection.close().unwrap().await.unwrap();

    assert!(open.await.unwrap_err().is_cancelled());
}

#[test]
fn test_close_before_open_fails() {
    let (engine, context) = create_test_context();
    let connection = create_test_connection(&context);

    assert!(matches!(connection.close(), Err(QuicError::NotOpen)));
    assert_eq!(engine.count_calls("ConnectionShutdown"), 0);
}

// ----------------------------------------------------------------------------
// Event Routing Tests
// ----------------------------------------------------------------------------

#[test]
fn test_default_handler_statuses() {
    let (engine, context) = create_test_context();
    let connection = create_test_connection(&context);
    let _open = connection.open().unwrap();
    let handle = engine.last_connection().unwrap();

    let fire = |event| engine.fire_connection_event(handle, event);
    assert_eq!(
        fire(ConnectionEvent::StreamsAvailable {
            bidirectional: 1,
            unidirectional: 0
        }),
        Some(QuicStatus::Aborted)
    );
    assert_eq!(fire(ConnectionEvent::PeerAddressChanged), Some(QuicStatus::Success));
    assert_eq!(fire(ConnectionEvent::Unknown { kind: 99 }), Some(QuicStatus::InternalError));
}

#[tokio::test]
async fn test_handler_panic_is_contained() {
    let (engine, context) = create_test_context();
    let handler = Arc::new(RecordingHandler {
        panic_on_connect: true,
        ..RecordingHandler::default()
    });
    let connection = context
        .create_connection(ConnectionSettings::new("localhost"), handler.clone())
        .unwrap();

    let open = connection.open().unwrap();
    let handle = engine.last_connection().unwrap();
    let status = engine.fire_connection_event(handle, ConnectionEvent::Connected { session_resumed: true });

    assert_eq!(status, Some(QuicStatus::InternalError));
    assert_eq!(handler.errors.lock().unwrap().len(), 1);
    // The state transition ran before the handler
    open.await.unwrap();
    assert!(connection.is_active());
}

// ----------------------------------------------------------------------------
// Disposal Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_dispose_is_idempotent() {
    let (engine, context) = create_test_context();
    let connection = create_test_connection(&context);

    let open = connection.open().unwrap();
    connection.dispose();
    connection.dispose();

    assert!(open.await.unwrap_err().is_cancelled());
    assert_eq!(engine.count_calls("ConnectionClose"), 1);
    assert_eq!(connection.state(), ConnectionState::Closed);

    drop(connection);
    assert_eq!(engine.count_calls("ConnectionClose"), 1);
}

#[test]
fn test_drop_releases_handle() {
    let (engine, context) = create_test_context();
    let connection = create_test_connection(&context);
    let _open = connection.open().unwrap();
    let handle = engine.last_connection().unwrap();

    drop(connection);

    assert!(!engine.is_live(handle));
    assert_eq!(context.dispatcher().connection_count(), 0);
}

// ----------------------------------------------------------------------------
// Concurrency Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_concurrent_connections_route_independently() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (engine, context) = create_test_context();

    let connections: Vec<_> = (0..4).map(|_| create_test_connection(&context)).collect();
    let opens: Vec<_> = connections
        .iter()
        .map(|connection| connection.open().unwrap())
        .collect();

    let threads: Vec<_> = connections
        .iter()
        .map(|connection| {
            let engine = engine.clone();
            let handle = connection.handle().unwrap();
            std::thread::spawn(move || {
                engine.fire_connection_event(handle, ConnectionEvent::Connected { session_resumed: false })
            })
        })
        .collect();
    for thread in threads {
        assert_eq!(thread.join().unwrap(), Some(QuicStatus::Success));
    }

    let results = futures::future::join_all(opens).await;
    assert!(results.iter().all(|result| result.is_ok()));
    assert!(connections.iter().all(QuicConnection::is_active));
    assert_eq!(context.dispatcher().connection_count(), 4);
}
