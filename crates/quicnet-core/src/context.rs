//! Engine registration and configuration shared by connections

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{ConnectionSettings, QuicSettings};
use crate::connection::{ConnectionEventHandler, QuicConnection};
use crate::dispatch::Dispatcher;
use crate::engine::{ConfigurationParams, RawHandle, TransportEngine};
use crate::error::{QuicError, Result};

pub(crate) struct ContextShared {
    engine: Arc<dyn TransportEngine>,
    dispatcher: Arc<Dispatcher>,
    registration: RawHandle,
    configuration: RawHandle,
    settings: QuicSettings,
}

impl Drop for ContextShared {
    fn drop(&mut self) {
        debug!(
            "Closing configuration {} and registration {}",
            self.configuration, self.registration
        );
        self.engine.configuration_close(self.configuration);
        self.engine.registration_close(self.registration);
    }
}

/// Open registration and configuration against one engine
///
/// Cloning is cheap. Every connection keeps the context alive; the engine
/// objects are closed once the last clone is gone.
#[derive(Clone)]
pub struct QuicContext {
    shared: Arc<ContextShared>,
}

impl QuicContext {
    pub fn new(engine: Arc<dyn TransportEngine>, settings: QuicSettings) -> Result<Self> {
        let registration = engine
            .registration_open(&settings.app_name)
            .map_err(|status| QuicError::transport("RegistrationOpen", status))?;

        let params = ConfigurationParams {
            alpn: settings.resolve_alpn().to_string(),
            peer_bidi_stream_count: settings.peer_bidi_stream_count,
            peer_unidi_stream_count: settings.peer_unidi_stream_count,
            credential_flags: settings.credential_flags,
        };
        let configuration = match engine.configuration_open(registration, &params) {
            Ok(configuration) => configuration,
            Err(status) => {
                warn!("Configuration open failed with {}, closing registration", status);
                engine.registration_close(registration);
                return Err(QuicError::transport("ConfigurationOpen", status));
            }
        };

        info!(
            "Opened QUIC context '{}' with ALPN {}",
            settings.app_name, params.alpn
        );

        Ok(Self {
            shared: Arc::new(ContextShared {
                engine,
                dispatcher: Dispatcher::new(),
                registration,
                configuration,
                settings,
            }),
        })
    }

    /// Create an unopened connection to `settings.host`
    pub fn create_connection<H>(&self, settings: ConnectionSettings, handler: Arc<H>) -> Result<QuicConnection>
    where
        H: ConnectionEventHandler + 'static,
    {
        settings.validate()?;
        Ok(QuicConnection::new(self.clone(), settings, handler))
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.shared.dispatcher
    }

    pub fn settings(&self) -> &QuicSettings {
        &self.shared.settings
    }

    pub fn registration(&self) -> RawHandle {
        self.shared.registration
    }

    pub fn configuration(&self) -> RawHandle {
        self.shared.configuration
    }

    pub(crate) fn engine(&self) -> &dyn TransportEngine {
        self.shared.engine.as_ref()
    }
}

impl std::fmt::Debug for QuicContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuicContext")
            .field("registration", &self.shared.registration)
            .field("configuration", &self.shared.configuration)
            .field("alpn", &self.shared.settings.resolve_alpn())
            .finish()
    }
}
