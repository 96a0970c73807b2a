//! Haptic stream handler
//!
//! Plugs into a [`quicnet_core::QuicStream`] as its event handler. Once the
//! stream starts it sends a subscription frame carrying the authorization
//! token; inbound data is buffered and turned into frames by a dedicated
//! consumer thread.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use quicnet_core::{QuicError, QuicStatus, ReceiveBuffer, StreamEventHandler, StreamHandle};
use tracing::{debug, error, info, warn};

use crate::config::HapticStreamConfig;
use crate::consumer::FrameConsumer;
use crate::error::{HapticError, Result};
use crate::frame::HapticFrame;
use crate::queue::FrameQueue;
use crate::schema::Auth;
use crate::sync::lock;

pub struct HapticStream {
    subscription: HapticFrame,
    buffer: Arc<ReceiveBuffer>,
    queue: Arc<FrameQueue>,
    consumer: FrameConsumer,
    last_error: Arc<Mutex<Option<HapticError>>>,
}

impl HapticStream {
    /// Create a handler that subscribes with `jwt_token`
    pub fn new(jwt_token: impl Into<String>) -> Result<Arc<Self>> {
        Self::with_config(jwt_token, HapticStreamConfig::default())
    }

    pub fn with_config(jwt_token: impl Into<String>, config: HapticStreamConfig) -> Result<Arc<Self>> {
        let auth = Auth::new(jwt_token);
        if auth.jwt_token.is_empty() {
            return Err(HapticError::schema("Authorization token must not be empty"));
        }
        let subscription = HapticFrame::subscription(&auth)?;

        let buffer = Arc::new(ReceiveBuffer::new(config.receive_buffer));
        let queue = Arc::new(FrameQueue::new());
        let last_error = Arc::new(Mutex::new(None));

        let consumer = FrameConsumer::spawn(
            &config.consumer_thread_name,
            Arc::clone(&buffer),
            Arc::clone(&queue),
            {
                let last_error = Arc::clone(&last_error);
                move |err| store_error(&last_error, err)
            },
        )?;

        Ok(Arc::new(Self {
            subscription,
            buffer,
            queue,
            consumer,
            last_error,
        }))
    }

    /// Pop the oldest decoded frame without waiting
    pub fn try_read_next_frame(&self) -> Option<HapticFrame> {
        self.queue.try_pop()
    }

    /// Wait for the next decoded frame
    ///
    /// Returns `None` once the consumer has stopped and every frame it decoded
    /// has been read.
    pub async fn next_frame(&self) -> Option<HapticFrame> {
        self.queue.next().await
    }

    pub fn pending_frame_count(&self) -> usize {
        self.queue.len()
    }

    /// Take the error that stopped the consumer, if any
    pub fn take_error(&self) -> Option<HapticError> {
        lock(&self.last_error).take()
    }

    pub fn is_consuming(&self) -> bool {
        self.consumer.is_running()
    }

    pub fn receive_buffer(&self) -> &Arc<ReceiveBuffer> {
        &self.buffer
    }

    /// Stop the consumer; already decoded frames stay readable
    pub fn dispose(&self) {
        self.consumer.shutdown();
        self.queue.close();
    }
}

fn store_error(slot: &Mutex<Option<HapticError>>, err: HapticError) {
    *lock(slot) = Some(err);
}

impl StreamEventHandler for HapticStream {
    fn open_initiated(&self, stream: &StreamHandle) {
        debug!("Haptic stream {:?} opening", stream.handle());
    }

    fn close_initiated(&self, stream: &StreamHandle) {
        debug!("Haptic stream {:?} closing", stream.handle());
    }

    fn unhandled_error(&self, error: &QuicError) {
        error!("Unhandled haptic stream error: {}", error);
    }

    fn start_complete(&self, stream: &StreamHandle, status: QuicStatus) -> QuicStatus {
        if status.is_failure() {
            warn!("Haptic stream failed to start: {}", status);
            return QuicStatus::Aborted;
        }

        match stream.send(self.subscription.to_message()) {
            Ok(message_id) => {
                info!("Subscription sent as message {}", message_id);
                QuicStatus::Success
            }
            Err(err) => {
                error!("Failed to send subscription: {}", err);
                store_error(&self.last_error, err.into());
                QuicStatus::InternalError
            }
        }
    }

    fn receive(&self, _stream: &StreamHandle, chunk: Bytes) -> QuicStatus {
        match self.buffer.write_chunk(chunk) {
            Ok(()) => QuicStatus::Success,
            Err(err) => {
                warn!("Dropping inbound data: {}", err);
                QuicStatus::InternalError
            }
        }
    }
}

impl Drop for HapticStream {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for HapticStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HapticStream")
            .field("buffered_chunks", &self.buffer.len())
            .field("pending_frames", &self.queue.len())
            .field("consuming", &self.is_consuming())
            .finish()
    }
}
