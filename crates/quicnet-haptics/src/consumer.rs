//! Frame consumer thread
//!
//! One dedicated thread per stream drains the receive buffer, decodes frames
//! and pushes them onto the frame queue. It sleeps while the buffer is empty
//! and stops for good on shutdown or on the first decode failure, since a
//! desynchronized byte stream cannot be reframed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use quicnet_core::ReceiveBuffer;
use tracing::{debug, error, trace};

use crate::codec::decode_frame;
use crate::error::{HapticError, Result};
use crate::queue::FrameQueue;
use crate::sync::lock;

/// Handle to a running consumer thread
#[derive(Debug)]
pub struct FrameConsumer {
    buffer: Arc<ReceiveBuffer>,
    shutdown: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl FrameConsumer {
    /// Start consuming `buffer` into `queue`
    ///
    /// `on_error` runs on the consumer thread with the failure that stopped
    /// it. The queue is closed whenever the thread exits.
    pub fn spawn<F>(
        name: &str,
        buffer: Arc<ReceiveBuffer>,
        queue: Arc<FrameQueue>,
        on_error: F,
    ) -> Result<Self>
    where
        F: FnOnce(HapticError) + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread = thread::Builder::new().name(name.to_string()).spawn({
            let buffer = Arc::clone(&buffer);
            let shutdown = Arc::clone(&shutdown);
            move || run(&buffer, &queue, &shutdown, on_error)
        })?;

        Ok(Self {
            buffer,
            shutdown,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Stop the thread and wait for it to exit; idempotent
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        // Wakes the thread from an empty-buffer wait or a blocking read
        self.buffer.close();

        let thread = lock(&self.thread).take();
        if let Some(thread) = thread {
            if thread.thread().id() != thread::current().id() && thread.join().is_err() {
                error!("Frame consumer thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.thread)
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }
}

impl Drop for FrameConsumer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Closes both ends once the consumer exits, unwinding included
struct ExitGuard<'a> {
    buffer: &'a ReceiveBuffer,
    queue: &'a FrameQueue,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.buffer.close();
        self.queue.close();
    }
}

fn run<F>(buffer: &ReceiveBuffer, queue: &FrameQueue, shutdown: &AtomicBool, on_error: F)
where
    F: FnOnce(HapticError),
{
    debug!("Frame consumer started");
    let _guard = ExitGuard { buffer, queue };
    let mut source = buffer;

    while !shutdown.load(Ordering::Acquire) {
        while !buffer.is_empty() {
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            match decode_frame(&mut source) {
                Ok(frame) => {
                    trace!(
                        "Decoded {:?} frame with {} payload bytes",
                        frame.frame_type(),
                        frame.payload().len()
                    );
                    queue.push(frame);
                }
                Err(_) if shutdown.load(Ordering::Acquire) => break,
                Err(err) => {
                    error!("Frame consumer stopped: {}", err);
                    // Nothing drains the buffer any more; refuse further writes
                    buffer.close();
                    let discarded = buffer.discard();
                    if discarded > 0 {
                        debug!("Discarded {} undecodable bytes", discarded);
                    }
                    on_error(err);
                    return;
                }
            }
        }

        if !buffer.wait_for_data() {
            break;
        }
    }

    debug!("Frame consumer stopped");
}
