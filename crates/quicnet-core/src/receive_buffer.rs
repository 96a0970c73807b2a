//! Blocking receive buffer
//!
//! Decouples the engine's receive callback from the thread that parses the
//! byte stream. Writers append whole chunks and never wait; readers block for
//! a bounded time until they can assemble the bytes they asked for.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes};
use tracing::trace;

use crate::config::ReceiveBufferConfig;
use crate::error::{QuicError, Result};
use crate::sync::lock;

struct BufferState {
    chunks: VecDeque<Bytes>,
    closed: bool,
}

/// Ordered queue of received byte chunks
pub struct ReceiveBuffer {
    state: Mutex<BufferState>,
    available: Condvar,
    read_timeout: Duration,
}

impl ReceiveBuffer {
    pub fn new(config: ReceiveBufferConfig) -> Self {
        Self {
            state: Mutex::new(BufferState {
                chunks: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            read_timeout: config.read_timeout(),
        }
    }

    /// Append a copy of `bytes` to the back of the buffer
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        self.write_chunk(Bytes::copy_from_slice(bytes))
    }

    /// Append an owned chunk to the back of the buffer
    pub fn write_chunk(&self, chunk: Bytes) -> Result<()> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(QuicError::BufferClosed);
        }
        if chunk.is_empty() {
            return Ok(());
        }
        trace!("Buffered {} bytes ({} chunks queued)", chunk.len(), state.chunks.len() + 1);
        state.chunks.push_back(chunk);
        drop(state);

        self.available.notify_all();
        Ok(())
    }

    /// Fill `buf` from the front of the buffer
    ///
    /// Blocks until `buf` is full, the timeout elapses, or the buffer is
    /// closed and drained. Returns the number of bytes copied, which is short
    /// only in the last two cases.
    pub fn read(&self, buf: &mut [u8], timeout: Duration) -> usize {
        // A timeout too large to represent waits without a deadline
        let deadline = Instant::now().checked_add(timeout);
        let mut filled = 0;
        let mut state = lock(&self.state);

        loop {
            while filled < buf.len() {
                let Some(front) = state.chunks.front_mut() else {
                    break;
                };
                let count = front.len().min(buf.len() - filled);
                buf[filled..filled + count].copy_from_slice(&front[..count]);
                front.advance(count);
                filled += count;
                if front.is_empty() {
                    state.chunks.pop_front();
                }
            }

            if filled == buf.len() || state.closed {
                return filled;
            }

            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return filled;
                    }
                    match self.available.wait_timeout(state, deadline - now) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => match self.available.wait(state) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                },
            };
        }
    }

    /// Read with the configured timeout
    pub fn read_default(&self, buf: &mut [u8]) -> usize {
        self.read(buf, self.read_timeout)
    }

    /// Block until at least one chunk is buffered or the buffer is closed
    ///
    /// Returns `false` once the buffer is closed and empty.
    pub fn wait_for_data(&self) -> bool {
        let mut state = lock(&self.state);
        loop {
            if !state.chunks.is_empty() {
                return true;
            }
            if state.closed {
                return false;
            }
            state = match self.available.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Number of buffered chunks, not bytes
    pub fn len(&self) -> usize {
        lock(&self.state).chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of buffered bytes
    pub fn byte_len(&self) -> usize {
        lock(&self.state).chunks.iter().map(Bytes::len).sum()
    }

    /// Refuse further writes and wake every blocked reader
    pub fn close(&self) {
        lock(&self.state).closed = true;
        self.available.notify_all();
    }

    /// Drop every buffered chunk; returns the number of bytes discarded
    pub fn discard(&self) -> usize {
        let mut state = lock(&self.state);
        let discarded = state.chunks.iter().map(Bytes::len).sum();
        state.chunks.clear();
        discarded
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new(ReceiveBufferConfig::default())
    }
}

impl std::fmt::Debug for ReceiveBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveBuffer")
            .field("chunks", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn test_read_spans_and_splits_chunks() {
        let buffer = ReceiveBuffer::default();
        buffer.write(&[1, 2]).unwrap();
        buffer.write(&[3, 4, 5]).unwrap();

        let mut first = [0u8; 3];
        assert_eq!(buffer.read(&mut first, SHORT), 3);
        assert_eq!(first, [1, 2, 3]);
        assert_eq!(buffer.len(), 1);

        let mut rest = [0u8; 2];
        assert_eq!(buffer.read(&mut rest, SHORT), 2);
        assert_eq!(rest, [4, 5]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_short_read_on_timeout() {
        let buffer = ReceiveBuffer::default();
        buffer.write(&[9]).unwrap();

        let mut buf = [0u8; 4];
        let started = Instant::now();
        assert_eq!(buffer.read(&mut buf, SHORT), 1);
        assert!(started.elapsed() >= SHORT);
        assert_eq!(buf[0], 9);
    }

    #[test]
    fn test_unbounded_timeout_reads() {
        let buffer = ReceiveBuffer::default();
        buffer.write(&[1, 2, 3, 4]).unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(buffer.read(&mut buf, Duration::MAX), 2);
        assert_eq!(buf, [1, 2]);

        // Closing still ends a wait that has no deadline
        buffer.close();
        let mut rest = [0u8; 4];
        assert_eq!(buffer.read(&mut rest, Duration::MAX), 2);
        assert_eq!(&rest[..2], &[3, 4]);
    }

    #[test]
    fn test_unbounded_timeout_wakes_on_write() {
        let buffer = Arc::new(ReceiveBuffer::default());
        let reader = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut buf = [0u8; 3];
                (buffer.read(&mut buf, Duration::MAX), buf)
            })
        };

        buffer.write(&[7]).unwrap();
        thread::sleep(Duration::from_millis(10));
        buffer.write(&[8, 9]).unwrap();

        assert_eq!(reader.join().unwrap(), (3, [7, 8, 9]));
    }

    #[test]
    fn test_reader_wakes_on_write() {
        let buffer = Arc::new(ReceiveBuffer::default());
        let reader = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut buf = [0u8; 4];
                let read = buffer.read(&mut buf, Duration::from_secs(5));
                (read, buf)
            })
        };

        buffer.write(&[1, 2]).unwrap();
        thread::sleep(Duration::from_millis(10));
        buffer.write(&[3, 4]).unwrap();

        assert_eq!(reader.join().unwrap(), (4, [1, 2, 3, 4]));
    }

    #[test]
    fn test_close_refuses_writes_and_wakes_waiters() {
        let buffer = Arc::new(ReceiveBuffer::default());
        let waiter = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.wait_for_data())
        };

        thread::sleep(Duration::from_millis(10));
        buffer.close();

        assert!(!waiter.join().unwrap());
        assert!(matches!(buffer.write(&[1]), Err(QuicError::BufferClosed)));
    }

    #[test]
    fn test_discard_drops_buffered_bytes() {
        let buffer = ReceiveBuffer::default();
        buffer.write(&[1, 2, 3]).unwrap();
        buffer.write(&[4]).unwrap();

        assert_eq!(buffer.discard(), 4);
        assert!(buffer.is_empty());
        assert_eq!(buffer.byte_len(), 0);
        assert!(!buffer.is_closed());
    }

    #[test]
    fn test_concurrent_writers_keep_per_writer_order() {
        let buffer = Arc::new(ReceiveBuffer::default());
        let writers: Vec<_> = (0u8..4)
            .map(|writer| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for seq in 0u8..50 {
                        buffer.write(&[writer, seq]).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let mut next_seq = [0u8; 4];
        let mut pair = [0u8; 2];
        for _ in 0..200 {
            assert_eq!(buffer.read(&mut pair, SHORT), 2);
            let [writer, seq] = pair;
            assert_eq!(seq, next_seq[writer as usize]);
            next_seq[writer as usize] += 1;
        }
        assert!(buffer.is_empty());
    }
}
