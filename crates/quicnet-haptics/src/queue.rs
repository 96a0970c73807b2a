//! Frame queue between the consumer thread and the application

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::frame::HapticFrame;
use crate::sync::lock;

/// Unbounded FIFO of decoded frames
///
/// Frames pushed before `close` stay readable after it.
#[derive(Debug, Default)]
pub struct FrameQueue {
    frames: Mutex<VecDeque<HapticFrame>>,
    notify: Notify,
    closed: AtomicBool,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame; returns `false` once the queue is closed
    pub fn push(&self, frame: HapticFrame) -> bool {
        if self.is_closed() {
            return false;
        }
        lock(&self.frames).push_back(frame);
        self.notify.notify_one();
        true
    }

    pub fn try_pop(&self) -> Option<HapticFrame> {
        lock(&self.frames).pop_front()
    }

    /// Wait for the next frame; `None` once the queue is closed and drained
    pub async fn next(&self) -> Option<HapticFrame> {
        loop {
            if let Some(frame) = self.try_pop() {
                return Some(frame);
            }
            if self.is_closed() {
                return None;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.frames).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameType;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready, task};

    fn create_test_frame(marker: u8) -> HapticFrame {
        HapticFrame::new(FrameType::Signal, vec![marker]).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let queue = FrameQueue::new();
        queue.push(create_test_frame(1));
        queue.push(create_test_frame(2));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_pop().unwrap().payload().as_ref(), &[1]);
        assert_eq!(queue.try_pop().unwrap().payload().as_ref(), &[2]);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_next_wakes_on_push() {
        let queue = FrameQueue::new();
        let mut next = task::spawn(queue.next());

        assert_pending!(next.poll());
        queue.push(create_test_frame(5));
        assert!(next.is_woken());

        let frame = assert_ready!(next.poll()).unwrap();
        assert_eq!(frame.payload().as_ref(), &[5]);
    }

    #[test]
    fn test_close_drains_then_ends() {
        let queue = FrameQueue::new();
        queue.push(create_test_frame(1));
        queue.close();

        assert!(!queue.push(create_test_frame(2)));
        let mut next = task::spawn(queue.next());
        assert!(assert_ready!(next.poll()).is_some());

        let mut end = task::spawn(queue.next());
        assert!(assert_ready!(end.poll()).is_none());
    }

    #[tokio::test]
    async fn test_next_across_threads() {
        let queue = Arc::new(FrameQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                for marker in 0..10 {
                    queue.push(create_test_frame(marker));
                }
                queue.close();
            })
        };

        let mut markers = Vec::new();
        while let Some(frame) = queue.next().await {
            markers.push(frame.payload()[0]);
        }
        producer.join().unwrap();

        assert_eq!(markers, (0..10).collect::<Vec<u8>>());
    }
}
