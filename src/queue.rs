//! Bounded outbound queue of encoded frames.
//!
//! Producers never block: when the queue is full the oldest frame is dropped to make room.
//! The single consumer (the I/O loop) waits on a condition variable for work or a stop
//! request, then takes the whole queue at once so no network I/O happens under the lock.

use std::{collections::VecDeque, time::Duration};

use parking_lot::{Condvar, Mutex};
use tracing::warn;

#[derive(Debug)]
struct Inner {
    frames: VecDeque<Vec<u8>>,
    stopped: bool,
}

#[derive(Debug)]
pub struct OutboundQueue {
    inner: Mutex<Inner>,
    ready: Condvar,
    capacity: usize,
}

/// The queue is stopped and accepts no frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped;

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity),
                // Nothing may be queued before the first connect.
                stopped: true,
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends an encoded frame and wakes the consumer.
    pub fn push(&self, frame: Vec<u8>) -> Result<(), Stopped> {
        {
            let mut inner = self.inner.lock();

            if inner.stopped {
                return Err(Stopped);
            }

            if inner.frames.len() >= self.capacity {
                warn!(
                    size = inner.frames.len(),
                    "Send queue is full, discarding oldest frame"
                );

                inner.frames.pop_front();
            }

            inner.frames.push_back(frame);
        }

        self.ready.notify_one();

        Ok(())
    }

    /// Waits up to `timeout` for frames or a stop request, then takes every queued frame.
    ///
    /// Returns `None` once stopped.
    pub fn wait_drain(&self, timeout: Duration) -> Option<VecDeque<Vec<u8>>> {
        let mut inner = self.inner.lock();

        self.ready.wait_while_for(
            &mut inner,
            |inner| inner.frames.is_empty() && !inner.stopped,
            timeout,
        );

        if inner.stopped {
            return None;
        }

        Some(core::mem::take(&mut inner.frames))
    }

    /// Rejects further pushes and wakes a waiting consumer.
    pub fn stop(&self) {
        self.inner.lock().stopped = true;
        self.ready.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    /// Empties the queue and accepts pushes again.
    pub fn restart(&self) {
        let mut inner = self.inner.lock();

        inner.frames.clear();
        inner.stopped = false;
    }

    pub fn clear(&self) {
        self.inner.lock().frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Instant};

    use super::*;

    fn running(capacity: usize) -> OutboundQueue {
        let queue = OutboundQueue::new(capacity);
        queue.restart();
        queue
    }

    #[test]
    fn rejects_pushes_until_restarted() {
        let queue = OutboundQueue::new(4);

        assert_eq!(queue.push(vec![1]), Err(Stopped));

        queue.restart();

        assert_eq!(queue.push(vec![1]), Ok(()));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let queue = running(60);

        for i in 0..60u8 {
            queue.push(vec![i]).unwrap();
        }

        assert_eq!(queue.len(), 60);
        assert_eq!(queue.push(vec![60]), Ok(()));
        assert_eq!(queue.len(), 60);

        let frames = queue.wait_drain(Duration::ZERO).unwrap();

        assert_eq!(frames.front(), Some(&vec![1]));
        assert_eq!(frames.back(), Some(&vec![60]));
        assert!(!frames.contains(&vec![0]));
        assert!(queue.is_empty());
    }

    #[test]
    fn wait_drain_takes_everything_in_order() {
        let queue = running(8);

        queue.push(vec![1]).unwrap();
        queue.push(vec![2]).unwrap();
        queue.push(vec![3]).unwrap();

        let frames = queue.wait_drain(Duration::from_millis(1)).unwrap();

        assert_eq!(frames, [vec![1], vec![2], vec![3]]);
        assert!(queue.is_empty());
    }

    #[test]
    fn wait_drain_times_out_empty() {
        let queue = running(8);

        let started = Instant::now();
        let frames = queue.wait_drain(Duration::from_millis(20)).unwrap();

        assert!(frames.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn push_wakes_waiting_consumer() {
        let queue = Arc::new(running(8));

        let consumer = {
            let queue = queue.clone();

            thread::spawn(move || {
                let started = Instant::now();
                let frames = queue.wait_drain(Duration::from_secs(10)).unwrap();

                (frames, started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(vec![7]).unwrap();

        let (frames, elapsed) = consumer.join().unwrap();

        assert_eq!(frames, [vec![7]]);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn stop_wakes_waiting_consumer() {
        let queue = Arc::new(running(8));

        let consumer = {
            let queue = queue.clone();

            thread::spawn(move || queue.wait_drain(Duration::from_secs(10)))
        };

        thread::sleep(Duration::from_millis(20));
        queue.stop();

        assert_eq!(consumer.join().unwrap(), None);
        assert_eq!(queue.push(vec![1]), Err(Stopped));
    }

    #[test]
    fn concurrent_producers_never_exceed_capacity() {
        let queue = Arc::new(running(16));

        let producers: Vec<_> = (0..4u8)
            .map(|id| {
                let queue = queue.clone();

                thread::spawn(move || {
                    for i in 0..100u8 {
                        queue.push(vec![id, i]).unwrap();
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(queue.len(), 16);
    }
}
