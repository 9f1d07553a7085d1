//! Bounded ring buffer between the transfer callback and the writer thread

use crate::sync::CancelToken;
use parking_lot::{Condvar, Mutex};

/// Single-producer single-consumer byte ring that refuses to overwrite
///
/// Two independent critical sections:
/// - `cursors` guards the storage and the head/tail cursors. Held only for a
///   memcpy, never across I/O.
/// - `wake_lock` + `wake` form the notification channel the writer sleeps on.
///
/// One slot is kept free so that `head == tail` always means empty; the
/// usable capacity is `capacity - 1`.
pub struct RingBuffer {
    cursors: Mutex<Cursors>,
    capacity: usize,
    wake_lock: Mutex<()>,
    wake: Condvar,
}

struct Cursors {
    data: Box<[u8]>,
    /// Next write position
    head: usize,
    /// Next read position
    tail: usize,
}

impl Cursors {
    fn occupied(&self, capacity: usize) -> usize {
        if self.head >= self.tail {
            self.head - self.tail
        } else {
            self.head + capacity - self.tail
        }
    }
}

impl RingBuffer {
    /// Create a ring with `capacity` slots (minimum 2)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            cursors: Mutex::new(Cursors {
                data: vec![0u8; capacity].into_boxed_slice(),
                head: 0,
                tail: 0,
            }),
            capacity,
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    /// Total slots, including the reserved gap slot
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Unread bytes
    pub fn occupied(&self) -> usize {
        self.cursors.lock().occupied(self.capacity)
    }

    /// Bytes that can still be pushed
    pub fn free(&self) -> usize {
        self.capacity - 1 - self.occupied()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }

    /// Append as many bytes as fit without touching unread data
    ///
    /// Returns the number of bytes that did not fit (0 on full success).
    /// Never blocks on the consumer.
    pub fn push(&self, bytes: &[u8]) -> usize {
        let capacity = self.capacity;
        let mut c = self.cursors.lock();

        let room = capacity - 1 - c.occupied(capacity);
        let accepted = bytes.len().min(room);

        let head = c.head;
        let first = accepted.min(capacity - head);
        c.data[head..head + first].copy_from_slice(&bytes[..first]);
        let rest = accepted - first;
        if rest > 0 {
            c.data[..rest].copy_from_slice(&bytes[first..accepted]);
        }
        c.head = (head + accepted) % capacity;

        bytes.len() - accepted
    }

    /// Remove up to `out.len()` of the oldest bytes into `out`
    ///
    /// Returns the number of bytes copied, 0 if the ring is empty.
    pub fn pop(&self, out: &mut [u8]) -> usize {
        let capacity = self.capacity;
        let mut c = self.cursors.lock();

        let count = out.len().min(c.occupied(capacity));

        let tail = c.tail;
        let first = count.min(capacity - tail);
        out[..first].copy_from_slice(&c.data[tail..tail + first]);
        let rest = count - first;
        if rest > 0 {
            out[first..count].copy_from_slice(&c.data[..rest]);
        }
        c.tail = (tail + count) % capacity;

        count
    }

    /// Wake the consumer if it is waiting for data
    pub fn notify(&self) {
        let _guard = self.wake_lock.lock();
        self.wake.notify_all();
    }

    /// Block while the ring is empty and `shutdown` has not been cancelled
    ///
    /// The emptiness check happens under the wake lock, and producers take
    /// the same lock to notify after pushing, so wake-ups cannot be lost.
    /// Cancelling must be followed by [`RingBuffer::notify`].
    pub fn wait_for_data(&self, shutdown: &CancelToken) {
        let mut guard = self.wake_lock.lock();
        while self.is_empty() && !shutdown.is_cancelled() {
            self.wake.wait(&mut guard);
        }
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("occupied", &self.occupied())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_basic_push_pop() {
        let buffer = RingBuffer::new(1024);

        let data = [1u8, 2, 3, 4, 5];
        assert_eq!(buffer.push(&data), 0);
        assert_eq!(buffer.occupied(), 5);

        let mut out = [0u8; 5];
        assert_eq!(buffer.pop(&mut out), 5);
        assert_eq!(out, data);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_pop_empty_returns_zero() {
        let buffer = RingBuffer::new(8);
        let mut out = [0u8; 4];
        assert_eq!(buffer.pop(&mut out), 0);
    }

    #[test]
    fn test_wrap_around() {
        let buffer = RingBuffer::new(8);

        assert_eq!(buffer.push(&[1, 2, 3, 4, 5, 6]), 0);

        let mut out = [0u8; 4];
        assert_eq!(buffer.pop(&mut out), 4);
        assert_eq!(out, [1, 2, 3, 4]);

        // Head wraps past the end of storage
        assert_eq!(buffer.push(&[7, 8, 9, 10, 11]), 0);
        assert_eq!(buffer.occupied(), 7);

        let mut out = [0u8; 10];
        assert_eq!(buffer.pop(&mut out), 7);
        assert_eq!(&out[..7], &[5, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn test_overflow_keeps_gap_slot() {
        let buffer = RingBuffer::new(16);

        assert_eq!(buffer.push(&[0xAA; 10]), 0);
        // Five usable bytes remain (15 usable - 10 stored)
        assert_eq!(buffer.push(&[0xBB; 10]), 5);
        assert_eq!(buffer.occupied(), 15);
        assert_eq!(buffer.free(), 0);

        let mut out = [0u8; 16];
        assert_eq!(buffer.pop(&mut out), 15);
        assert_eq!(&out[..10], &[0xAA; 10]);
        assert_eq!(&out[10..15], &[0xBB; 5]);
    }

    #[test]
    fn test_full_rejects_everything() {
        let buffer = RingBuffer::new(16);
        assert_eq!(buffer.push(&[1; 15]), 0);
        assert_eq!(buffer.occupied(), buffer.capacity() - 1);

        assert_eq!(buffer.push(&[2; 7]), 7);
        assert_eq!(buffer.occupied(), 15);

        let mut out = [0u8; 15];
        buffer.pop(&mut out);
        assert_eq!(out, [1; 15]);
    }

    #[test]
    fn test_wait_wakes_on_push() {
        let buffer = Arc::new(RingBuffer::new(64));
        let token = CancelToken::new();

        let consumer = {
            let buffer = buffer.clone();
            let token = token.clone();
            thread::spawn(move || {
                buffer.wait_for_data(&token);
                let mut out = [0u8; 3];
                buffer.pop(&mut out);
                out
            })
        };

        thread::sleep(Duration::from_millis(20));
        buffer.push(&[9, 8, 7]);
        buffer.notify();

        assert_eq!(consumer.join().unwrap(), [9, 8, 7]);
    }

    #[test]
    fn test_wait_returns_on_cancel() {
        let buffer = Arc::new(RingBuffer::new(64));
        let token = CancelToken::new();

        let consumer = {
            let buffer = buffer.clone();
            let token = token.clone();
            thread::spawn(move || buffer.wait_for_data(&token))
        };

        thread::sleep(Duration::from_millis(20));
        token.cancel();
        buffer.notify();

        consumer.join().unwrap();
        assert!(buffer.is_empty());
    }

    proptest! {
        #[test]
        fn prop_fifo_within_capacity(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 0..20),
            capacity in 2usize..512,
        ) {
            let buffer = RingBuffer::new(capacity);

            // Offset the cursors so pushes exercise the wrap path
            let offset = capacity / 2;
            buffer.push(&vec![0u8; offset]);
            let mut sink = vec![0u8; offset];
            buffer.pop(&mut sink);

            let mut expected = Vec::new();
            for chunk in &chunks {
                if expected.len() + chunk.len() > capacity - 1 {
                    break;
                }
                prop_assert_eq!(buffer.push(chunk), 0);
                expected.extend_from_slice(chunk);
            }

            let mut out = vec![0u8; expected.len()];
            prop_assert_eq!(buffer.pop(&mut out), expected.len());
            prop_assert_eq!(out, expected);
            prop_assert!(buffer.is_empty());
        }
    }
}
