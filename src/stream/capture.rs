//! Capture side of the transfer callback: hardware buffer into the ring

use crate::error::{Result, StreamError};
use crate::format::wav::to_unsigned;
use crate::report::ByteCounter;
use crate::stream::{RingBuffer, TransferLimit};
use crate::transport::{Flow, Transfer, TransferHandler};
use std::sync::Arc;
use tracing::error;

/// Transfer handler that copies received bytes into the ring buffer
///
/// Runs on the transport's event thread. Every path is bounded: one memcpy
/// under the cursor lock and one notify under the wake lock.
pub struct CaptureProducer {
    buffer: Arc<RingBuffer>,
    counter: Arc<ByteCounter>,
    limit: TransferLimit,
    unsigned: bool,
}

impl CaptureProducer {
    pub fn new(
        buffer: Arc<RingBuffer>,
        counter: Arc<ByteCounter>,
        limit: TransferLimit,
        unsigned: bool,
    ) -> Self {
        Self {
            buffer,
            counter,
            limit,
            unsigned,
        }
    }

    /// Remaining transfer budget
    pub fn limit(&self) -> TransferLimit {
        self.limit
    }
}

impl TransferHandler for CaptureProducer {
    fn on_transfer(&mut self, transfer: &mut Transfer<'_>) -> Result<Flow> {
        let len = self.limit.take(transfer.valid_length);
        let chunk = &mut transfer.buffer[..len];

        if self.unsigned {
            to_unsigned(chunk);
        }

        let rejected = self.buffer.push(chunk);
        self.counter.add(len - rejected);
        self.buffer.notify();

        if rejected > 0 {
            error!(
                "Buffer full: {} of {} bytes rejected ({} buffered)",
                rejected,
                len,
                self.buffer.occupied()
            );
            return Err(StreamError::CapacityExhausted { rejected });
        }

        if self.limit.is_reached() {
            return Ok(Flow::Complete);
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn producer(capacity: usize, limit: TransferLimit, unsigned: bool) -> CaptureProducer {
        CaptureProducer::new(
            Arc::new(RingBuffer::new(capacity)),
            Arc::new(ByteCounter::new()),
            limit,
            unsigned,
        )
    }

    fn deliver(producer: &mut CaptureProducer, data: &[u8]) -> Result<Flow> {
        let mut buf = data.to_vec();
        let len = buf.len();
        producer.on_transfer(&mut Transfer::new(&mut buf, len))
    }

    #[test]
    fn test_pushes_and_counts() {
        let mut p = producer(64, TransferLimit::unlimited(), false);
        assert_eq!(deliver(&mut p, &[1, 2, 3, 4]).unwrap(), Flow::Continue);

        assert_eq!(p.counter.take(), 4);
        let mut out = [0u8; 4];
        assert_eq!(p.buffer.pop(&mut out), 4);
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_rejection_is_fatal() {
        let mut p = producer(16, TransferLimit::unlimited(), false);
        assert_eq!(deliver(&mut p, &[0; 10]).unwrap(), Flow::Continue);

        match deliver(&mut p, &[0; 10]) {
            Err(StreamError::CapacityExhausted { rejected }) => assert_eq!(rejected, 5),
            other => panic!("expected capacity error, got {:?}", other),
        }
        assert_eq!(p.counter.take(), 15);
    }

    #[test]
    fn test_limit_completes_stream() {
        let mut p = producer(64, TransferLimit::bytes(6), false);
        assert_eq!(deliver(&mut p, &[7; 4]).unwrap(), Flow::Continue);
        assert_eq!(deliver(&mut p, &[7; 4]).unwrap(), Flow::Complete);

        assert_eq!(p.buffer.occupied(), 6);
        assert!(p.limit().is_reached());
    }

    #[test]
    fn test_unsigned_transform() {
        let mut p = producer(64, TransferLimit::unlimited(), true);
        deliver(&mut p, &[0x00, 0xFF, 0x7F]).unwrap();

        let mut out = [0u8; 3];
        p.buffer.pop(&mut out);
        assert_eq!(out, [0x80, 0x7F, 0xFF]);
    }
}
