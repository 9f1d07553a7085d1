//! Playback side of the transfer callback: file or constant carrier into the
//! hardware buffer

use crate::error::{Result, StreamError};
use crate::report::ByteCounter;
use crate::stream::TransferLimit;
use crate::transport::{Flow, Transfer, TransferHandler};
use std::io::{ErrorKind, Read, Seek};
use std::sync::Arc;
use tracing::{debug, info};

/// Highest DC value accepted for the continuous-wave source
pub const MAX_AMPLITUDE: u8 = 127;

/// Transfer handler that fills transmit buffers from a backing source
///
/// The transfer limit is applied before reading, so a chunk straddling the
/// limit is only partially filled; the rest of the buffer is zeroed.
pub struct PlaybackProducer<S> {
    source: S,
    repeat: bool,
    limit: TransferLimit,
    counter: Arc<ByteCounter>,
    rewinds: u64,
}

impl<S: Read + Seek + Send> PlaybackProducer<S> {
    pub fn new(source: S, repeat: bool, limit: TransferLimit, counter: Arc<ByteCounter>) -> Self {
        Self {
            source,
            repeat,
            limit,
            counter,
            rewinds: 0,
        }
    }

    /// How many times the source wrapped back to its start
    pub fn rewinds(&self) -> u64 {
        self.rewinds
    }

    /// Fill `buf` from the current source position; stops early only at EOF
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.source.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

impl<S: Read + Seek + Send> TransferHandler for PlaybackProducer<S> {
    fn on_transfer(&mut self, transfer: &mut Transfer<'_>) -> Result<Flow> {
        let wanted = self.limit.take(transfer.buffer.len());

        let mut filled = self.read_full(&mut transfer.buffer[..wanted])?;
        while filled < wanted {
            if !self.repeat {
                debug!("Input file end reached after {} bytes of chunk", filled);
                return Err(StreamError::SourceExhausted);
            }

            info!("Input file end reached. Rewind to beginning.");
            self.source.rewind()?;
            self.rewinds += 1;

            let n = self.read_full(&mut transfer.buffer[filled..wanted])?;
            if n == 0 {
                // Empty source: rewinding can never make progress
                return Err(StreamError::SourceExhausted);
            }
            filled += n;
        }

        transfer.buffer[wanted..].fill(0);
        transfer.valid_length = wanted;
        self.counter.add(wanted);

        if self.limit.is_reached() {
            return Ok(Flow::Complete);
        }
        Ok(Flow::Continue)
    }
}

/// Continuous-wave source: every byte is the same DC value
pub struct SignalSource {
    amplitude: u8,
    limit: TransferLimit,
    counter: Arc<ByteCounter>,
}

impl SignalSource {
    pub fn new(amplitude: u8, limit: TransferLimit, counter: Arc<ByteCounter>) -> Result<Self> {
        if amplitude > MAX_AMPLITUDE {
            return Err(StreamError::InvalidConfig(format!(
                "amplitude {} outside 0..={}",
                amplitude, MAX_AMPLITUDE
            )));
        }
        Ok(Self {
            amplitude,
            limit,
            counter,
        })
    }
}

impl TransferHandler for SignalSource {
    fn on_transfer(&mut self, transfer: &mut Transfer<'_>) -> Result<Flow> {
        let len = self.limit.take(transfer.buffer.len());
        transfer.buffer[..len].fill(self.amplitude);
        transfer.buffer[len..].fill(0);
        transfer.valid_length = len;
        self.counter.add(len);

        if self.limit.is_reached() {
            return Ok(Flow::Complete);
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run_until_done<H: TransferHandler>(handler: &mut H, chunk: usize) -> (Vec<u8>, Result<Flow>) {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let mut transfer = Transfer::new(&mut buf, 0);
            let result = handler.on_transfer(&mut transfer);
            match result {
                Ok(Flow::Continue) => out.extend_from_slice(transfer.valid()),
                Ok(Flow::Complete) => {
                    out.extend_from_slice(transfer.valid());
                    return (out, result);
                }
                Err(_) => return (out, result),
            }
        }
    }

    #[test]
    fn test_reads_source_in_order() {
        let source: Vec<u8> = (0..100).collect();
        let mut p = PlaybackProducer::new(
            Cursor::new(source.clone()),
            false,
            TransferLimit::bytes(100),
            Arc::new(ByteCounter::new()),
        );

        let (out, result) = run_until_done(&mut p, 30);
        assert_eq!(result.unwrap(), Flow::Complete);
        assert_eq!(out, source);
        assert_eq!(p.counter.take(), 100);
    }

    #[test]
    fn test_eof_without_repeat_fails() {
        let mut p = PlaybackProducer::new(
            Cursor::new(vec![1u8; 50]),
            false,
            TransferLimit::unlimited(),
            Arc::new(ByteCounter::new()),
        );

        let (out, result) = run_until_done(&mut p, 20);
        assert!(matches!(result, Err(StreamError::SourceExhausted)));
        assert_eq!(out.len(), 40);
    }

    #[test]
    fn test_repeat_splices_from_start() {
        let source: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let limit = 2500usize;
        let mut p = PlaybackProducer::new(
            Cursor::new(source.clone()),
            true,
            TransferLimit::bytes(limit as u64),
            Arc::new(ByteCounter::new()),
        );

        let (out, result) = run_until_done(&mut p, 300);
        assert_eq!(result.unwrap(), Flow::Complete);
        assert_eq!(out.len(), limit);

        let tail = limit % source.len();
        assert_eq!(&out[limit - tail..], &source[..tail]);
        assert_eq!(p.rewinds(), 2);
    }

    #[test]
    fn test_repeat_with_source_smaller_than_chunk() {
        let mut p = PlaybackProducer::new(
            Cursor::new(vec![1u8, 2, 3]),
            true,
            TransferLimit::bytes(8),
            Arc::new(ByteCounter::new()),
        );

        let (out, result) = run_until_done(&mut p, 64);
        assert_eq!(result.unwrap(), Flow::Complete);
        assert_eq!(out, vec![1, 2, 3, 1, 2, 3, 1, 2]);
    }

    #[test]
    fn test_repeat_empty_source_fails() {
        let mut p = PlaybackProducer::new(
            Cursor::new(Vec::new()),
            true,
            TransferLimit::unlimited(),
            Arc::new(ByteCounter::new()),
        );
        let (_, result) = run_until_done(&mut p, 16);
        assert!(matches!(result, Err(StreamError::SourceExhausted)));
    }

    #[test]
    fn test_signal_source_constant_fill() {
        let mut source =
            SignalSource::new(100, TransferLimit::bytes(50), Arc::new(ByteCounter::new())).unwrap();

        let (out, result) = run_until_done(&mut source, 32);
        assert_eq!(result.unwrap(), Flow::Complete);
        assert_eq!(out, vec![100u8; 50]);
    }

    #[test]
    fn test_signal_source_rejects_large_amplitude() {
        assert!(SignalSource::new(128, TransferLimit::unlimited(), Arc::new(ByteCounter::new())).is_err());
    }
}
