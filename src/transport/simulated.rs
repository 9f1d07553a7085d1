//! Paced software transport standing in for USB bulk transfers

use super::{Direction, Flow, Transfer, TransferHandler, Transport, TransportExit};
use crate::error::{Result, StreamError};
use crate::sync::CancelToken;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Transport that calls the handler from a dedicated thread at a fixed period
///
/// Receive transfers carry a ramp: byte `k` of the stream is `k mod 256`.
/// Transmit transfers hand the handler's payload to an optional sink.
pub struct SimulatedTransport {
    direction: Direction,
    chunk_len: usize,
    period: Duration,
    stall_after: Option<u64>,
    sink: Option<Box<dyn Write + Send>>,
    streaming: Arc<AtomicBool>,
    cancel: CancelToken,
    handle: Option<JoinHandle<TransportExit>>,
}

impl SimulatedTransport {
    /// Capture transport delivering `chunk_len` bytes every `period`
    pub fn receive(chunk_len: usize, period: Duration) -> Self {
        Self::new(Direction::Receive, chunk_len, period, None)
    }

    /// Playback transport requesting `chunk_len` bytes every `period`
    ///
    /// Payload produced by the handler is written to `sink`.
    pub fn transmit(chunk_len: usize, period: Duration, sink: Box<dyn Write + Send>) -> Self {
        Self::new(Direction::Transmit, chunk_len, period, Some(sink))
    }

    fn new(
        direction: Direction,
        chunk_len: usize,
        period: Duration,
        sink: Option<Box<dyn Write + Send>>,
    ) -> Self {
        Self {
            direction,
            chunk_len,
            period,
            stall_after: None,
            sink,
            streaming: Arc::new(AtomicBool::new(false)),
            cancel: CancelToken::new(),
            handle: None,
        }
    }

    /// Stop delivering transfers after `transfers` callbacks while still
    /// reporting as streaming, like a wedged USB endpoint
    pub fn stall_after(mut self, transfers: u64) -> Self {
        self.stall_after = Some(transfers);
        self
    }
}

impl Transport for SimulatedTransport {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn start(&mut self, handler: Box<dyn TransferHandler>) -> Result<()> {
        if self.handle.is_some() {
            return Err(StreamError::AlreadyRunning);
        }
        if self.chunk_len == 0 {
            return Err(StreamError::InvalidConfig(
                "transfer chunk length must be non-zero".into(),
            ));
        }

        self.cancel = CancelToken::new();
        self.streaming.store(true, Ordering::SeqCst);

        let worker = Worker {
            direction: self.direction,
            chunk_len: self.chunk_len,
            period: self.period,
            stall_after: self.stall_after,
            sink: self.sink.take(),
            streaming: self.streaming.clone(),
            cancel: self.cancel.clone(),
        };

        let handle = thread::Builder::new()
            .name("iqstream-transfer".into())
            .spawn(move || worker.run(handler))
            .map_err(|e| {
                self.streaming.store(false, Ordering::SeqCst);
                StreamError::transport(format!("failed to spawn transfer thread: {}", e))
            })?;
        self.handle = Some(handle);

        info!(
            "Simulated {:?} transport started: {} byte transfers every {:?}",
            self.direction, self.chunk_len, self.period
        );
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    fn stop(&mut self) -> TransportExit {
        self.cancel.cancel();
        let exit = match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                TransportExit::Failed(StreamError::transport("transfer thread panicked"))
            }),
            None => TransportExit::Stopped,
        };
        self.streaming.store(false, Ordering::SeqCst);
        debug!("Simulated transport stopped: {:?}", exit);
        exit
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}

struct Worker {
    direction: Direction,
    chunk_len: usize,
    period: Duration,
    stall_after: Option<u64>,
    sink: Option<Box<dyn Write + Send>>,
    streaming: Arc<AtomicBool>,
    cancel: CancelToken,
}

impl Worker {
    fn run(mut self, mut handler: Box<dyn TransferHandler>) -> TransportExit {
        debug!("Transfer thread started");

        let mut buffer = vec![0u8; self.chunk_len];
        let mut ramp: u8 = 0;
        let mut transfers: u64 = 0;
        let mut next = Instant::now();

        let exit = loop {
            let wait = next.saturating_duration_since(Instant::now());
            if self.cancel.wait_timeout(wait) {
                break TransportExit::Stopped;
            }
            next += self.period;

            if self.stall_after.is_some_and(|limit| transfers >= limit) {
                // Wedged: stay "streaming" but deliver nothing until stopped
                if self.cancel.wait_timeout(Duration::from_secs(3600)) {
                    break TransportExit::Stopped;
                }
                continue;
            }

            let valid_length = match self.direction {
                Direction::Receive => {
                    for byte in buffer.iter_mut() {
                        *byte = ramp;
                        ramp = ramp.wrapping_add(1);
                    }
                    buffer.len()
                }
                Direction::Transmit => {
                    buffer.fill(0);
                    0
                }
            };

            let mut transfer = Transfer::new(&mut buffer, valid_length);
            let result = handler.on_transfer(&mut transfer);
            transfers += 1;

            let flow = match result {
                Ok(flow) => flow,
                Err(e) => break TransportExit::Failed(e),
            };

            if let Some(sink) = self.sink.as_mut() {
                if let Err(e) = sink.write_all(transfer.valid()) {
                    warn!("Transmit sink write failed: {}", e);
                    break TransportExit::Failed(StreamError::transport(e.to_string()));
                }
            }

            if flow == Flow::Complete {
                break TransportExit::Completed;
            }
        };

        if let Some(sink) = self.sink.as_mut() {
            let _ = sink.flush();
        }
        self.streaming.store(false, Ordering::SeqCst);
        debug!("Transfer thread stopped after {} transfers", transfers);
        exit
    }
}
