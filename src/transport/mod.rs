//! Boundary to the hardware transfer engine
//!
//! The device layer owns a set of fixed-size transfer buffers and calls a
//! [`TransferHandler`] once per buffer from its own event thread. The
//! handler must return quickly: no storage I/O, no unbounded loops. Anything
//! other than `Ok(Flow::Continue)` tells the transport to stop streaming.

mod simulated;

pub use simulated::SimulatedTransport;

use crate::error::{Result, StreamError};

/// Direction of sample flow relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device to host (capture)
    Receive,
    /// Host to device (playback)
    Transmit,
}

/// One hardware buffer handed to the transfer callback
#[derive(Debug)]
pub struct Transfer<'a> {
    /// Whole transfer buffer
    pub buffer: &'a mut [u8],
    /// Bytes of `buffer` carrying stream payload.
    ///
    /// Set by the transport for receive; set by the handler for transmit.
    pub valid_length: usize,
}

impl<'a> Transfer<'a> {
    pub fn new(buffer: &'a mut [u8], valid_length: usize) -> Self {
        let valid_length = valid_length.min(buffer.len());
        Self {
            buffer,
            valid_length,
        }
    }

    /// The payload portion of the buffer
    pub fn valid(&self) -> &[u8] {
        &self.buffer[..self.valid_length]
    }
}

/// What the transport should do after a successful callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep delivering transfers
    Continue,
    /// Transfer limit reached; this transfer was the last one
    Complete,
}

/// Per-transfer callback invoked from the transport's event thread
pub trait TransferHandler: Send {
    fn on_transfer(&mut self, transfer: &mut Transfer<'_>) -> Result<Flow>;
}

impl<F> TransferHandler for F
where
    F: FnMut(&mut Transfer<'_>) -> Result<Flow> + Send,
{
    fn on_transfer(&mut self, transfer: &mut Transfer<'_>) -> Result<Flow> {
        self(transfer)
    }
}

/// Box a closure as a transfer handler
pub fn handler_fn<F>(f: F) -> Box<dyn TransferHandler>
where
    F: FnMut(&mut Transfer<'_>) -> Result<Flow> + Send + 'static,
{
    Box::new(f)
}

/// Why a transport stopped calling its handler
#[derive(Debug)]
pub enum TransportExit {
    /// Handler reported the transfer limit was reached
    Completed,
    /// Handler or transport failed
    Failed(StreamError),
    /// Stopped from the outside while still streaming
    Stopped,
}

/// A source or sink of hardware transfers
pub trait Transport {
    /// Which way samples flow
    fn direction(&self) -> Direction;

    /// Begin invoking `handler` once per transfer
    fn start(&mut self, handler: Box<dyn TransferHandler>) -> Result<()>;

    /// Whether transfers are still being delivered
    fn is_streaming(&self) -> bool;

    /// Stop streaming and wait for the event thread to let go of the handler
    fn stop(&mut self) -> TransportExit;
}
