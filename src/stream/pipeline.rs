//! Stream controller - owns the lifecycle of transport, ring buffer and writer

use crate::error::{Result, StreamError};
use crate::format::OutputFormat;
use crate::report::{ByteCounter, RateReporter, RateSample};
use crate::stream::{
    CaptureProducer, PlaybackProducer, RingBuffer, SignalSource, TransferLimit, WriterStatus,
    WriterTask,
};
use crate::sync::CancelToken;
use crate::transport::{Direction, TransferHandler, Transport, TransportExit};
use crossbeam_channel::{select, tick};
use parking_lot::Mutex;
use std::io::{Read, Seek, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default ring capacity: 50 MiB
pub const DEFAULT_RING_CAPACITY: usize = 50 * 1024 * 1024;

/// Default writer chunk: 1 MiB
pub const DEFAULT_WRITE_CHUNK: usize = 1024 * 1024;

/// Pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Ring buffer size in bytes (usable capacity is one less)
    pub ring_capacity: usize,
    /// Largest single write the writer issues
    pub write_chunk: usize,
    /// Reporter cadence; a tick with zero bytes is a stall
    pub report_interval: Duration,
    /// Optional cap on streamed bytes
    pub limit: TransferLimit,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            write_chunk: DEFAULT_WRITE_CHUNK,
            report_interval: Duration::from_secs(1),
            limit: TransferLimit::unlimited(),
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.ring_capacity < 2 {
            return Err(StreamError::InvalidConfig(format!(
                "ring capacity {} is too small",
                self.ring_capacity
            )));
        }
        if self.write_chunk == 0 {
            return Err(StreamError::InvalidConfig(
                "write chunk must be non-zero".into(),
            ));
        }
        if self.report_interval.is_zero() {
            return Err(StreamError::InvalidConfig(
                "report interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Created, nothing running
    Idle,
    /// Transport delivering transfers
    Streaming,
    /// Transport stopped, writer emptying the buffer
    Draining,
    /// Everything joined and the file finalized
    Closed,
}

/// How a stream ended
#[derive(Debug)]
pub enum StreamEnd {
    /// Transfer limit reached
    Completed,
    /// Cancellation token fired (Ctrl+C)
    Cancelled,
    /// Fatal error; the file was still drained and finalized
    Failed(StreamError),
}

/// Result of one pipeline run
#[derive(Debug)]
pub struct StreamSummary {
    pub end: StreamEnd,
    /// Payload bytes accepted by the producer
    pub total_bytes: u64,
    /// Wall time from start to close
    pub elapsed: Duration,
}

impl StreamSummary {
    /// Completed or cancelled by the user
    pub fn is_success(&self) -> bool {
        !matches!(self.end, StreamEnd::Failed(_))
    }
}

/// Progress callback invoked once per report tick
pub type ProgressFn = Box<dyn Fn(&RateSample) + Send>;

/// Why the reporter loop returned
enum Halt {
    Cancelled,
    TransportStopped,
    WriterFailed(StreamError),
    Stalled(Duration),
}

/// Controller coordinating transport, producer, writer and reporter
pub struct Pipeline {
    config: PipelineConfig,
    state: Arc<Mutex<StreamState>>,
    counter: Arc<ByteCounter>,
    progress: Option<ProgressFn>,
}

impl Pipeline {
    /// Create a pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Arc::new(Mutex::new(StreamState::Idle)),
            counter: Arc::new(ByteCounter::new()),
            progress: None,
        })
    }

    /// Replace the default progress output (an `info!` line per tick)
    pub fn on_progress(&mut self, progress: impl Fn(&RateSample) + Send + 'static) {
        self.progress = Some(Box::new(progress));
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get current pipeline state
    pub fn state(&self) -> StreamState {
        *self.state.lock()
    }

    /// Byte counter shared with producers built by this pipeline
    pub fn counter(&self) -> Arc<ByteCounter> {
        self.counter.clone()
    }

    /// File playback handler charged against this pipeline's limit and counter
    pub fn playback_producer<S: Read + Seek + Send>(
        &self,
        source: S,
        repeat: bool,
    ) -> PlaybackProducer<S> {
        PlaybackProducer::new(source, repeat, self.config.limit, self.counter.clone())
    }

    /// Continuous-wave handler charged against this pipeline's limit and counter
    pub fn signal_source(&self, amplitude: u8) -> Result<SignalSource> {
        SignalSource::new(amplitude, self.config.limit, self.counter.clone())
    }

    /// Capture from `transport` into `store` until the limit, a failure or
    /// cancellation, then drain and finalize the file
    ///
    /// The store is returned once the header has been patched. A failed
    /// stream is reported through [`StreamSummary::end`]; `Err` is returned
    /// only when the stream never started or the writer thread was lost.
    pub fn run_capture<W>(
        &mut self,
        transport: &mut dyn Transport,
        mut store: W,
        format: OutputFormat,
        cancel: &CancelToken,
    ) -> Result<(StreamSummary, W)>
    where
        W: Write + Seek + Send + 'static,
    {
        if transport.direction() != Direction::Receive {
            return Err(StreamError::InvalidConfig(
                "capture needs a receive transport".into(),
            ));
        }
        self.begin()?;

        let started = Instant::now();
        let setup = format
            .write_preamble(&mut store)
            .and_then(|_| self.start_writer(store));
        let (buffer, writer) = match setup {
            Ok(parts) => parts,
            Err(e) => return Err(self.abort(e)),
        };
        let status = writer.status();

        let producer = CaptureProducer::new(
            buffer,
            self.counter.clone(),
            self.config.limit,
            format.needs_unsigned(),
        );
        if let Err(e) = transport.start(Box::new(producer)) {
            let _ = writer.finish();
            return Err(self.abort(e));
        }
        info!("Capture started ({:?})", format);

        let mut reporter = RateReporter::new(self.config.report_interval);
        let halt = self.monitor(transport, Some(&status), cancel, &mut reporter);

        self.set_state(StreamState::Draining);
        let mut end = resolve(halt, transport.stop());

        info!("Waiting for writer to drain");
        let mut store = match writer.finish() {
            Ok(store) => store,
            Err(e) => return Err(self.abort(e)),
        };
        if let Some(e) = status.take_error() {
            end = keep_first_failure(end, e);
        }

        if let Err(e) = format.finalize(&mut store) {
            error!("Failed to finalize capture file: {}", e);
            end = keep_first_failure(end, e);
        }
        debug!("Writer stored {} payload bytes", status.bytes_written());

        let summary = self.close(end, &reporter, started);
        Ok((summary, store))
    }

    /// Play `handler` through `transport` until the limit, a failure or
    /// cancellation
    pub fn run_transmit(
        &mut self,
        transport: &mut dyn Transport,
        handler: Box<dyn TransferHandler>,
        cancel: &CancelToken,
    ) -> Result<StreamSummary> {
        if transport.direction() != Direction::Transmit {
            return Err(StreamError::InvalidConfig(
                "playback needs a transmit transport".into(),
            ));
        }
        self.begin()?;

        let started = Instant::now();
        if let Err(e) = transport.start(handler) {
            return Err(self.abort(e));
        }
        info!("Playback started");

        let mut reporter = RateReporter::new(self.config.report_interval);
        let halt = self.monitor(transport, None, cancel, &mut reporter);

        self.set_state(StreamState::Draining);
        let end = resolve(halt, transport.stop());

        Ok(self.close(end, &reporter, started))
    }

    fn begin(&self) -> Result<()> {
        let mut state = self.state.lock();
        if matches!(*state, StreamState::Streaming | StreamState::Draining) {
            return Err(StreamError::AlreadyRunning);
        }
        *state = StreamState::Streaming;
        // Leftovers from a previous run must not count toward this one
        self.counter.take();
        Ok(())
    }

    fn start_writer<W: Write + Send + 'static>(
        &self,
        store: W,
    ) -> Result<(Arc<RingBuffer>, WriterTask<W>)> {
        let buffer = Arc::new(RingBuffer::new(self.config.ring_capacity));
        debug!("Ring buffer: {} bytes", buffer.capacity());
        let writer = WriterTask::spawn(store, buffer.clone(), self.config.write_chunk)?;
        Ok((buffer, writer))
    }

    /// Reporter loop: one tick per interval until something ends the stream
    fn monitor(
        &self,
        transport: &dyn Transport,
        writer: Option<&WriterStatus>,
        cancel: &CancelToken,
        reporter: &mut RateReporter,
    ) -> Halt {
        let ticker = tick(reporter.interval());
        let cancelled = cancel.receiver();

        loop {
            select! {
                recv(cancelled) -> _ => {
                    info!("Cancellation requested");
                    return Halt::Cancelled;
                }
                recv(ticker) -> _ => {}
            }

            if let Some(status) = writer {
                if status.has_failed() {
                    let err = status.take_error().unwrap_or_else(|| {
                        StreamError::Storage(std::io::Error::other("writer stopped"))
                    });
                    return Halt::WriterFailed(err);
                }
            }

            let sample = reporter.tick(&self.counter);
            self.report(&sample);

            if !transport.is_streaming() {
                debug!("Transport no longer streaming");
                return Halt::TransportStopped;
            }
            if sample.is_stall() {
                warn!("No bytes transferred in {:?}, stopping", sample.elapsed);
                return Halt::Stalled(sample.elapsed);
            }
        }
    }

    fn report(&self, sample: &RateSample) {
        match &self.progress {
            Some(progress) => progress(sample),
            None => info!("{}", sample),
        }
    }

    fn set_state(&self, state: StreamState) {
        *self.state.lock() = state;
    }

    fn abort(&self, err: StreamError) -> StreamError {
        error!("Stream aborted: {}", err);
        self.set_state(StreamState::Closed);
        err
    }

    fn close(&self, end: StreamEnd, reporter: &RateReporter, started: Instant) -> StreamSummary {
        self.set_state(StreamState::Closed);

        let summary = StreamSummary {
            end,
            total_bytes: reporter.total_bytes() + self.counter.take(),
            elapsed: started.elapsed(),
        };
        match &summary.end {
            StreamEnd::Failed(e) => error!("Stream failed after {} bytes: {}", summary.total_bytes, e),
            end => info!("Stream closed ({:?}), {} bytes", end, summary.total_bytes),
        }
        summary
    }
}

/// Combine why the reporter loop returned with how the transport exited
///
/// A producer failure recorded by the transport outranks cancellation and
/// stall, which may have been observed before the failure was noticed. A
/// writer failure is the root cause of anything the producer hit afterwards.
fn resolve(halt: Halt, exit: TransportExit) -> StreamEnd {
    match (halt, exit) {
        (Halt::WriterFailed(e), exit) => {
            if let TransportExit::Failed(later) = exit {
                debug!("Transport also failed after the writer: {}", later);
            }
            StreamEnd::Failed(e)
        }
        (_, TransportExit::Failed(e)) => StreamEnd::Failed(e),
        (Halt::Cancelled, _) => StreamEnd::Cancelled,
        (Halt::Stalled(interval), _) => {
            StreamEnd::Failed(StreamError::StallDetected { interval })
        }
        (Halt::TransportStopped, TransportExit::Completed) => StreamEnd::Completed,
        (Halt::TransportStopped, TransportExit::Stopped) => {
            StreamEnd::Failed(StreamError::transport("transport stopped unexpectedly"))
        }
    }
}

fn keep_first_failure(end: StreamEnd, err: StreamError) -> StreamEnd {
    match end {
        StreamEnd::Failed(first) => {
            debug!("Additional failure during shutdown: {}", err);
            StreamEnd::Failed(first)
        }
        _ => StreamEnd::Failed(err),
    }
}
