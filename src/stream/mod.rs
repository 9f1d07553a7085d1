//! Sample streaming core: ring buffer, producers, writer and controller

mod buffer;
mod capture;
mod limit;
mod pipeline;
mod playback;
mod writer;

pub use buffer::RingBuffer;
pub use capture::CaptureProducer;
pub use limit::{TransferLimit, BYTES_PER_SAMPLE, MAX_SAMPLES};
pub use pipeline::{
    Pipeline, PipelineConfig, ProgressFn, StreamEnd, StreamState, StreamSummary,
    DEFAULT_RING_CAPACITY, DEFAULT_WRITE_CHUNK,
};
pub use playback::{PlaybackProducer, SignalSource, MAX_AMPLITUDE};
pub use writer::{WriterStatus, WriterTask};
