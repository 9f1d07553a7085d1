//! Writer thread: drains the ring buffer into the backing store

use crate::error::{Result, StreamError};
use crate::stream::RingBuffer;
use crate::sync::CancelToken;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// State shared between the writer thread and the controller
#[derive(Debug, Default)]
pub struct WriterStatus {
    failed: AtomicBool,
    error: Mutex<Option<StreamError>>,
    written: AtomicU64,
}

impl WriterStatus {
    /// The writer hit a storage error and exited
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Take the recorded storage error, if any
    pub fn take_error(&self) -> Option<StreamError> {
        self.error.lock().take()
    }

    /// Payload bytes handed to the store so far
    pub fn bytes_written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    fn fail(&self, err: StreamError) {
        *self.error.lock() = Some(err);
        self.failed.store(true, Ordering::Release);
    }
}

/// Handle to the background writer thread
///
/// The thread owns the store while it runs and hands it back from
/// [`WriterTask::finish`], so the controller can patch headers afterwards.
pub struct WriterTask<W> {
    buffer: Arc<RingBuffer>,
    shutdown: CancelToken,
    status: Arc<WriterStatus>,
    handle: Option<JoinHandle<W>>,
}

impl<W: Write + Send + 'static> WriterTask<W> {
    /// Start draining `buffer` into `store`, `chunk_size` bytes at a time
    pub fn spawn(store: W, buffer: Arc<RingBuffer>, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StreamError::InvalidConfig(
                "writer chunk size must be non-zero".into(),
            ));
        }

        let shutdown = CancelToken::new();
        let status = Arc::new(WriterStatus::default());

        let handle = {
            let buffer = buffer.clone();
            let shutdown = shutdown.clone();
            let status = status.clone();
            thread::Builder::new()
                .name("iqstream-writer".into())
                .spawn(move || writer_thread(store, buffer, shutdown, status, chunk_size))?
        };

        Ok(Self {
            buffer,
            shutdown,
            status,
            handle: Some(handle),
        })
    }

    pub fn status(&self) -> Arc<WriterStatus> {
        self.status.clone()
    }

    /// Request shutdown, wait for the buffer to drain and the thread to exit
    ///
    /// Returns the store. A storage error that ended the thread early stays
    /// in [`WriterStatus`].
    pub fn finish(mut self) -> Result<W> {
        self.request_shutdown();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| {
                StreamError::Storage(std::io::Error::other("writer thread panicked"))
            }),
            None => Err(StreamError::NotRunning),
        }
    }

    fn request_shutdown(&self) {
        self.shutdown.cancel();
        self.buffer.notify();
    }
}

impl<W> Drop for WriterTask<W> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.shutdown.cancel();
            self.buffer.notify();
            let _ = handle.join();
        }
    }
}

/// Writer thread function
fn writer_thread<W: Write>(
    mut store: W,
    buffer: Arc<RingBuffer>,
    shutdown: CancelToken,
    status: Arc<WriterStatus>,
    chunk_size: usize,
) -> W {
    info!("Writer thread started");

    let mut chunk = vec![0u8; chunk_size];

    loop {
        let count = buffer.pop(&mut chunk);

        if count == 0 {
            // Exit only once shutdown is requested and nothing is left
            if shutdown.is_cancelled() && buffer.is_empty() {
                break;
            }
            buffer.wait_for_data(&shutdown);
            continue;
        }

        // write_all retries short writes and EINTR until the chunk is out
        if let Err(e) = store.write_all(&chunk[..count]) {
            error!("Write to backing store failed: {}", e);
            status.fail(StreamError::Storage(e));
            return store;
        }
        status.written.fetch_add(count as u64, Ordering::AcqRel);
    }

    if let Err(e) = store.flush() {
        error!("Flush of backing store failed: {}", e);
        status.fail(StreamError::Storage(e));
    }

    debug!("Writer drained {} bytes", status.bytes_written());
    info!("Writer thread stopped");
    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    /// Store that accepts a few bytes per call to exercise the retry path
    struct Trickle {
        data: Vec<u8>,
        max_per_write: usize,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.max_per_write);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_drains_everything_before_exit() {
        let buffer = Arc::new(RingBuffer::new(4096));
        let writer = WriterTask::spawn(Vec::new(), buffer.clone(), 100).unwrap();

        let data: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();
        for piece in data.chunks(250) {
            assert_eq!(buffer.push(piece), 0);
            buffer.notify();
        }

        let store = writer.finish().unwrap();
        assert_eq!(store, data);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_pending_data_written_when_shutdown_races_push() {
        let buffer = Arc::new(RingBuffer::new(1024));
        // Data lands before the thread ever waits, and without a notify
        assert_eq!(buffer.push(&[5u8; 700]), 0);

        let writer = WriterTask::spawn(Vec::new(), buffer.clone(), 64).unwrap();
        let store = writer.finish().unwrap();
        assert_eq!(store, vec![5u8; 700]);
    }

    #[test]
    fn test_partial_writes_are_retried() {
        let buffer = Arc::new(RingBuffer::new(1024));
        let store = Trickle {
            data: Vec::new(),
            max_per_write: 7,
        };
        let writer = WriterTask::spawn(store, buffer.clone(), 512).unwrap();

        buffer.push(&[9u8; 500]);
        buffer.notify();

        let store = writer.finish().unwrap();
        assert_eq!(store.data, vec![9u8; 500]);
    }

    #[test]
    fn test_storage_error_is_reported() {
        let buffer = Arc::new(RingBuffer::new(1024));
        let writer = WriterTask::spawn(Broken, buffer.clone(), 64).unwrap();
        let status = writer.status();

        buffer.push(&[1u8; 10]);
        buffer.notify();

        for _ in 0..200 {
            if status.has_failed() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(status.has_failed());
        assert!(matches!(status.take_error(), Some(StreamError::Storage(_))));

        writer.finish().unwrap();
    }

    #[test]
    fn test_zero_chunk_rejected() {
        let buffer = Arc::new(RingBuffer::new(16));
        assert!(WriterTask::spawn(Vec::new(), buffer, 0).is_err());
    }
}
