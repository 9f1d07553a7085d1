//! Throughput sampling and stall detection

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

const MIB: f64 = 1024.0 * 1024.0;

/// Bytes moved since the last report tick
///
/// Incremented from the transfer callback, drained by the reporter.
#[derive(Debug, Default)]
pub struct ByteCounter {
    bytes: AtomicU64,
}

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record accepted bytes (transfer callback side)
    #[inline]
    pub fn add(&self, bytes: usize) {
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Read and reset the counter (reporter side)
    pub fn take(&self) -> u64 {
        self.bytes.swap(0, Ordering::AcqRel)
    }

    /// Current value without resetting
    pub fn peek(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }
}

/// One reporter observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    /// Bytes transferred since the previous tick
    pub bytes: u64,
    /// Wall time since the previous tick
    pub elapsed: Duration,
}

impl RateSample {
    /// Throughput in bytes per second
    pub fn bytes_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }

    /// Nothing moved during the interval
    pub fn is_stall(&self) -> bool {
        self.bytes == 0
    }
}

impl fmt::Display for RateSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:4.1} MiB / {:5.3} sec = {:4.1} MiB/second",
            self.bytes as f64 / MIB,
            self.elapsed.as_secs_f64(),
            self.bytes_per_second() / MIB
        )
    }
}

/// Periodic rate reporter state
pub struct RateReporter {
    interval: Duration,
    last_tick: Instant,
    total_bytes: u64,
    ticks: u64,
}

impl RateReporter {
    /// Create a reporter; the first tick measures from now
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: Instant::now(),
            total_bytes: 0,
            ticks: 0,
        }
    }

    /// Configured tick cadence
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Drain the counter and compute the rate since the previous tick
    pub fn tick(&mut self, counter: &ByteCounter) -> RateSample {
        self.tick_at(counter, Instant::now())
    }

    fn tick_at(&mut self, counter: &ByteCounter, now: Instant) -> RateSample {
        let bytes = counter.take();
        let elapsed = now.duration_since(self.last_tick);
        self.last_tick = now;
        self.total_bytes += bytes;
        self.ticks += 1;

        let sample = RateSample { bytes, elapsed };
        trace!(
            "Tick {}: {} bytes in {:?} ({} total)",
            self.ticks,
            bytes,
            elapsed,
            self.total_bytes
        );
        sample
    }

    /// Sum of all bytes observed across ticks
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}
