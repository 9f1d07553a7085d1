//! Optional cap on the number of bytes streamed

/// Bytes per complex sample: one I byte and one Q byte
pub const BYTES_PER_SAMPLE: u64 = 2;

/// Sample counts at or above this are rejected
pub const MAX_SAMPLES: u64 = 1 << 63;

/// Remaining byte budget for a stream
///
/// The cap is hard: [`TransferLimit::take`] never grants more than what is
/// left, so a chunk straddling the limit is truncated before it is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferLimit {
    remaining: Option<u64>,
}

impl TransferLimit {
    /// No cap
    pub fn unlimited() -> Self {
        Self { remaining: None }
    }

    /// Cap at `bytes`
    pub fn bytes(bytes: u64) -> Self {
        Self {
            remaining: Some(bytes),
        }
    }

    /// Cap at `samples` I/Q pairs
    pub fn samples(samples: u64) -> Self {
        Self::bytes(samples.saturating_mul(BYTES_PER_SAMPLE))
    }

    pub fn is_limited(&self) -> bool {
        self.remaining.is_some()
    }

    /// Bytes still allowed, `None` when unlimited
    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    /// Grant up to `len` bytes and charge them against the budget
    pub fn take(&mut self, len: usize) -> usize {
        match self.remaining.as_mut() {
            Some(remaining) => {
                let granted = (len as u64).min(*remaining);
                *remaining -= granted;
                granted as usize
            }
            None => len,
        }
    }

    /// The budget is spent
    pub fn is_reached(&self) -> bool {
        self.remaining == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_grants_everything() {
        let mut limit = TransferLimit::unlimited();
        assert_eq!(limit.take(1 << 20), 1 << 20);
        assert!(!limit.is_reached());
        assert!(!limit.is_limited());
        assert_eq!(limit.remaining(), None);
    }

    #[test]
    fn test_limit_truncates_last_chunk() {
        let mut limit = TransferLimit::samples(150);
        assert!(limit.is_limited());
        assert_eq!(limit.remaining(), Some(300));

        assert_eq!(limit.take(256), 256);
        assert!(!limit.is_reached());
        assert_eq!(limit.take(256), 44);
        assert!(limit.is_reached());
        assert_eq!(limit.take(256), 0);
    }
}
