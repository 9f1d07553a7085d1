//! Progress reporting for an active stream

mod rate;

pub use rate::{ByteCounter, RateReporter, RateSample};
