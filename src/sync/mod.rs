//! Shutdown signalling between the controller and worker threads

mod cancel;

pub use cancel::CancelToken;
