//! Playback pipeline
//!
//! Two concurrent units: the decode worker feeds the frame ring from a
//! background thread, the presenter drains it on the main thread at the
//! stream's frame rate.

pub mod clock;
pub mod decode;
pub mod present;

pub use clock::FramePacer;
pub use decode::DecodeWorker;
pub use present::Presenter;
