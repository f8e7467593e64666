//! Structured error kinds for playback setup and the display surface.
//!
//! Setup failures are fatal: they surface before the pipeline starts and
//! terminate the program with a diagnostic. Per-frame decode or conversion
//! problems never appear here; they are recovered locally by dropping the
//! offending frame.

use ffmpeg_next as ffmpeg;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    /// The container could not be opened or carries no usable stream info.
    #[error("cannot open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: ffmpeg::Error,
    },

    #[error("no video stream in {path:?}")]
    NoVideoStream { path: PathBuf },

    #[error("no decoder available for codec {codec}")]
    CodecUnavailable { codec: String },

    #[error("cannot open video decoder: {0}")]
    DecoderOpen(#[source] ffmpeg::Error),

    #[error("cannot initialize pixel format converter: {0}")]
    Converter(#[source] ffmpeg::Error),

    #[error("cannot allocate frame buffer of {bytes} bytes")]
    Allocation { bytes: usize },

    #[error("display surface error: {0}")]
    Surface(String),

    /// The decode worker died before reporting its setup result.
    #[error("decode worker terminated during startup")]
    WorkerFailed,
}
