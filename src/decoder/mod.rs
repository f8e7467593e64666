//! Demuxing, decoding and pixel conversion
//!
//! [`VideoSource`] pulls decoded frames out of the container, [`RgbaConverter`]
//! turns them into fixed-size RGBA, and [`PlaybackSource`] chains the two
//! behind the [`FrameProducer`] seam the decode worker runs against.

mod convert;
mod source;

pub use convert::RgbaConverter;
pub use source::{FrameStatus, StreamDescriptor, VideoSource};

use ffmpeg_next as ffmpeg;
use ffmpeg::frame;

/// One attempt at producing a display-ready frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Produced {
    /// `dest` now holds a frame.
    Frame,
    /// The frame was unusable and dropped; try again.
    Skipped,
    /// The stream is exhausted.
    End,
}

/// Source of display-ready RGBA frames, one `produce` call per frame.
pub trait FrameProducer {
    fn produce(&mut self, dest: &mut [u8]) -> Produced;
}

/// The production pipeline: demux + decode + convert.
pub struct PlaybackSource {
    source: VideoSource,
    converter: RgbaConverter,
    raw: frame::Video,
}

impl PlaybackSource {
    pub fn new(source: VideoSource, converter: RgbaConverter) -> Self {
        Self {
            source,
            converter,
            raw: frame::Video::empty(),
        }
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        self.source.descriptor()
    }
}

impl FrameProducer for PlaybackSource {
    fn produce(&mut self, dest: &mut [u8]) -> Produced {
        match self.source.next_frame(&mut self.raw) {
            FrameStatus::EndOfStream => Produced::End,
            FrameStatus::Decoded => match self.converter.convert_into(&self.raw, dest) {
                Ok(()) => Produced::Frame,
                Err(e) => {
                    log::debug!("dropping unconvertible frame: {e}");
                    Produced::Skipped
                }
            },
        }
    }
}
