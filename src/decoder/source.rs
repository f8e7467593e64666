//! Container demuxing and video decoding via FFmpeg.

use std::path::{Path, PathBuf};
use std::sync::Once;

use ffmpeg_next as ffmpeg;
use ffmpeg::{Packet, codec, decoder, format, frame, media};

use crate::error::PlayerError;

/// Immutable description of the selected video stream.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    pub codec: String,
    pub pixel_format: format::Pixel,
    pub width: u32,
    pub height: u32,
    /// Reduced from the stream's rational frame rate; drives pacing and the
    /// default ring depth.
    pub frame_rate: f64,
}

impl std::fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}x{} {:?} @ {:.3} fps",
            self.codec, self.width, self.height, self.pixel_format, self.frame_rate
        )
    }
}

/// Outcome of pulling the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A frame was decoded into the caller's buffer.
    Decoded,
    /// No frame will ever come again (end of file, or the container read
    /// failed and the stream was wound down).
    EndOfStream,
}

fn init_ffmpeg() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        ffmpeg::init().expect("FFmpeg initialization failed");
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Warning);
    });
}

/// Demux/decode front end for one video stream.
///
/// Owns the container and decoder contexts for its whole life; exactly one
/// caller (the decode worker thread) drives it. FFmpeg contexts are not
/// shareable, so the whole source is created and dropped on that thread.
pub struct VideoSource {
    input: format::context::Input,
    decoder: decoder::Video,
    stream_index: usize,
    descriptor: StreamDescriptor,
    draining: bool,
}

impl VideoSource {
    /// Open `path`, pick the best video stream and bring up its decoder.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PlayerError> {
        init_ffmpeg();

        let path: PathBuf = path.as_ref().to_path_buf();
        let input = format::input(&path).map_err(|e| PlayerError::Open {
            path: path.clone(),
            source: e,
        })?;

        let (stream_index, descriptor, video_decoder) = {
            let stream = input
                .streams()
                .best(media::Type::Video)
                .ok_or_else(|| PlayerError::NoVideoStream { path: path.clone() })?;

            let parameters = stream.parameters();
            let codec_id = parameters.id();
            let codec = decoder::find(codec_id).ok_or_else(|| PlayerError::CodecUnavailable {
                codec: format!("{codec_id:?}"),
            })?;

            let context = codec::context::Context::from_parameters(parameters)
                .map_err(PlayerError::DecoderOpen)?;
            let video_decoder = context
                .decoder()
                .open_as(codec)
                .map_err(PlayerError::DecoderOpen)?
                .video()
                .map_err(PlayerError::DecoderOpen)?;

            // r_frame_rate first, like ffprobe reports; fall back to the
            // container average when it is missing or nonsense.
            let mut frame_rate = f64::from(stream.rate());
            if !frame_rate.is_finite() || frame_rate <= 0.0 {
                frame_rate = f64::from(stream.avg_frame_rate());
            }

            let descriptor = StreamDescriptor {
                codec: codec.name().to_string(),
                pixel_format: video_decoder.format(),
                width: video_decoder.width(),
                height: video_decoder.height(),
                frame_rate,
            };

            (stream.index(), descriptor, video_decoder)
        };

        Ok(Self {
            input,
            decoder: video_decoder,
            stream_index,
            descriptor,
            draining: false,
        })
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    /// Decode the next frame of the selected stream into `frame`.
    ///
    /// Keeps reading container packets until the decoder hands one back:
    /// packets of other streams are discarded, and a packet the decoder
    /// rejects is dropped without ending playback. End of file and container
    /// read errors both drain the decoder and report `EndOfStream`.
    pub fn next_frame(&mut self, frame: &mut frame::Video) -> FrameStatus {
        loop {
            if self.decoder.receive_frame(frame).is_ok() {
                return FrameStatus::Decoded;
            }
            if self.draining {
                return FrameStatus::EndOfStream;
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        log::debug!("dropping undecodable packet: {e}");
                    }
                }
                Err(ffmpeg::Error::Eof) => self.start_drain(),
                Err(e) => {
                    log::warn!("container read failed, ending playback: {e}");
                    self.start_drain();
                }
            }
        }
    }

    fn start_drain(&mut self) {
        if let Err(e) = self.decoder.send_eof() {
            log::debug!("decoder refused drain request: {e}");
        }
        self.draining = true;
    }
}
