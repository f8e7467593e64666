//! Pixel format conversion to display-ready RGBA.

use ffmpeg_next as ffmpeg;
use ffmpeg::software::scaling;
use ffmpeg::{format, frame};

use crate::decoder::StreamDescriptor;
use crate::error::PlayerError;

/// Persistent scaler from the stream's native layout to fixed-size RGBA.
///
/// The filter is bicubic, chosen once at construction; every frame of the
/// stream goes through the same conversion. Output lands in a caller-supplied
/// buffer, stride padding stripped.
pub struct RgbaConverter {
    scaler: scaling::Context,
    rgba: frame::Video,
    width: u32,
    height: u32,
}

impl RgbaConverter {
    pub fn new(
        descriptor: &StreamDescriptor,
        dest_width: u32,
        dest_height: u32,
    ) -> Result<Self, PlayerError> {
        let scaler = scaling::Context::get(
            descriptor.pixel_format,
            descriptor.width,
            descriptor.height,
            format::Pixel::RGBA,
            dest_width,
            dest_height,
            scaling::Flags::BICUBIC,
        )
        .map_err(PlayerError::Converter)?;

        Ok(Self {
            scaler,
            rgba: frame::Video::new(format::Pixel::RGBA, dest_width, dest_height),
            width: dest_width,
            height: dest_height,
        })
    }

    /// Bytes one converted frame occupies.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Scale `src` into `dest`. `dest` must hold exactly [`Self::frame_len`]
    /// bytes. Fails (recoverably) when the source frame no longer matches the
    /// layout the scaler was built for.
    pub fn convert_into(
        &mut self,
        src: &frame::Video,
        dest: &mut [u8],
    ) -> Result<(), ffmpeg::Error> {
        self.scaler.run(src, &mut self.rgba)?;

        let row = self.width as usize * 4;
        let rows = self.height as usize;
        let stride = self.rgba.stride(0);
        let data = self.rgba.data(0);

        if stride == row {
            dest[..row * rows].copy_from_slice(&data[..row * rows]);
        } else {
            for r in 0..rows {
                dest[r * row..(r + 1) * row]
                    .copy_from_slice(&data[r * stride..r * stride + row]);
            }
        }
        Ok(())
    }
}
