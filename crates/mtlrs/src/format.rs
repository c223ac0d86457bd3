// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Format lookup tables and frame-size calculation (spec §4.5).
//!
//! Covers pixel formats, audio sample formats, and frame-rate codes, plus
//! the pure function mapping (format, width, height, interlaced) to the
//! byte size of a single frame.

use crate::error::{Error, Result};

/// User-visible pixel format identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    Yuv422Planar10Le,
    V210,
    Y210,
    Uyvy,
    Yuv422Rfc4175Pg2Be10,
    Yuv422Rfc4175Pg2Be12,
    Yuv422Rfc4175Pg2Be16,
    Yuv422Rfc4175Pg2Le8,
    Yuv422Planar8,
    Yuv422Planar12Le,
    Yuv422Planar16Le,
    Yuv420Planar8,
    Yuv420Planar10Le,
    Yuv444Planar8,
    Yuv444Planar10Le,
    Rgb8,
    Rgb10,
    Rgb12Le,
    RgbaBe8,
    Gbrp8,
    Gbrp10Le,
    Gbrp12Le,
    Y8,
}

impl PixelFormat {
    /// Bits per pixel for the packed/planar representation.
    ///
    /// Used by [`frame_size`] to compute the byte size of a progressive
    /// frame before any interlace halving.
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            PixelFormat::V210 => 20,
            PixelFormat::Y210 | PixelFormat::Yuv422Rfc4175Pg2Be16 => 32,
            PixelFormat::Uyvy | PixelFormat::Yuv422Planar8 | PixelFormat::Yuv422Rfc4175Pg2Le8 => {
                16
            }
            PixelFormat::Yuv422Rfc4175Pg2Be10 => 20,
            PixelFormat::Yuv422Rfc4175Pg2Be12 => 24,
            PixelFormat::Yuv422Planar10Le => 20,
            PixelFormat::Yuv422Planar12Le => 24,
            PixelFormat::Yuv422Planar16Le => 32,
            PixelFormat::Yuv420Planar8 => 12,
            PixelFormat::Yuv420Planar10Le => 15,
            PixelFormat::Yuv444Planar8 | PixelFormat::Rgb8 | PixelFormat::Gbrp8 => 24,
            PixelFormat::Yuv444Planar10Le | PixelFormat::Rgb10 | PixelFormat::Gbrp10Le => 30,
            PixelFormat::Rgb12Le | PixelFormat::Gbrp12Le => 36,
            PixelFormat::RgbaBe8 => 32,
            PixelFormat::Y8 => 8,
        }
    }

    /// Parse the user-visible format identifier string (e.g. `"V210"`).
    pub fn from_str_id(s: &str) -> Result<Self> {
        Ok(match s {
            "YUV422PLANAR10LE" => PixelFormat::Yuv422Planar10Le,
            "V210" => PixelFormat::V210,
            "Y210" => PixelFormat::Y210,
            "UYVY" => PixelFormat::Uyvy,
            "YUV422RFC4175PG2BE10" => PixelFormat::Yuv422Rfc4175Pg2Be10,
            "YUV422RFC4175PG2BE12" => PixelFormat::Yuv422Rfc4175Pg2Be12,
            "YUV422RFC4175PG2BE16" => PixelFormat::Yuv422Rfc4175Pg2Be16,
            "YUV422RFC4175PG2LE8" => PixelFormat::Yuv422Rfc4175Pg2Le8,
            "YUV422PLANAR8" => PixelFormat::Yuv422Planar8,
            "YUV422PLANAR12LE" => PixelFormat::Yuv422Planar12Le,
            "YUV422PLANAR16LE" => PixelFormat::Yuv422Planar16Le,
            "YUV420PLANAR8" => PixelFormat::Yuv420Planar8,
            "YUV420PLANAR10LE" => PixelFormat::Yuv420Planar10Le,
            "YUV444PLANAR8" => PixelFormat::Yuv444Planar8,
            "YUV444PLANAR10LE" => PixelFormat::Yuv444Planar10Le,
            "RGB8" => PixelFormat::Rgb8,
            "RGB10" => PixelFormat::Rgb10,
            "RGB12LE" => PixelFormat::Rgb12Le,
            "RGBABE8" => PixelFormat::RgbaBe8,
            "GBRP8" => PixelFormat::Gbrp8,
            "GBRP10LE" => PixelFormat::Gbrp10Le,
            "GBRP12LE" => PixelFormat::Gbrp12Le,
            "Y8" => PixelFormat::Y8,
            other => return Err(Error::InvalidConfig(format!("unknown pixel format: {other}"))),
        })
    }
}

/// User-visible audio sample formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Pcm8,
    Pcm16,
    Pcm24,
    Am824,
}

impl AudioFormat {
    /// Bytes per sample, per channel.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            AudioFormat::Pcm8 => 1,
            AudioFormat::Pcm16 => 2,
            AudioFormat::Pcm24 | AudioFormat::Am824 => 3,
        }
    }

    pub fn from_str_id(s: &str) -> Result<Self> {
        Ok(match s {
            "PCM8" => AudioFormat::Pcm8,
            "PCM16" => AudioFormat::Pcm16,
            "PCM24" => AudioFormat::Pcm24,
            "AM824" => AudioFormat::Am824,
            other => return Err(Error::InvalidConfig(format!("unknown audio format: {other}"))),
        })
    }
}

/// Frame-rate codes accepted by session configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameRate {
    Fps23_98,
    Fps24,
    Fps25,
    Fps29_97,
    Fps30,
    Fps50,
    Fps59_94,
    Fps60,
    Fps100,
    Fps119_88,
    Fps120,
}

impl FrameRate {
    /// Rational (numerator, denominator) per SMPTE convention, e.g. 30000/1001 for 29.97.
    pub const fn as_ratio(self) -> (u64, u64) {
        match self {
            FrameRate::Fps23_98 => (24000, 1001),
            FrameRate::Fps24 => (24, 1),
            FrameRate::Fps25 => (25, 1),
            FrameRate::Fps29_97 => (30000, 1001),
            FrameRate::Fps30 => (30, 1),
            FrameRate::Fps50 => (50, 1),
            FrameRate::Fps59_94 => (60000, 1001),
            FrameRate::Fps60 => (60, 1),
            FrameRate::Fps100 => (100, 1),
            FrameRate::Fps119_88 => (120000, 1001),
            FrameRate::Fps120 => (120, 1),
        }
    }

    /// Nominal frame interval in nanoseconds, rounded to the nearest integer.
    ///
    /// `10^9 / r` for integral rates; for NTSC rates this resolves to the
    /// SMPTE-standard `1001 * 10^6 / (fps*1000/1001)` form, e.g. 59.94 fps
    /// gives `1001 * 10^6 / 60 ≈ 16683333 ns`.
    pub fn interval_ns(self) -> u64 {
        let (num, den) = self.as_ratio();
        // interval_ns = den * 1e9 / num, rounded to nearest.
        let numerator = den * 1_000_000_000;
        (numerator + num / 2) / num
    }

    pub fn from_str_id(s: &str) -> Result<Self> {
        Ok(match s {
            "23.98" => FrameRate::Fps23_98,
            "24" => FrameRate::Fps24,
            "25" => FrameRate::Fps25,
            "29.97" => FrameRate::Fps29_97,
            "30" => FrameRate::Fps30,
            "50" => FrameRate::Fps50,
            "59.94" => FrameRate::Fps59_94,
            "60" => FrameRate::Fps60,
            "100" => FrameRate::Fps100,
            "119.88" => FrameRate::Fps119_88,
            "120" => FrameRate::Fps120,
            other => return Err(Error::InvalidConfig(format!("unknown frame rate: {other}"))),
        })
    }
}

/// Computes the byte size of a single video frame.
///
/// Interlaced frames carry half the lines (one field) per wire frame.
pub fn frame_size(format: PixelFormat, width: u32, height: u32, interlaced: bool) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidConfig("width/height must be non-zero".into()));
    }
    let lines = if interlaced { height / 2 } else { height };
    let bits = u64::from(format.bits_per_pixel()) * u64::from(width) * u64::from(lines);
    Ok(((bits + 7) / 8) as usize)
}

/// Computes the byte size of an audio frame for one channel-group sample block.
pub fn audio_frame_size(format: AudioFormat, channels: u16, samples_per_frame: u32) -> usize {
    format.bytes_per_sample() * usize::from(channels) * samples_per_frame as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_interval_59_94() {
        assert_eq!(FrameRate::Fps59_94.interval_ns(), 16_683_333);
    }

    #[test]
    fn frame_interval_25() {
        assert_eq!(FrameRate::Fps25.interval_ns(), 40_000_000);
    }

    #[test]
    fn frame_interval_29_97() {
        // 1001 * 1e6 / 30 = 33366666.67 -> rounds to 33366667
        assert_eq!(FrameRate::Fps29_97.interval_ns(), 33_366_667);
    }

    #[test]
    fn frame_size_progressive_v210() {
        // V210: 20 bits/pixel, 1920x1080 progressive
        let size = frame_size(PixelFormat::V210, 1920, 1080, false).unwrap();
        assert_eq!(size, (20u64 * 1920 * 1080 / 8) as usize);
    }

    #[test]
    fn frame_size_interlaced_halves_lines() {
        let progressive = frame_size(PixelFormat::Uyvy, 1920, 1080, false).unwrap();
        let interlaced = frame_size(PixelFormat::Uyvy, 1920, 1080, true).unwrap();
        assert_eq!(interlaced * 2, progressive);
    }

    #[test]
    fn frame_size_rejects_zero_dims() {
        assert!(frame_size(PixelFormat::Uyvy, 0, 1080, false).is_err());
    }

    #[test]
    fn pixel_format_round_trips_known_ids() {
        assert_eq!(PixelFormat::from_str_id("V210").unwrap(), PixelFormat::V210);
        assert!(PixelFormat::from_str_id("NOT_A_FORMAT").is_err());
    }
}
