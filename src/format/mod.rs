//! Stream formats and format negotiation.
//!
//! This module describes how audio is laid out in memory:
//! - [`SampleFormat`]: encoding of a single sample
//! - [`ChannelLayout`]: ordered channel roles of a frame
//! - [`StreamFormat`]: the three together plus a sample rate
//!
//! [`FormatNegotiator`] picks a [`StreamFormat`] that a pair of devices (or a
//! single device) supports.

mod layout;
mod negotiate;
mod sample;

use std::fmt;
use std::time::Duration;

pub use layout::{ChannelId, ChannelLayout, ParseChannelIdError};
pub use negotiate::{FormatNegotiator, FORMAT_PRIORITY, SAMPLE_RATE_PRIORITY};
pub use sample::SampleFormat;

/// The negotiated format of an open stream.
///
/// Immutable once a stream is opened; both streams of a duplex pipeline
/// share one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFormat {
    /// Sample encoding.
    pub sample_format: SampleFormat,
    /// Frames per second.
    pub sample_rate: u32,
    /// Channel roles, in interleaving order.
    pub layout: ChannelLayout,
}

impl StreamFormat {
    /// Creates a format.
    pub fn new(sample_format: SampleFormat, sample_rate: u32, layout: ChannelLayout) -> Self {
        Self {
            sample_format,
            sample_rate,
            layout,
        }
    }

    /// Number of channels in a frame.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.layout.channel_count()
    }

    /// Bytes of one sample.
    #[must_use]
    pub fn bytes_per_sample(&self) -> usize {
        self.sample_format.bytes_per_sample()
    }

    /// Bytes of one frame (one sample per channel).
    #[must_use]
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channel_count()
    }

    /// Bytes of one second of audio.
    #[must_use]
    pub fn bytes_per_second(&self) -> usize {
        self.bytes_per_frame() * self.sample_rate as usize
    }

    /// Whole frames in `duration`, rounded to the nearest frame.
    #[must_use]
    pub fn frames_for(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * f64::from(self.sample_rate)).round() as usize
    }

    /// Frame-aligned byte count for `duration`, or `None` if it does not
    /// fit in a `usize`.
    #[must_use]
    pub fn bytes_for(&self, duration: Duration) -> Option<usize> {
        match self.frames_for(duration) {
            usize::MAX => None,
            frames => frames.checked_mul(self.bytes_per_frame()),
        }
    }

    /// Playback time of `frames` frames.
    #[must_use]
    pub fn duration_of(&self, frames: usize) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate))
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} Hz {}",
            self.sample_format, self.sample_rate, self.layout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_s16() -> StreamFormat {
        StreamFormat::new(SampleFormat::S16Le, 48000, ChannelLayout::stereo())
    }

    #[test]
    fn test_frame_sizes() {
        let format = stereo_s16();
        assert_eq!(format.channel_count(), 2);
        assert_eq!(format.bytes_per_sample(), 2);
        assert_eq!(format.bytes_per_frame(), 4);
        assert_eq!(format.bytes_per_second(), 192_000);
    }

    #[test]
    fn test_bytes_for_latency() {
        let format = stereo_s16();
        assert_eq!(format.frames_for(Duration::from_millis(200)), 9600);
        assert_eq!(format.bytes_for(Duration::from_millis(200)), Some(38400));
        assert_eq!(format.bytes_for(Duration::from_millis(400)), Some(76800));
    }

    #[test]
    fn test_bytes_for_huge_duration() {
        let format = stereo_s16();
        assert_eq!(format.bytes_for(Duration::from_secs(u64::MAX / 2)), None);

        let mono_u8 = StreamFormat::new(SampleFormat::U8, 48000, ChannelLayout::mono());
        assert_eq!(mono_u8.bytes_for(Duration::MAX), None);
    }

    #[test]
    fn test_duration_of_frames() {
        let format = stereo_s16();
        assert_eq!(format.duration_of(24000), Duration::from_millis(500));
    }

    #[test]
    fn test_display() {
        assert_eq!(stereo_s16().to_string(), "s16le 48000 Hz Stereo");
    }
}
