//! Captured audio with metadata.

use std::sync::Arc;
use std::time::Duration;

use crate::format::StreamFormat;

/// A block of captured frames drained from the ring buffer.
///
/// `CapturedChunk` is the unit the recorder hands to every [`Sink`](crate::Sink).
/// Bytes are interleaved frames in the stream's native encoding, exactly as
/// the capture device delivered them (holes appear as zero bytes).
///
/// Data is stored in an `Arc<Vec<u8>>` so all sinks share one copy.
///
/// # Example
///
/// ```
/// use duplex_audio::{CapturedChunk, ChannelLayout, SampleFormat, StreamFormat};
/// use std::time::Duration;
///
/// let format = StreamFormat::new(SampleFormat::S16Le, 16000, ChannelLayout::mono());
/// let chunk = CapturedChunk::new(vec![0u8; 3200], Duration::ZERO, format);
/// assert_eq!(chunk.frame_count(), 1600);
/// assert_eq!(chunk.duration(), Duration::from_millis(100));
///
/// let shared = chunk.clone(); // Cheap clone - shares the bytes
/// ```
#[derive(Debug, Clone)]
pub struct CapturedChunk {
    /// Interleaved frame bytes.
    pub data: Arc<Vec<u8>>,

    /// Position of the first frame from the start of the recording.
    pub timestamp: Duration,

    /// Format of `data`.
    pub format: StreamFormat,
}

impl CapturedChunk {
    /// Creates a new chunk.
    pub fn new(data: Vec<u8>, timestamp: Duration, format: StreamFormat) -> Self {
        Self {
            data: Arc::new(data),
            timestamp,
            format,
        }
    }

    /// Number of whole frames in this chunk.
    pub fn frame_count(&self) -> usize {
        let bpf = self.format.bytes_per_frame();
        if bpf == 0 {
            return 0;
        }
        self.data.len() / bpf
    }

    /// Playback time of this chunk.
    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.frame_count())
    }

    /// Returns `true` if this chunk contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ChannelLayout, SampleFormat};

    fn format(rate: u32, layout: ChannelLayout) -> StreamFormat {
        StreamFormat::new(SampleFormat::S16Le, rate, layout)
    }

    #[test]
    fn test_duration_stereo_48khz() {
        // 19200 bytes / 4 bytes per frame = 4800 frames / 48000 Hz = 100ms
        let chunk = CapturedChunk::new(
            vec![0; 19200],
            Duration::ZERO,
            format(48000, ChannelLayout::stereo()),
        );
        assert_eq!(chunk.frame_count(), 4800);
        assert_eq!(chunk.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_frame_not_counted() {
        let chunk = CapturedChunk::new(vec![0; 7], Duration::ZERO, format(8000, ChannelLayout::stereo()));
        assert_eq!(chunk.frame_count(), 1);
    }

    #[test]
    fn test_empty_chunk() {
        let chunk = CapturedChunk::new(vec![], Duration::ZERO, format(16000, ChannelLayout::mono()));
        assert!(chunk.is_empty());
        assert_eq!(chunk.frame_count(), 0);
        assert_eq!(chunk.duration(), Duration::ZERO);
    }

    #[test]
    fn test_zero_sample_rate() {
        let chunk = CapturedChunk::new(vec![0; 100], Duration::ZERO, format(0, ChannelLayout::mono()));
        assert_eq!(chunk.duration(), Duration::ZERO);
    }
}
