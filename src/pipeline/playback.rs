//! Playback bridge - fills output stream buffers from the ring buffer.
//!
//! Runs on the backend's realtime thread. When the ring buffer holds less
//! than the backend minimum, the bridge plays silence for the minimum and
//! leaves the buffered frames in place so they are played next time.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{error, warn};

use crate::backend::{Direction, OutputIo, PlaybackHandler};
use crate::error::BackendError;
use crate::event::{emit, EventCallback, EventOrigin, StreamEvent};
use crate::format::StreamFormat;
use crate::pipeline::RingReader;
use crate::session::{bump, PipelineState};

/// Output stream handler that reads interleaved frames from a [`RingReader`].
pub struct PlaybackBridge {
    reader: RingReader,
    channel_count: usize,
    bytes_per_frame: usize,
    state: Arc<PipelineState>,
    on_event: Option<EventCallback>,
}

impl PlaybackBridge {
    pub(crate) fn new(
        reader: RingReader,
        format: &StreamFormat,
        state: Arc<PipelineState>,
        on_event: Option<EventCallback>,
    ) -> Self {
        Self {
            reader,
            channel_count: format.channel_count(),
            bytes_per_frame: format.bytes_per_frame(),
            state,
            on_event,
        }
    }

    fn report_error(&self, error: &BackendError) {
        let count = bump(&self.state.stream_errors);
        error!(%error, count, "Playback stream error");
        emit(
            self.on_event.as_ref(),
            StreamEvent::StreamError {
                direction: Direction::Output,
                error: error.to_string(),
            },
        );
    }

    /// Writes `frames` frames of silence. Returns the frames written.
    fn play_silence(io: &mut dyn OutputIo, frames: usize) -> Result<usize, BackendError> {
        let mut remaining = frames;
        while remaining > 0 {
            let mut areas = io.begin_write(remaining)?;
            let n = areas.frame_count().min(remaining);
            if n == 0 {
                break;
            }
            areas.fill_silence();
            io.end_write()?;
            remaining -= n;
        }
        Ok(frames - remaining)
    }
}

impl PlaybackHandler for PlaybackBridge {
    fn on_ready(&mut self, io: &mut dyn OutputIo, min_frames: usize, max_frames: usize) {
        let fill_frames = self.reader.fill_count() / self.bytes_per_frame;

        if min_frames > fill_frames {
            let written = match Self::play_silence(io, min_frames) {
                Ok(written) => written,
                Err(e) => {
                    self.report_error(&e);
                    0
                }
            };
            self.state
                .silence_frames
                .fetch_add(written as u64, Ordering::Relaxed);
            let count = bump(&self.state.underflows);
            warn!(count, min_frames, fill_frames, "Playback underflow: ring buffer empty");
            emit(
                self.on_event.as_ref(),
                StreamEvent::Underflow {
                    count,
                    origin: EventOrigin::RingBuffer,
                },
            );
            return;
        }

        let mut remaining = max_frames.min(fill_frames);
        let mut failure = None;

        let mut ptr = self.reader.read_pointer();
        while remaining > 0 {
            let mut areas = match io.begin_write(remaining) {
                Ok(areas) => areas,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            let frames = areas.frame_count().min(remaining);
            if frames == 0 {
                break;
            }

            for frame in 0..frames {
                for channel in 0..self.channel_count {
                    ptr.take_into(areas.sample_mut(channel, frame));
                }
            }

            if let Err(e) = io.end_write() {
                failure = Some(e);
                break;
            }
            remaining -= frames;
        }

        let consumed = ptr.position();
        if let Err(e) = self.reader.advance_read(consumed) {
            error!(%e, "Playback bridge failed to consume frames");
        }
        self.state
            .frames_played
            .fetch_add((consumed / self.bytes_per_frame) as u64, Ordering::Relaxed);

        if let Some(e) = failure {
            self.report_error(&e);
        }
    }

    fn on_underflow(&mut self) {
        let count = bump(&self.state.underflows);
        warn!(count, "Playback underflow reported by backend");
        emit(
            self.on_event.as_ref(),
            StreamEvent::Underflow {
                count,
                origin: EventOrigin::Backend,
            },
        );
    }

    fn on_error(&mut self, error: BackendError) {
        self.report_error(&error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ChannelArea, WriteAreas};
    use crate::error::BackendErrorKind;
    use crate::format::{ChannelLayout, SampleFormat};
    use crate::pipeline::{RingBuffer, RingWriter};

    /// Collects written frames, handing out at most `batch` frames per
    /// `begin_write`. Fresh buffers are filled with 0xEE so untouched bytes
    /// show up in assertions.
    struct CollectingOutput {
        batch: usize,
        areas: Vec<ChannelArea>,
        bytes_per_sample: usize,
        bytes_per_frame: usize,
        buffer: Vec<u8>,
        written: Vec<u8>,
        ends: usize,
    }

    impl CollectingOutput {
        fn new(format: &StreamFormat, batch: usize) -> Self {
            Self {
                batch,
                areas: ChannelArea::interleaved(format.channel_count(), format.bytes_per_sample()),
                bytes_per_sample: format.bytes_per_sample(),
                bytes_per_frame: format.bytes_per_frame(),
                buffer: Vec::new(),
                written: Vec::new(),
                ends: 0,
            }
        }
    }

    impl OutputIo for CollectingOutput {
        fn begin_write(&mut self, frames: usize) -> Result<WriteAreas<'_>, BackendError> {
            let n = frames.min(self.batch);
            self.buffer = vec![0xEE; n * self.bytes_per_frame];
            WriteAreas::new(&mut self.buffer, &self.areas, n, self.bytes_per_sample)
        }

        fn end_write(&mut self) -> Result<(), BackendError> {
            self.written.extend_from_slice(&self.buffer);
            self.ends += 1;
            Ok(())
        }
    }

    /// Refuses every write.
    struct FailingOutput;

    impl OutputIo for FailingOutput {
        fn begin_write(&mut self, _frames: usize) -> Result<WriteAreas<'_>, BackendError> {
            Err(BackendError::new(BackendErrorKind::Streaming, "device unplugged"))
        }

        fn end_write(&mut self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    fn stereo_s16() -> StreamFormat {
        StreamFormat::new(SampleFormat::S16_NE, 48000, ChannelLayout::stereo())
    }

    fn bridge(capacity: usize) -> (PlaybackBridge, RingWriter, Arc<PipelineState>) {
        let (writer, reader) = RingBuffer::with_capacity(capacity).split();
        let state = Arc::new(PipelineState::new());
        let bridge = PlaybackBridge::new(reader, &stereo_s16(), state.clone(), None);
        (bridge, writer, state)
    }

    #[test]
    fn test_plays_buffered_frames() {
        let (mut bridge, mut writer, state) = bridge(64);
        let data: Vec<u8> = (0..16).collect();
        writer.write(&data).unwrap();
        let mut io = CollectingOutput::new(&stereo_s16(), 64);

        bridge.on_ready(&mut io, 2, 8);

        assert_eq!(io.written, data);
        assert_eq!(writer.fill_count(), 0);
        assert_eq!(state.snapshot().frames_played, 4);
    }

    #[test]
    fn test_respects_max_frames() {
        let (mut bridge, mut writer, _state) = bridge(64);
        writer.write(&[1; 32]).unwrap();
        let mut io = CollectingOutput::new(&stereo_s16(), 64);

        bridge.on_ready(&mut io, 1, 3);

        assert_eq!(io.written.len(), 12);
        assert_eq!(writer.fill_count(), 20);
    }

    #[test]
    fn test_loops_over_short_write_batches() {
        let (mut bridge, mut writer, _state) = bridge(64);
        let data: Vec<u8> = (0..20).collect();
        writer.write(&data).unwrap();
        let mut io = CollectingOutput::new(&stereo_s16(), 2);

        bridge.on_ready(&mut io, 5, 5);

        assert_eq!(io.written, data);
        assert_eq!(io.ends, 3);
    }

    #[test]
    fn test_underflow_plays_silence_and_keeps_cursor() {
        let (mut bridge, mut writer, state) = bridge(64);
        writer.write(&[7; 8]).unwrap();
        let mut io = CollectingOutput::new(&stereo_s16(), 64);

        bridge.on_ready(&mut io, 3, 6);

        assert_eq!(io.written, vec![0; 12]);
        assert_eq!(writer.fill_count(), 8);
        let stats = state.snapshot();
        assert_eq!(stats.underflows, 1);
        assert_eq!(stats.silence_frames, 3);
        assert_eq!(stats.frames_played, 0);
    }

    #[test]
    fn test_write_failure_keeps_read_cursor() {
        let (mut bridge, mut writer, state) = bridge(64);
        writer.write(&[3; 16]).unwrap();

        bridge.on_ready(&mut FailingOutput, 2, 4);

        assert_eq!(writer.fill_count(), 16);
        let stats = state.snapshot();
        assert_eq!(stats.stream_errors, 1);
        assert_eq!(stats.frames_played, 0);
    }

    #[test]
    fn test_silence_write_failure_counts_error() {
        let (mut bridge, _writer, state) = bridge(64);

        bridge.on_ready(&mut FailingOutput, 2, 4);

        let stats = state.snapshot();
        assert_eq!(stats.stream_errors, 1);
        assert_eq!(stats.underflows, 1);
        assert_eq!(stats.silence_frames, 0);
    }

    #[test]
    fn test_backend_underflow_counts() {
        let (mut bridge, _writer, state) = bridge(64);
        bridge.on_underflow();
        assert_eq!(state.snapshot().underflows, 1);
    }
}
