//! Capture bridge - moves frames from an input stream into the ring buffer.
//!
//! Runs on the backend's realtime thread. Each callback:
//! - Reads as many frames as fit, up to the backend maximum
//! - Replaces holes with silence so the stream stays time-aligned
//! - Publishes everything it staged with a single write-cursor advance
//!
//! Running out of room is counted as an overflow; the bridge never blocks.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{error, warn};

use crate::backend::{CaptureBatch, CaptureHandler, Direction, InputIo};
use crate::error::BackendError;
use crate::event::{emit, EventCallback, EventOrigin, StreamEvent};
use crate::format::StreamFormat;
use crate::pipeline::RingWriter;
use crate::session::{bump, PipelineState};

/// Input stream handler that writes interleaved frames into a [`RingWriter`].
pub struct CaptureBridge {
    writer: RingWriter,
    channel_count: usize,
    bytes_per_frame: usize,
    state: Arc<PipelineState>,
    on_event: Option<EventCallback>,
}

impl CaptureBridge {
    pub(crate) fn new(
        writer: RingWriter,
        format: &StreamFormat,
        state: Arc<PipelineState>,
        on_event: Option<EventCallback>,
    ) -> Self {
        Self {
            writer,
            channel_count: format.channel_count(),
            bytes_per_frame: format.bytes_per_frame(),
            state,
            on_event,
        }
    }

    fn report_error(&self, error: &BackendError) {
        let count = bump(&self.state.stream_errors);
        error!(%error, count, "Capture stream error");
        emit(
            self.on_event.as_ref(),
            StreamEvent::StreamError {
                direction: Direction::Input,
                error: error.to_string(),
            },
        );
    }
}

impl CaptureHandler for CaptureBridge {
    fn on_ready(&mut self, io: &mut dyn InputIo, min_frames: usize, max_frames: usize) {
        let bpf = self.bytes_per_frame;
        let free_frames = self.writer.free_count() / bpf;

        if min_frames > free_frames {
            let count = bump(&self.state.overflows);
            warn!(count, min_frames, free_frames, "Capture overflow: ring buffer full");
            emit(
                self.on_event.as_ref(),
                StreamEvent::Overflow {
                    count,
                    origin: EventOrigin::RingBuffer,
                },
            );
        }

        let mut remaining = free_frames.min(max_frames);
        let mut hole_frames = 0usize;
        let mut failure = None;

        let mut ptr = self.writer.write_pointer();
        while remaining > 0 {
            let batch = match io.begin_read(remaining) {
                Ok(batch) => batch,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            let frames = batch.frame_count().min(remaining);
            if frames == 0 {
                break;
            }

            match batch {
                CaptureBatch::Hole { .. } => {
                    // Fits: `frames` never exceeds the free frame count.
                    let _ = ptr.fill_zero(frames * bpf);
                    hole_frames += frames;
                }
                CaptureBatch::Frames(areas) => {
                    for frame in 0..frames {
                        for channel in 0..self.channel_count {
                            let _ = ptr.put(areas.sample(channel, frame));
                        }
                    }
                }
            }

            if let Err(e) = io.end_read() {
                failure = Some(e);
                break;
            }
            remaining -= frames;
        }

        let staged = ptr.staged();
        if let Err(e) = self.writer.advance_write(staged) {
            // Only the bridge writes, so this means the staging math is off.
            error!(%e, "Capture bridge failed to publish frames");
        }
        self.state
            .frames_captured
            .fetch_add((staged / bpf) as u64, Ordering::Relaxed);

        if hole_frames > 0 {
            let count = bump(&self.state.internal_overflows);
            self.state
                .dropped_frames
                .fetch_add(hole_frames as u64, Ordering::Relaxed);
            warn!(count, dropped_frames = hole_frames, "Capture hole filled with silence");
            emit(
                self.on_event.as_ref(),
                StreamEvent::InternalOverflow {
                    dropped_frames: hole_frames as u64,
                    count,
                },
            );
        }

        if let Some(e) = failure {
            self.report_error(&e);
        }
    }

    fn on_overflow(&mut self) {
        let count = bump(&self.state.overflows);
        warn!(count, "Capture overflow reported by backend");
        emit(
            self.on_event.as_ref(),
            StreamEvent::Overflow {
                count,
                origin: EventOrigin::Backend,
            },
        );
    }

    fn on_error(&mut self, error: BackendError) {
        self.report_error(&error);
    }
}
