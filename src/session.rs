//! Duplex pipeline session management.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::backend::{Direction, StreamHandle};
use crate::error::DuplexAudioError;
use crate::event::{emit, EventCallback, StreamEvent};
use crate::format::StreamFormat;

/// Statistics about a running pipeline.
///
/// Every counter only ever increases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Capture callbacks that could not store the backend minimum, plus
    /// overflows reported by the backend.
    pub overflows: u64,
    /// Playback callbacks that played silence for lack of data, plus
    /// underflows reported by the backend.
    pub underflows: u64,
    /// Capture callbacks that contained holes.
    pub internal_overflows: u64,
    /// Frames lost to holes.
    pub dropped_frames: u64,
    /// Frames written into the ring buffer, hole silence included.
    pub frames_captured: u64,
    /// Frames copied from the ring buffer to the playback device.
    pub frames_played: u64,
    /// Frames of silence played on underflow.
    pub silence_frames: u64,
    /// Errors reported by either stream.
    pub stream_errors: u64,
    /// Chunks delivered to sinks (recorder only).
    pub chunks_processed: u64,
}

/// Counters shared between a session and its stream callbacks.
#[derive(Debug, Default)]
pub(crate) struct PipelineState {
    pub running: AtomicBool,
    pub paused: AtomicBool,
    pub overflows: AtomicU64,
    pub underflows: AtomicU64,
    pub internal_overflows: AtomicU64,
    pub dropped_frames: AtomicU64,
    pub frames_captured: AtomicU64,
    pub frames_played: AtomicU64,
    pub silence_frames: AtomicU64,
    pub stream_errors: AtomicU64,
    pub chunks_processed: AtomicU64,
}

/// Increments a counter and returns the new count.
pub(crate) fn bump(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed) + 1
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            overflows: self.overflows.load(Ordering::Relaxed),
            underflows: self.underflows.load(Ordering::Relaxed),
            internal_overflows: self.internal_overflows.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_played: self.frames_played.load(Ordering::Relaxed),
            silence_frames: self.silence_frames.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
        }
    }
}

/// Handle to a running duplex pipeline.
///
/// The `Session` is returned by [`DuplexAudioBuilder::start()`] and owns both
/// open streams. Each stream's callback owns one half of the ring buffer, so
/// the buffer is released only after both streams are disposed.
///
/// # Lifecycle
///
/// 1. Created by [`DuplexAudioBuilder::start()`] with capture and playback
///    running
/// 2. [`pause()`](Session::pause) and resume as needed
/// 3. Call [`stop()`](Session::stop) for an orderly shutdown
/// 4. Dropping the `Session` also stops both streams
///
/// # Example
///
/// ```ignore
/// let session = DuplexAudio::builder()
///     .latency(Duration::from_millis(100))
///     .start(&CpalBackend::new())?;
///
/// std::thread::sleep(Duration::from_secs(10));
/// println!("{:?}", session.stats());
///
/// session.stop()?;
/// ```
///
/// [`DuplexAudioBuilder::start()`]: crate::DuplexAudioBuilder::start
pub struct Session {
    state: Arc<PipelineState>,
    capture: Option<Box<dyn StreamHandle>>,
    playback: Option<Box<dyn StreamHandle>>,
    format: StreamFormat,
    ring_buffer_capacity: usize,
    on_event: Option<EventCallback>,
}

impl Session {
    pub(crate) fn new(
        state: Arc<PipelineState>,
        capture: Box<dyn StreamHandle>,
        playback: Box<dyn StreamHandle>,
        ring_buffer_capacity: usize,
        on_event: Option<EventCallback>,
    ) -> Self {
        Self {
            format: capture.format().clone(),
            state,
            capture: Some(capture),
            playback: Some(playback),
            ring_buffer_capacity,
            on_event,
        }
    }

    /// Returns `true` until the session is stopped.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Returns `true` while both streams are paused.
    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    /// Returns current pipeline statistics.
    pub fn stats(&self) -> PipelineStats {
        self.state.snapshot()
    }

    /// The format both streams run at.
    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    /// Size of the shared ring buffer in bytes.
    pub fn ring_buffer_capacity(&self) -> usize {
        self.ring_buffer_capacity
    }

    /// Latency the backend applied to one stream, if known.
    pub fn software_latency(&self, direction: Direction) -> Option<Duration> {
        let stream = match direction {
            Direction::Input => self.capture.as_ref(),
            Direction::Output => self.playback.as_ref(),
        };
        stream.and_then(|s| s.software_latency())
    }

    /// Pauses (`true`) or resumes (`false`) both streams.
    ///
    /// Pausing stops playback before capture; resuming starts capture
    /// before playback. Must not be called from inside an event callback
    /// raised on an audio thread.
    ///
    /// # Errors
    ///
    /// Returns the backend error if either stream refuses.
    pub fn pause(&self, pause: bool) -> Result<(), DuplexAudioError> {
        let (first, second) = if pause {
            (&self.playback, &self.capture)
        } else {
            (&self.capture, &self.playback)
        };
        if let Some(stream) = first {
            stream.pause(pause)?;
        }
        if let Some(stream) = second {
            if let Err(e) = stream.pause(pause) {
                // Put the first stream back so both agree with `is_paused`.
                if let Some(first) = first {
                    let _ = first.pause(!pause);
                }
                return Err(e.into());
            }
        }
        self.state.paused.store(pause, Ordering::SeqCst);
        info!(paused = pause, "Duplex pipeline pause state changed");
        Ok(())
    }

    /// Stops both streams and releases the ring buffer.
    ///
    /// Playback is disposed first, then capture. Once this returns no
    /// callback is running and the ring buffer has been freed.
    ///
    /// # Errors
    ///
    /// Disposing a stream cannot fail with the bundled backends, so this
    /// always returns `Ok`.
    pub fn stop(mut self) -> Result<(), DuplexAudioError> {
        self.stop_internal();
        Ok(())
    }

    fn stop_internal(&mut self) {
        if !self.state.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(playback) = self.playback.take() {
            drop(playback);
            emit(
                self.on_event.as_ref(),
                StreamEvent::StreamStopped {
                    direction: Direction::Output,
                },
            );
        }
        if let Some(capture) = self.capture.take() {
            drop(capture);
            emit(
                self.on_event.as_ref(),
                StreamEvent::StreamStopped {
                    direction: Direction::Input,
                },
            );
        }

        let stats = self.state.snapshot();
        info!(
            overflows = stats.overflows,
            underflows = stats.underflows,
            internal_overflows = stats.internal_overflows,
            frames_played = stats.frames_played,
            "Duplex pipeline stopped"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_internal();
    }
}
