//! Runtime events for monitoring pipeline health.
//!
//! Events are non-fatal notifications about stream behavior. The pipeline
//! continues running after events are emitted - they're for logging/metrics,
//! not error handling.
//!
//! Events raised from a realtime callback are delivered on the backend's
//! audio thread, so callbacks must return quickly and must not block.

use std::fmt;
use std::sync::Arc;

use crate::backend::Direction;

/// Where a data-loss event was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventOrigin {
    /// The pipeline's ring buffer had no room (capture) or no data (playback).
    RingBuffer,
    /// The audio backend reported the condition through its own callback.
    Backend,
}

impl fmt::Display for EventOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RingBuffer => f.write_str("ring buffer"),
            Self::Backend => f.write_str("backend"),
        }
    }
}

/// Runtime events emitted by a running pipeline.
///
/// Every data-loss event carries the running count of events of that kind,
/// which starts at 1 and increases by one per occurrence.
///
/// # Example
///
/// ```
/// use duplex_audio::StreamEvent;
///
/// fn handle_event(event: StreamEvent) {
///     match event {
///         StreamEvent::Overflow { count, origin } => {
///             eprintln!("overflow #{count} ({origin})");
///         }
///         StreamEvent::Underflow { count, origin } => {
///             eprintln!("underflow #{count} ({origin})");
///         }
///         StreamEvent::InternalOverflow { dropped_frames, count } => {
///             eprintln!("hole #{count}: {dropped_frames} frames replaced with silence");
///         }
///         StreamEvent::StreamError { direction, error } => {
///             eprintln!("{direction} stream error: {error}");
///         }
///         StreamEvent::SinkError { sink_name, error } => {
///             eprintln!("sink '{sink_name}' error: {error}");
///         }
///         StreamEvent::StreamStarted { direction } => {
///             eprintln!("{direction} stream started");
///         }
///         StreamEvent::StreamStopped { direction } => {
///             eprintln!("{direction} stream stopped");
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The capture side could not store the backend's minimum frame count.
    ///
    /// Frames beyond the free space are dropped. Consider a larger ring
    /// buffer or a lower latency on the playback side.
    Overflow {
        /// Number of overflows so far, including this one.
        count: u64,
        /// Who detected the overflow.
        origin: EventOrigin,
    },

    /// The playback side had less buffered data than the backend's minimum.
    ///
    /// Silence was played for the whole callback.
    Underflow {
        /// Number of underflows so far, including this one.
        count: u64,
        /// Who detected the underflow.
        origin: EventOrigin,
    },

    /// The backend reported holes in the capture data during one callback.
    ///
    /// The missing frames were replaced with silence.
    InternalOverflow {
        /// Frames lost in this callback.
        dropped_frames: u64,
        /// Number of callbacks with holes so far, including this one.
        count: u64,
    },

    /// The backend reported an error on an open stream.
    StreamError {
        /// Which stream errored.
        direction: Direction,
        /// Description of the error.
        error: String,
    },

    /// A recorder sink encountered an error during write.
    ///
    /// The drain task retries according to
    /// [`RecorderConfig`](crate::RecorderConfig) settings.
    SinkError {
        /// Name of the sink that errored.
        sink_name: String,
        /// Description of the error.
        error: String,
    },

    /// A stream was started.
    StreamStarted {
        /// Which stream started.
        direction: Direction,
    },

    /// A stream was stopped and disposed.
    StreamStopped {
        /// Which stream stopped.
        direction: Direction,
    },
}

/// Callback type for receiving runtime events.
///
/// Register an event callback via [`DuplexAudioBuilder::on_event()`] to
/// receive notifications about overflows, underflows, holes and stream
/// errors.
///
/// [`DuplexAudioBuilder::on_event()`]: crate::DuplexAudioBuilder::on_event
///
/// # Example
///
/// ```ignore
/// use duplex_audio::{CpalBackend, DuplexAudio};
///
/// let session = DuplexAudio::builder()
///     .on_event(|event| {
///         tracing::warn!(?event, "stream event");
///     })
///     .start(&CpalBackend::new())?;
/// ```
pub type EventCallback = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use duplex_audio::{event_callback, StreamEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(StreamEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn emit(callback: Option<&EventCallback>, event: StreamEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}
