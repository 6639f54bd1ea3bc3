//! Capture-only pipeline: input stream → ring buffer → sinks.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::{AudioBackend, Direction, StreamHandle, StreamParams};
use crate::builder::resolve_device;
use crate::event::emit;
use crate::format::StreamFormat;
use crate::pipeline::{CaptureBridge, DrainCommand, DrainTask, RingBuffer};
use crate::session::{PipelineState, PipelineStats};
use crate::sink::Sink;
use crate::{
    event_callback, DeviceSelection, DuplexAudioError, EventCallback, FormatNegotiator,
    RecorderConfig, StreamEvent,
};

/// Channel capacity for drain task commands.
/// Only need 1 since commands are rare (just Stop).
const COMMAND_CHANNEL_CAPACITY: usize = 1;

/// Builder for a capture-only recorder.
///
/// Use [`DuplexAudio::recorder()`](crate::DuplexAudio::recorder) to create a
/// new builder.
///
/// # Example
///
/// ```ignore
/// use duplex_audio::{ChannelSink, CpalBackend, DuplexAudio, FileSink};
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel(32);
///
/// let session = DuplexAudio::recorder()
///     .add_sink(FileSink::wav("meeting.wav"))
///     .add_sink(ChannelSink::new(tx))
///     .start(&CpalBackend::new())
///     .await?;
///
/// while let Some(chunk) = rx.recv().await {
///     // Send to a transcription service, etc.
/// }
///
/// session.stop().await?;
/// ```
#[must_use]
pub struct RecorderBuilder {
    device: DeviceSelection,
    sinks: Vec<Arc<dyn Sink>>,
    config: RecorderConfig,
    negotiator: FormatNegotiator,
    stream_name: Option<String>,
    event_callback: Option<EventCallback>,
}

impl Default for RecorderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            device: DeviceSelection::SystemDefault,
            sinks: Vec::new(),
            config: RecorderConfig::default(),
            negotiator: FormatNegotiator::default(),
            stream_name: None,
            event_callback: None,
        }
    }

    /// Selects the capture device.
    ///
    /// Default: [`DeviceSelection::SystemDefault`]
    pub fn device(mut self, device: DeviceSelection) -> Self {
        self.device = device;
        self
    }

    /// Add a sink to receive captured audio.
    pub fn add_sink<S: Sink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Add a sink that the caller keeps a handle to.
    pub fn add_shared_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Set custom recorder configuration.
    pub fn with_config(mut self, config: RecorderConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the format/rate priority lists used for negotiation.
    pub fn with_negotiator(mut self, negotiator: FormatNegotiator) -> Self {
        self.negotiator = negotiator;
        self
    }

    /// Sets the stream name passed to the backend.
    pub fn stream_name(mut self, name: impl Into<String>) -> Self {
        self.stream_name = Some(name.into());
        self
    }

    /// Set a callback to receive runtime events.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(StreamEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Validates the builder configuration.
    fn validate(&self) -> Result<(), DuplexAudioError> {
        if self.sinks.is_empty() {
            return Err(DuplexAudioError::NoSinksConfigured);
        }
        if self.config.ring_buffer_duration.is_zero() {
            return Err(DuplexAudioError::invalid_config(
                "ring buffer duration must be positive",
            ));
        }
        if self.config.drain_interval.is_zero() {
            return Err(DuplexAudioError::invalid_config(
                "drain interval must be positive",
            ));
        }
        if self.config.sink_retry_attempts == 0 {
            return Err(DuplexAudioError::invalid_config(
                "sink retry attempts must be at least 1",
            ));
        }
        Ok(())
    }

    /// Start recording.
    ///
    /// Must be called from within a tokio runtime; the drain task is
    /// spawned onto it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No sinks are configured
    /// - The device cannot be found, probed or negotiated
    /// - Any sink fails to start
    /// - The backend refuses to open or start the stream
    pub async fn start(
        self,
        backend: &dyn AudioBackend,
    ) -> Result<RecordingSession, DuplexAudioError> {
        self.validate()?;

        let device = resolve_device(backend, &self.device, Direction::Input)?;
        let format = self.negotiator.negotiate_single(&device)?;

        let capacity = format
            .bytes_for(self.config.ring_buffer_duration)
            .ok_or_else(|| DuplexAudioError::invalid_config("ring buffer duration is too long"))?
            .max(format.bytes_per_frame());
        let (writer, reader) = RingBuffer::with_capacity(capacity).split();

        let state = Arc::new(PipelineState::new());
        let task = DrainTask::new(
            reader,
            format.clone(),
            self.sinks,
            self.config.clone(),
            Arc::clone(&state),
            self.event_callback.clone(),
        );

        let mut params = StreamParams::new(format.clone()).with_name(self.stream_name);
        if let Some(latency) = self.config.software_latency {
            params = params.with_software_latency(latency);
        }

        let bridge = CaptureBridge::new(
            writer,
            &format,
            Arc::clone(&state),
            self.event_callback.clone(),
        );
        let mut capture = backend
            .open_input(&device, &params, Box::new(bridge))
            .map_err(|source| DuplexAudioError::StreamOpenFailed {
                direction: Direction::Input,
                source,
            })?;
        // Dropping `capture` on a sink failure disposes the unstarted stream.
        task.start_sinks().await?;

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let drain_handle = tokio::spawn(task.run(cmd_rx));

        if let Err(source) = capture.start() {
            // Let the drain task stop the sinks before reporting.
            let _ = cmd_tx.send(DrainCommand::Stop).await;
            let _ = drain_handle.await;
            return Err(DuplexAudioError::StreamStartFailed {
                direction: Direction::Input,
                source,
            });
        }
        emit(
            self.event_callback.as_ref(),
            StreamEvent::StreamStarted {
                direction: Direction::Input,
            },
        );

        info!(
            backend = backend.name(),
            device = device.name(),
            %format,
            ring_buffer_bytes = capacity,
            "Recorder started"
        );

        Ok(RecordingSession {
            state,
            capture: Some(capture),
            format,
            cmd_tx,
            drain_handle: Some(drain_handle),
            event_callback: self.event_callback,
        })
    }
}

/// Handle to a running recorder.
///
/// Dropping the session disposes the input stream and signals the drain
/// task to finish in the background. Call [`stop()`](Self::stop) to wait
/// for the remaining audio to reach the sinks.
pub struct RecordingSession {
    state: Arc<PipelineState>,
    capture: Option<Box<dyn StreamHandle>>,
    format: StreamFormat,
    cmd_tx: mpsc::Sender<DrainCommand>,
    drain_handle: Option<JoinHandle<()>>,
    event_callback: Option<EventCallback>,
}

impl RecordingSession {
    /// Returns `true` until the session is stopped.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Returns current pipeline statistics.
    pub fn stats(&self) -> PipelineStats {
        self.state.snapshot()
    }

    /// The format captured audio is recorded in.
    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    /// Pauses (`true`) or resumes (`false`) capture.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the stream refuses.
    pub fn pause(&self, pause: bool) -> Result<(), DuplexAudioError> {
        if let Some(capture) = &self.capture {
            capture.pause(pause)?;
        }
        self.state.paused.store(pause, Ordering::SeqCst);
        Ok(())
    }

    /// Stops capture, drains what is left in the ring buffer into the
    /// sinks and stops them.
    ///
    /// # Errors
    ///
    /// Sink failures during shutdown are reported as events, so this
    /// currently always returns `Ok`.
    pub async fn stop(mut self) -> Result<(), DuplexAudioError> {
        self.close_stream();

        let _ = self.cmd_tx.send(DrainCommand::Stop).await;
        if let Some(handle) = self.drain_handle.take() {
            let _ = handle.await;
        }

        let stats = self.state.snapshot();
        info!(
            overflows = stats.overflows,
            internal_overflows = stats.internal_overflows,
            frames_captured = stats.frames_captured,
            chunks_processed = stats.chunks_processed,
            "Recorder stopped"
        );
        Ok(())
    }

    fn close_stream(&mut self) {
        if !self.state.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(capture) = self.capture.take() {
            drop(capture);
            emit(
                self.event_callback.as_ref(),
                StreamEvent::StreamStopped {
                    direction: Direction::Input,
                },
            );
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.close_stream();
        if self.drain_handle.is_some() && self.cmd_tx.try_send(DrainCommand::Stop).is_err() {
            warn!("Recorder dropped while drain task was busy; it stops when the channel closes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockBlock};
    use crate::format::{ChannelLayout, SampleFormat};
    use crate::{CapturedChunk, ChannelSink, DuplexAudio};
    use std::time::Duration;

    fn mono_s16() -> StreamFormat {
        StreamFormat::new(SampleFormat::S16Le, 16000, ChannelLayout::mono())
    }

    fn fast_config() -> RecorderConfig {
        RecorderConfig {
            ring_buffer_duration: Duration::from_secs(1),
            drain_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_sinks_configured() {
        let backend = MockBackend::duplex(&mono_s16());
        let result = DuplexAudio::recorder().start(&backend).await;
        assert!(matches!(result, Err(DuplexAudioError::NoSinksConfigured)));
    }

    #[tokio::test]
    async fn test_records_captured_frames_to_channel() {
        let backend = MockBackend::duplex(&mono_s16());
        let (tx, mut rx) = mpsc::channel::<CapturedChunk>(16);

        let session = DuplexAudio::recorder()
            .add_sink(ChannelSink::new(tx))
            .with_config(fast_config())
            .start(&backend)
            .await
            .unwrap();
        assert_eq!(session.format(), &mono_s16());

        let driver = backend.capture_driver().unwrap();
        driver.deliver(&[MockBlock::Frames(vec![1, 0, 2, 0])], 2, 2);
        driver.deliver(&[MockBlock::Hole(1), MockBlock::Frames(vec![3, 0])], 2, 2);

        session.stop().await.unwrap();

        let mut bytes = Vec::new();
        while let Some(chunk) = rx.recv().await {
            bytes.extend_from_slice(&chunk.data);
        }
        assert_eq!(bytes, vec![1, 0, 2, 0, 0, 0, 3, 0]);
    }

    #[tokio::test]
    async fn test_stop_disposes_stream() {
        let backend = MockBackend::duplex(&mono_s16());
        let (tx, _rx) = mpsc::channel::<CapturedChunk>(16);
        let session = DuplexAudio::recorder()
            .add_sink(ChannelSink::new(tx))
            .with_config(fast_config())
            .start(&backend)
            .await
            .unwrap();

        let driver = backend.capture_driver().unwrap();
        assert!(driver.is_running());
        session.stop().await.unwrap();
        assert!(driver.is_closed());
    }

    #[tokio::test]
    async fn test_backend_overflow_is_counted() {
        let backend = MockBackend::duplex(&mono_s16());
        let (tx, _rx) = mpsc::channel::<CapturedChunk>(16);
        let session = DuplexAudio::recorder()
            .add_sink(ChannelSink::new(tx))
            .with_config(fast_config())
            .start(&backend)
            .await
            .unwrap();

        backend.capture_driver().unwrap().signal_overflow();
        assert_eq!(session.stats().overflows, 1);
        session.stop().await.unwrap();
    }
}
