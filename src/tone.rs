//! Playback-only pipeline: sine generator → output stream.

use std::f64::consts::TAU;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::backend::{
    AudioBackend, Direction, OutputIo, PlaybackHandler, StreamHandle, StreamParams,
};
use crate::builder::resolve_device;
use crate::error::BackendError;
use crate::event::{emit, EventOrigin};
use crate::format::{SampleFormat, StreamFormat};
use crate::session::{bump, PipelineState, PipelineStats};
use crate::{
    event_callback, DeviceSelection, DuplexAudioError, EventCallback, FormatNegotiator,
    StreamEvent,
};

/// Sample formats the tone generator writes, in order of preference.
pub const TONE_FORMATS: [SampleFormat; 4] = [
    SampleFormat::FLOAT32_NE,
    SampleFormat::FLOAT64_NE,
    SampleFormat::S32_NE,
    SampleFormat::S16_NE,
];

/// Output stream handler that plays a continuous sine wave on every channel.
pub struct ToneGenerator {
    sample_format: SampleFormat,
    channel_count: usize,
    /// Cycles advanced per frame.
    step: f64,
    /// Position within the current cycle, in `0.0..1.0`.
    phase: f64,
    amplitude: f64,
    state: Arc<PipelineState>,
    on_event: Option<EventCallback>,
}

impl ToneGenerator {
    pub(crate) fn new(
        format: &StreamFormat,
        frequency: f64,
        amplitude: f64,
        state: Arc<PipelineState>,
        on_event: Option<EventCallback>,
    ) -> Self {
        Self {
            sample_format: format.sample_format,
            channel_count: format.channel_count(),
            step: frequency / f64::from(format.sample_rate.max(1)),
            phase: 0.0,
            amplitude,
            state,
            on_event,
        }
    }

    fn report_error(&self, error: &BackendError) {
        let count = bump(&self.state.stream_errors);
        error!(%error, count, "Tone stream error");
        emit(
            self.on_event.as_ref(),
            StreamEvent::StreamError {
                direction: Direction::Output,
                error: error.to_string(),
            },
        );
    }

    fn fill(&mut self, io: &mut dyn OutputIo, frames: usize) -> Result<usize, BackendError> {
        let mut remaining = frames;
        while remaining > 0 {
            let mut areas = io.begin_write(remaining)?;
            let n = areas.frame_count().min(remaining);
            if n == 0 {
                break;
            }

            for frame in 0..n {
                let value = (self.phase * TAU).sin() * self.amplitude;
                for channel in 0..self.channel_count {
                    self.sample_format
                        .write_sample(value, areas.sample_mut(channel, frame));
                }
                self.phase = (self.phase + self.step).rem_euclid(1.0);
            }

            io.end_write()?;
            remaining -= n;
        }
        Ok(frames - remaining)
    }
}

impl PlaybackHandler for ToneGenerator {
    fn on_ready(&mut self, io: &mut dyn OutputIo, _min_frames: usize, max_frames: usize) {
        match self.fill(io, max_frames) {
            Ok(written) => {
                self.state
                    .frames_played
                    .fetch_add(written as u64, Ordering::Relaxed);
            }
            Err(e) => self.report_error(&e),
        }
    }

    fn on_underflow(&mut self) {
        let count = bump(&self.state.underflows);
        warn!(count, "Tone playback underflow reported by backend");
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

/// Builder for a sine tone player.
///
/// Use [`DuplexAudio::tone()`](crate::DuplexAudio::tone) to create a new
/// builder.
///
/// # Example
///
/// ```ignore
/// use duplex_audio::{CpalBackend, DuplexAudio};
///
/// let player = DuplexAudio::tone()
///     .frequency(440.0)
///     .start(&CpalBackend::new())?;
///
/// std::thread::sleep(std::time::Duration::from_secs(2));
/// player.stop();
/// ```
#[must_use]
pub struct ToneBuilder {
    device: DeviceSelection,
    frequency: f64,
    amplitude: f64,
    sample_rate: Option<u32>,
    latency: Option<Duration>,
    stream_name: Option<String>,
    event_callback: Option<EventCallback>,
}

impl Default for ToneBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ToneBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            device: DeviceSelection::SystemDefault,
            frequency: 440.0,
            amplitude: 1.0,
            sample_rate: None,
            latency: None,
            stream_name: None,
            event_callback: None,
        }
    }

    /// Selects the playback device.
    pub fn device(mut self, device: DeviceSelection) -> Self {
        self.device = device;
        self
    }

    /// Tone frequency in Hz.
    ///
    /// Default: 440
    pub fn frequency(mut self, frequency: f64) -> Self {
        self.frequency = frequency;
        self
    }

    /// Peak amplitude in `0.0..=1.0`.
    ///
    /// Default: 1.0
    pub fn amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Requires a specific sample rate instead of negotiating one.
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Requests a software latency for the stream.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
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

    fn validate(&self) -> Result<(), DuplexAudioError> {
        if !(self.frequency.is_finite() && self.frequency > 0.0) {
            return Err(DuplexAudioError::invalid_config(
                "frequency must be a positive number",
            ));
        }
        if !(0.0..=1.0).contains(&self.amplitude) {
            return Err(DuplexAudioError::invalid_config(
                "amplitude must be within 0.0..=1.0",
            ));
        }
        Ok(())
    }

    /// Picks the tone's format for `device`.
    fn pick_format(
        &self,
        device: &crate::backend::DeviceInfo,
    ) -> Result<StreamFormat, DuplexAudioError> {
        let negotiator = FormatNegotiator::new().with_formats(TONE_FORMATS.to_vec());
        let sample_format = negotiator.pick_format(&[device])?;

        let sample_rate = match self.sample_rate {
            Some(rate) if device.supports_sample_rate(rate) => rate,
            Some(_) => return Err(DuplexAudioError::NoCompatibleSampleRate),
            None => negotiator.pick_sample_rate(&[device])?,
        };

        let layout = device
            .current_layout()
            .or_else(|| device.layouts().first())
            .cloned()
            .ok_or(DuplexAudioError::NoCompatibleChannelLayout)?;

        Ok(StreamFormat::new(sample_format, sample_rate, layout))
    }

    /// Opens and starts the output stream.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The frequency or amplitude is invalid
    /// - The device cannot be found or probed
    /// - The device supports none of [`TONE_FORMATS`] or the requested rate
    /// - The backend refuses to open or start the stream
    pub fn start(self, backend: &dyn AudioBackend) -> Result<TonePlayer, DuplexAudioError> {
        self.validate()?;

        let device = resolve_device(backend, &self.device, Direction::Output)?;
        let format = self.pick_format(&device)?;

        let state = Arc::new(PipelineState::new());
        let generator = ToneGenerator::new(
            &format,
            self.frequency,
            self.amplitude,
            Arc::clone(&state),
            self.event_callback.clone(),
        );

        let mut params = StreamParams::new(format.clone()).with_name(self.stream_name);
        if let Some(latency) = self.latency {
            params = params.with_software_latency(latency);
        }

        let mut stream = backend
            .open_output(&device, &params, Box::new(generator))
            .map_err(|source| DuplexAudioError::StreamOpenFailed {
                direction: Direction::Output,
                source,
            })?;
        stream
            .start()
            .map_err(|source| DuplexAudioError::StreamStartFailed {
                direction: Direction::Output,
                source,
            })?;
        emit(
            self.event_callback.as_ref(),
            StreamEvent::StreamStarted {
                direction: Direction::Output,
            },
        );

        info!(
            backend = backend.name(),
            device = device.name(),
            %format,
            frequency = self.frequency,
            latency = ?stream.software_latency(),
            "Tone started"
        );

        Ok(TonePlayer {
            state,
            stream: Some(stream),
            format,
            event_callback: self.event_callback,
        })
    }
}

/// Handle to a playing tone. Dropping it stops playback.
pub struct TonePlayer {
    state: Arc<PipelineState>,
    stream: Option<Box<dyn StreamHandle>>,
    format: StreamFormat,
    event_callback: Option<EventCallback>,
}

impl TonePlayer {
    /// The format the tone is played in.
    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    /// Returns current playback statistics.
    pub fn stats(&self) -> PipelineStats {
        self.state.snapshot()
    }

    /// Returns `true` while the player is paused.
    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    /// Latency the backend applied, if known.
    pub fn software_latency(&self) -> Option<Duration> {
        self.stream.as_ref().and_then(|s| s.software_latency())
    }

    /// Pauses (`true`) or resumes (`false`) playback.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the stream refuses.
    pub fn pause(&self, pause: bool) -> Result<(), DuplexAudioError> {
        if let Some(stream) = &self.stream {
            stream.pause(pause)?;
        }
        self.state.paused.store(pause, Ordering::SeqCst);
        Ok(())
    }

    /// Discards frames already queued in the backend.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the backend cannot clear its buffer.
    pub fn clear_buffer(&self) -> Result<(), DuplexAudioError> {
        if let Some(stream) = &self.stream {
            stream.clear_buffer()?;
        }
        Ok(())
    }

    /// Stops playback and disposes the stream.
    pub fn stop(mut self) {
        self.stop_internal();
    }

    fn stop_internal(&mut self) {
        if !self.state.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(stream) = self.stream.take() {
            drop(stream);
            emit(
                self.event_callback.as_ref(),
                StreamEvent::StreamStopped {
                    direction: Direction::Output,
                },
            );
        }
        info!(frames_played = self.state.snapshot().frames_played, "Tone stopped");
    }
}

impl Drop for TonePlayer {
    fn drop(&mut self) {
        self.stop_internal();
    }
}
