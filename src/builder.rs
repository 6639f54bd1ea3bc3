//! Builder pattern for the duplex pipeline.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::backend::{AudioBackend, DeviceInfo, Direction, StreamParams};
use crate::event::emit;
use crate::pipeline::{CaptureBridge, PlaybackBridge, RingBuffer};
use crate::recorder::RecorderBuilder;
use crate::session::{PipelineState, Session};
use crate::tone::ToneBuilder;
use crate::{
    event_callback, DeviceSelection, DuplexAudioError, EventCallback, FormatNegotiator,
    PipelineConfig, StreamEvent,
};

/// Entry point for building audio pipelines.
///
/// - [`DuplexAudio::builder()`]: capture device → ring buffer → playback device
/// - [`DuplexAudio::recorder()`]: capture device → ring buffer → sinks
/// - [`DuplexAudio::tone()`]: sine generator → playback device
pub struct DuplexAudio;

impl DuplexAudio {
    /// Creates a builder for a capture-to-playback passthrough.
    pub fn builder() -> DuplexAudioBuilder {
        DuplexAudioBuilder::new()
    }

    /// Creates a builder for a capture-only recorder.
    pub fn recorder() -> RecorderBuilder {
        RecorderBuilder::new()
    }

    /// Creates a builder for a sine tone player.
    pub fn tone() -> ToneBuilder {
        ToneBuilder::new()
    }
}

/// Finds the device `selection` refers to and checks it was probed
/// successfully.
pub(crate) fn resolve_device(
    backend: &dyn AudioBackend,
    selection: &DeviceSelection,
    direction: Direction,
) -> Result<DeviceInfo, DuplexAudioError> {
    let devices = match direction {
        Direction::Input => backend.input_devices()?,
        Direction::Output => backend.output_devices()?,
    };

    let device = match selection {
        DeviceSelection::SystemDefault => {
            let index = match direction {
                Direction::Input => backend.default_input_device(),
                Direction::Output => backend.default_output_device(),
            };
            index
                .and_then(|i| devices.into_iter().nth(i))
                .ok_or(DuplexAudioError::NoDefaultDevice { direction })?
        }
        DeviceSelection::ById { id, raw } => devices
            .into_iter()
            .find(|d| d.id() == id && d.is_raw() == *raw)
            .ok_or_else(|| DuplexAudioError::DeviceNotFound {
                id: selection.to_string(),
            })?,
    };

    if let Some(error) = device.probe_error() {
        return Err(DuplexAudioError::DeviceProbeFailed {
            name: device.name().to_string(),
            source: error.clone(),
        });
    }
    Ok(device)
}

/// Builder for configuring and starting a duplex passthrough.
///
/// Use [`DuplexAudio::builder()`] to create a new builder.
///
/// # Example
///
/// ```ignore
/// use duplex_audio::{CpalBackend, DeviceSelection, DuplexAudio};
/// use std::time::Duration;
///
/// let session = DuplexAudio::builder()
///     .input_device(DeviceSelection::by_id("USB Microphone"))
///     .latency(Duration::from_millis(50))
///     .on_event(|e| tracing::warn!(?e, "stream event"))
///     .start(&CpalBackend::new())?;
///
/// std::thread::sleep(Duration::from_secs(10));
/// session.stop()?;
/// ```
#[must_use]
pub struct DuplexAudioBuilder {
    input: DeviceSelection,
    output: DeviceSelection,
    config: PipelineConfig,
    negotiator: FormatNegotiator,
    event_callback: Option<EventCallback>,
}

impl Default for DuplexAudioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DuplexAudioBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            input: DeviceSelection::SystemDefault,
            output: DeviceSelection::SystemDefault,
            config: PipelineConfig::default(),
            negotiator: FormatNegotiator::default(),
            event_callback: None,
        }
    }

    /// Selects the capture device.
    ///
    /// Default: [`DeviceSelection::SystemDefault`]
    pub fn input_device(mut self, device: DeviceSelection) -> Self {
        self.input = device;
        self
    }

    /// Selects the playback device.
    ///
    /// Default: [`DeviceSelection::SystemDefault`]
    pub fn output_device(mut self, device: DeviceSelection) -> Self {
        self.output = device;
        self
    }

    /// Sets the software latency of both streams.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.config.latency = latency;
        self
    }

    /// Set custom pipeline configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the format/rate priority lists used for negotiation.
    pub fn with_negotiator(mut self, negotiator: FormatNegotiator) -> Self {
        self.negotiator = negotiator;
        self
    }

    /// Set a callback to receive runtime events.
    ///
    /// The callback runs on the backend's audio threads for overflow,
    /// underflow and hole events, so it must return quickly.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(StreamEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Validates the builder configuration.
    fn validate(&self) -> Result<(), DuplexAudioError> {
        if self.config.latency.is_zero() {
            return Err(DuplexAudioError::invalid_config("latency must be positive"));
        }
        if self.config.ring_buffer_duration().is_zero() {
            return Err(DuplexAudioError::invalid_config(
                "ring buffer duration must be positive",
            ));
        }
        Ok(())
    }

    /// Negotiates a format, opens both streams and starts them.
    ///
    /// The ring buffer holds [`PipelineConfig::ring_buffer_duration`] of
    /// audio and, if [`PipelineConfig::prefill`] is set, starts with one
    /// latency of silence. Capture is started before playback.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - A device cannot be found or probed
    /// - The devices share no format, rate or layout
    /// - The backend refuses to open or start either stream
    pub fn start(self, backend: &dyn AudioBackend) -> Result<Session, DuplexAudioError> {
        self.validate()?;

        let input = resolve_device(backend, &self.input, Direction::Input)?;
        let output = resolve_device(backend, &self.output, Direction::Output)?;
        let format = self.negotiator.negotiate(&input, &output)?;

        let capacity = format
            .bytes_for(self.config.ring_buffer_duration())
            .ok_or_else(|| DuplexAudioError::invalid_config("ring buffer duration is too long"))?
            .max(format.bytes_per_frame());
        let (mut writer, reader) = RingBuffer::with_capacity(capacity).split();
        if self.config.prefill {
            let prefill = format
                .bytes_for(self.config.latency)
                .unwrap_or(capacity)
                .min(capacity);
            writer
                .write_silence(prefill)
                .map_err(|e| DuplexAudioError::invalid_config(e.to_string()))?;
        }

        let state = Arc::new(PipelineState::new());
        let params = StreamParams::new(format.clone())
            .with_software_latency(self.config.latency)
            .with_name(self.config.stream_name.clone());

        let capture_bridge = CaptureBridge::new(
            writer,
            &format,
            Arc::clone(&state),
            self.event_callback.clone(),
        );
        let mut capture = backend
            .open_input(&input, &params, Box::new(capture_bridge))
            .map_err(|source| DuplexAudioError::StreamOpenFailed {
                direction: Direction::Input,
                source,
            })?;

        let playback_bridge = PlaybackBridge::new(
            reader,
            &format,
            Arc::clone(&state),
            self.event_callback.clone(),
        );
        let mut playback = backend
            .open_output(&output, &params, Box::new(playback_bridge))
            .map_err(|source| DuplexAudioError::StreamOpenFailed {
                direction: Direction::Output,
                source,
            })?;

        capture
            .start()
            .map_err(|source| DuplexAudioError::StreamStartFailed {
                direction: Direction::Input,
                source,
            })?;
        emit(
            self.event_callback.as_ref(),
            StreamEvent::StreamStarted {
                direction: Direction::Input,
            },
        );

        playback
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
            input = input.name(),
            output = output.name(),
            %format,
            ring_buffer_bytes = capacity,
            "Duplex pipeline started"
        );

        Ok(Session::new(
            state,
            capture,
            playback,
            capacity,
            self.event_callback,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, SampleRateRange};
    use crate::error::{BackendError, BackendErrorKind};
    use crate::format::{ChannelLayout, SampleFormat, StreamFormat};
    use std::sync::Mutex;

    fn stereo_s16() -> StreamFormat {
        StreamFormat::new(SampleFormat::S16Le, 48000, ChannelLayout::stereo())
    }

    #[test]
    fn test_builder_rejects_zero_latency() {
        let backend = MockBackend::duplex(&stereo_s16());
        let result = DuplexAudio::builder()
            .latency(Duration::ZERO)
            .start(&backend);
        assert!(matches!(result, Err(DuplexAudioError::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_rejects_unrepresentable_latency() {
        let backend = MockBackend::duplex(&stereo_s16());
        let result = DuplexAudio::builder()
            .with_config(PipelineConfig {
                latency: Duration::from_secs(u64::MAX / 2),
                ..Default::default()
            })
            .start(&backend);
        assert!(matches!(result, Err(DuplexAudioError::InvalidConfig { .. })));
        assert_eq!(backend.open_count(Direction::Input), 0);

        let result = DuplexAudio::builder().latency(Duration::MAX).start(&backend);
        assert!(matches!(result, Err(DuplexAudioError::InvalidConfig { .. })));
    }

    #[test]
    fn test_no_default_device() {
        let backend = MockBackend::duplex(&stereo_s16()).with_default_input(None);
        let result = DuplexAudio::builder().start(&backend);
        assert!(matches!(
            result,
            Err(DuplexAudioError::NoDefaultDevice {
                direction: Direction::Input
            })
        ));
    }

    #[test]
    fn test_device_not_found() {
        let backend = MockBackend::duplex(&stereo_s16());
        let result = DuplexAudio::builder()
            .output_device(DeviceSelection::by_id("missing"))
            .start(&backend);
        match result {
            Err(DuplexAudioError::DeviceNotFound { id }) => assert_eq!(id, "missing"),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn test_raw_flag_is_part_of_selection() {
        let backend = MockBackend::duplex(&stereo_s16());
        let result = DuplexAudio::builder()
            .input_device(DeviceSelection::raw("mock-in"))
            .start(&backend);
        assert!(matches!(result, Err(DuplexAudioError::DeviceNotFound { .. })));
    }

    #[test]
    fn test_probe_error_is_fatal() {
        let broken = DeviceInfo::new("broken", "Broken Mic", Direction::Input)
            .with_probe_error(BackendError::from_kind(BackendErrorKind::OpeningDevice));
        let backend = MockBackend::new()
            .with_input(broken)
            .with_output(MockBackend::device("out", "Out", Direction::Output, &stereo_s16()));
        let result = DuplexAudio::builder().start(&backend);
        assert!(matches!(result, Err(DuplexAudioError::DeviceProbeFailed { .. })));
    }

    #[test]
    fn test_no_shared_sample_rate() {
        let format = stereo_s16();
        let input = MockBackend::device("in", "In", Direction::Input, &format)
            .with_sample_rates(vec![SampleRateRange::exact(44100)])
            .with_current_sample_rate(44100);
        let backend = MockBackend::new()
            .with_input(input)
            .with_output(MockBackend::device("out", "Out", Direction::Output, &format));
        let result = DuplexAudio::builder().start(&backend);
        assert!(matches!(result, Err(DuplexAudioError::NoCompatibleSampleRate)));
        assert_eq!(backend.open_count(Direction::Input), 0);
    }

    #[test]
    fn test_start_opens_both_streams_with_latency() {
        let backend = MockBackend::duplex(&stereo_s16());
        let session = DuplexAudio::builder()
            .latency(Duration::from_millis(50))
            .start(&backend)
            .unwrap();

        let params = backend.last_params(Direction::Output).unwrap();
        assert_eq!(params.software_latency, Some(Duration::from_millis(50)));
        assert_eq!(params.format, stereo_s16());
        // Twice the latency: 2 * 2400 frames * 4 bytes
        assert_eq!(session.ring_buffer_capacity(), 19200);
        assert_eq!(
            session.software_latency(Direction::Input),
            Some(Duration::from_millis(50))
        );
        assert!(backend.capture_driver().unwrap().is_running());
        assert!(backend.playback_driver().unwrap().is_running());
    }

    #[test]
    fn test_started_events_capture_first() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let backend = MockBackend::duplex(&stereo_s16());
        let _session = DuplexAudio::builder()
            .on_event(move |e| sink.lock().unwrap().push(e))
            .start(&backend)
            .unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                StreamEvent::StreamStarted {
                    direction: Direction::Input
                },
                StreamEvent::StreamStarted {
                    direction: Direction::Output
                },
            ]
        );
    }
}
