//! Configuration types for audio pipelines.

use std::fmt;
use std::time::Duration;

/// Which device a pipeline should open.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceSelection {
    /// The backend's default device for the direction.
    #[default]
    SystemDefault,

    /// A specific device by backend id.
    ById {
        /// Device id as reported by [`DeviceInfo::id`](crate::backend::DeviceInfo::id).
        id: String,
        /// Select the raw (unmixed, exclusive) variant of the device.
        raw: bool,
    },
}

impl DeviceSelection {
    /// Selects the shared-mode device with the given id.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::ById {
            id: id.into(),
            raw: false,
        }
    }

    /// Selects the raw variant of the device with the given id.
    pub fn raw(id: impl Into<String>) -> Self {
        Self::ById {
            id: id.into(),
            raw: true,
        }
    }
}

impl fmt::Display for DeviceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SystemDefault => write!(f, "default"),
            Self::ById { id, raw: false } => write!(f, "{id}"),
            Self::ById { id, raw: true } => write!(f, "{id} (raw)"),
        }
    }
}

/// Configuration for the duplex passthrough pipeline.
///
/// Use [`PipelineConfig::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use duplex_audio::PipelineConfig;
/// use std::time::Duration;
///
/// let config = PipelineConfig {
///     latency: Duration::from_millis(50),
///     ..Default::default()
/// };
/// assert_eq!(config.ring_buffer_duration(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Software latency requested for both streams.
    ///
    /// Default: 200ms
    pub latency: Duration,

    /// Duration of audio the ring buffer can hold.
    ///
    /// `None` sizes the buffer at twice the latency.
    /// Default: `None`
    pub ring_buffer_duration: Option<Duration>,

    /// Pre-fill the ring buffer with one latency of silence so playback
    /// starts without an immediate underflow.
    ///
    /// Default: true
    pub prefill: bool,

    /// Stream name passed to the backend (shown by some system mixers).
    ///
    /// Default: `None`
    pub stream_name: Option<String>,
}

impl PipelineConfig {
    /// Effective ring buffer duration.
    #[must_use]
    pub fn ring_buffer_duration(&self) -> Duration {
        self.ring_buffer_duration
            .unwrap_or_else(|| self.latency.saturating_mul(2))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(200),
            ring_buffer_duration: None,
            prefill: true,
            stream_name: None,
        }
    }
}

/// Configuration for the capture-only recorder.
///
/// # Example
///
/// ```
/// use duplex_audio::RecorderConfig;
/// use std::time::Duration;
///
/// let config = RecorderConfig {
///     drain_interval: Duration::from_millis(20),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Size of the ring buffer between the capture callback and the drain task.
    ///
    /// This buffer absorbs pressure from slow sinks. If it fills, new audio
    /// is dropped and a [`StreamEvent::Overflow`] is emitted.
    /// Default: 30 seconds
    ///
    /// [`StreamEvent::Overflow`]: crate::StreamEvent::Overflow
    pub ring_buffer_duration: Duration,

    /// How often the drain task empties the ring buffer into sinks.
    ///
    /// Default: 100ms
    pub drain_interval: Duration,

    /// Software latency requested for the input stream.
    ///
    /// Default: `None` (backend default)
    pub software_latency: Option<Duration>,

    /// Number of attempts for a failed sink write.
    ///
    /// Default: 3
    pub sink_retry_attempts: u32,

    /// Initial delay between sink retry attempts.
    ///
    /// Uses exponential backoff (delay doubles each attempt).
    /// Default: 100ms
    pub sink_retry_delay: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            ring_buffer_duration: Duration::from_secs(30),
            drain_interval: Duration::from_millis(100),
            software_latency: None,
            sink_retry_attempts: 3,
            sink_retry_delay: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.latency, Duration::from_millis(200));
        assert_eq!(config.ring_buffer_duration, None);
        assert!(config.prefill);
        assert!(config.stream_name.is_none());
    }

    #[test]
    fn test_ring_buffer_duration_defaults_to_twice_latency() {
        let config = PipelineConfig::default();
        assert_eq!(config.ring_buffer_duration(), Duration::from_millis(400));

        let config = PipelineConfig {
            ring_buffer_duration: Some(Duration::from_millis(250)),
            ..Default::default()
        };
        assert_eq!(config.ring_buffer_duration(), Duration::from_millis(250));
    }

    #[test]
    fn test_recorder_config_defaults() {
        let config = RecorderConfig::default();
        assert_eq!(config.ring_buffer_duration, Duration::from_secs(30));
        assert_eq!(config.drain_interval, Duration::from_millis(100));
        assert_eq!(config.software_latency, None);
        assert_eq!(config.sink_retry_attempts, 3);
        assert_eq!(config.sink_retry_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_device_selection_display() {
        assert_eq!(DeviceSelection::default().to_string(), "default");
        assert_eq!(DeviceSelection::by_id("hw:0").to_string(), "hw:0");
        assert_eq!(DeviceSelection::raw("hw:0").to_string(), "hw:0 (raw)");
    }
}
