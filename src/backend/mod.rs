//! The audio backend contract.
//!
//! A backend enumerates devices, opens streams with a negotiated
//! [`StreamFormat`], and drives the pipeline by invoking handler objects from
//! its realtime threads:
//!
//! - [`CaptureHandler::on_ready`] is given an [`InputIo`] to read frames from
//! - [`PlaybackHandler::on_ready`] is given an [`OutputIo`] to write frames to
//!
//! Both follow a begin/end transaction protocol: `begin_*` hands out
//! [`ReadAreas`]/[`WriteAreas`] for up to the requested number of frames, and
//! the matching `end_*` must be called before the next `begin_*`. A batch may
//! be shorter than requested, in which case the handler loops.
//!
//! [`CpalBackend`] is the production implementation; [`MockBackend`] drives
//! handlers deterministically for tests.

mod areas;
mod cpal_backend;
mod mock;

use std::fmt;
use std::time::Duration;

pub use areas::{ChannelArea, ReadAreas, WriteAreas};
pub use cpal_backend::{available_backends, CpalBackend};
pub use mock::{MockBackend, MockBlock, MockCaptureDriver, MockPlaybackDriver};

use crate::error::BackendError;
use crate::format::{ChannelLayout, SampleFormat, StreamFormat};

/// Stream or device direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Capture.
    Input,
    /// Playback.
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// An inclusive range of supported sample rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRateRange {
    /// Lowest supported rate in Hz.
    pub min: u32,
    /// Highest supported rate in Hz.
    pub max: u32,
}

impl SampleRateRange {
    /// A range covering exactly one rate.
    pub fn exact(rate: u32) -> Self {
        Self {
            min: rate,
            max: rate,
        }
    }

    /// Whether `rate` lies inside the range.
    pub fn contains(&self, rate: u32) -> bool {
        (self.min..=self.max).contains(&rate)
    }
}

impl fmt::Display for SampleRateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{} - {}", self.min, self.max)
        }
    }
}

/// Capabilities of one device, as reported by the backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    id: String,
    name: String,
    direction: Direction,
    is_raw: bool,
    formats: Vec<SampleFormat>,
    current_format: Option<SampleFormat>,
    sample_rates: Vec<SampleRateRange>,
    current_sample_rate: Option<u32>,
    layouts: Vec<ChannelLayout>,
    current_layout: Option<ChannelLayout>,
    software_latency_range: Option<(Duration, Duration)>,
    current_software_latency: Option<Duration>,
    probe_error: Option<BackendError>,
}

impl DeviceInfo {
    /// Creates a device with no capabilities. Use the `with_*` methods to
    /// describe it.
    pub fn new(id: impl Into<String>, name: impl Into<String>, direction: Direction) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            direction,
            is_raw: false,
            formats: Vec::new(),
            current_format: None,
            sample_rates: Vec::new(),
            current_sample_rate: None,
            layouts: Vec::new(),
            current_layout: None,
            software_latency_range: None,
            current_software_latency: None,
            probe_error: None,
        }
    }

    /// Marks the device as raw (exclusive, unmixed access).
    #[must_use]
    pub fn with_raw(mut self, is_raw: bool) -> Self {
        self.is_raw = is_raw;
        self
    }

    /// Sets the supported sample formats.
    #[must_use]
    pub fn with_formats(mut self, formats: Vec<SampleFormat>) -> Self {
        self.formats = formats;
        self
    }

    /// Sets the format the device currently runs at.
    #[must_use]
    pub fn with_current_format(mut self, format: SampleFormat) -> Self {
        self.current_format = Some(format);
        self
    }

    /// Sets the supported sample rate ranges.
    #[must_use]
    pub fn with_sample_rates(mut self, rates: Vec<SampleRateRange>) -> Self {
        self.sample_rates = rates;
        self
    }

    /// Sets the rate the device currently runs at.
    #[must_use]
    pub fn with_current_sample_rate(mut self, rate: u32) -> Self {
        self.current_sample_rate = Some(rate);
        self
    }

    /// Sets the supported channel layouts.
    #[must_use]
    pub fn with_layouts(mut self, layouts: Vec<ChannelLayout>) -> Self {
        self.layouts = layouts;
        self
    }

    /// Sets the layout the device currently runs with.
    #[must_use]
    pub fn with_current_layout(mut self, layout: ChannelLayout) -> Self {
        self.current_layout = Some(layout);
        self
    }

    /// Sets the supported software latency range.
    #[must_use]
    pub fn with_software_latency(mut self, min: Duration, max: Duration, current: Duration) -> Self {
        self.software_latency_range = Some((min, max));
        self.current_software_latency = Some(current);
        self
    }

    /// Records that probing the device's capabilities failed.
    #[must_use]
    pub fn with_probe_error(mut self, error: BackendError) -> Self {
        self.probe_error = Some(error);
        self
    }

    /// Backend-specific stable identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is a capture or playback device.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Whether the device is opened raw.
    pub fn is_raw(&self) -> bool {
        self.is_raw
    }

    /// Supported sample formats.
    pub fn formats(&self) -> &[SampleFormat] {
        &self.formats
    }

    /// Current sample format, if known.
    pub fn current_format(&self) -> Option<SampleFormat> {
        self.current_format
    }

    /// Supported sample rate ranges.
    pub fn sample_rates(&self) -> &[SampleRateRange] {
        &self.sample_rates
    }

    /// Current sample rate, if known.
    pub fn current_sample_rate(&self) -> Option<u32> {
        self.current_sample_rate
    }

    /// Supported channel layouts.
    pub fn layouts(&self) -> &[ChannelLayout] {
        &self.layouts
    }

    /// Current channel layout, if known.
    pub fn current_layout(&self) -> Option<&ChannelLayout> {
        self.current_layout.as_ref()
    }

    /// Supported software latency range, if known.
    pub fn software_latency_range(&self) -> Option<(Duration, Duration)> {
        self.software_latency_range
    }

    /// Current software latency, if known.
    pub fn current_software_latency(&self) -> Option<Duration> {
        self.current_software_latency
    }

    /// The error that occurred while probing, if any.
    pub fn probe_error(&self) -> Option<&BackendError> {
        self.probe_error.as_ref()
    }

    /// Whether the device accepts `format`.
    pub fn supports_format(&self, format: SampleFormat) -> bool {
        self.formats.contains(&format)
    }

    /// Whether any supported range contains `rate`.
    pub fn supports_sample_rate(&self, rate: u32) -> bool {
        self.sample_rates.iter().any(|range| range.contains(rate))
    }

    /// Whether the device accepts `layout`.
    pub fn supports_layout(&self, layout: &ChannelLayout) -> bool {
        self.layouts.contains(layout)
    }

    /// The supported rate closest to `rate`, preferring higher rates when
    /// `rate` lies outside every range.
    pub fn nearest_sample_rate(&self, rate: u32) -> Option<u32> {
        let mut best: Option<u32> = None;
        for range in &self.sample_rates {
            if range.contains(rate) {
                return Some(rate);
            }
            let candidate = if rate < range.min { range.min } else { range.max };
            best = match best {
                Some(b) if b.abs_diff(rate) < candidate.abs_diff(rate) => Some(b),
                Some(b) if b.abs_diff(rate) == candidate.abs_diff(rate) => Some(b.max(candidate)),
                _ => Some(candidate),
            };
        }
        best
    }

    /// Sorts the layouts so that those with more channels come first.
    pub fn sort_channel_layouts(&mut self) {
        ChannelLayout::sort_by_channel_count(&mut self.layouts);
    }
}

impl PartialEq for DeviceInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.is_raw == other.is_raw && self.direction == other.direction
    }
}

/// Parameters for opening a stream.
#[derive(Debug, Clone)]
pub struct StreamParams {
    /// Format the stream runs at.
    pub format: StreamFormat,
    /// Target buffering delay. `None` lets the backend choose.
    pub software_latency: Option<Duration>,
    /// Stream name shown by backends that support one.
    pub name: Option<String>,
}

impl StreamParams {
    /// Parameters with no latency target and no name.
    pub fn new(format: StreamFormat) -> Self {
        Self {
            format,
            software_latency: None,
            name: None,
        }
    }

    /// Sets the software latency target.
    #[must_use]
    pub fn with_software_latency(mut self, latency: Duration) -> Self {
        self.software_latency = Some(latency);
        self
    }

    /// Sets the stream name.
    #[must_use]
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }
}

/// One batch handed out by [`InputIo::begin_read`].
pub enum CaptureBatch<'a> {
    /// Captured frames.
    Frames(ReadAreas<'a>),
    /// The backend lost this many frames; there is no data to read.
    Hole {
        /// Number of missing frames.
        frames: usize,
    },
}

impl CaptureBatch<'_> {
    /// Frames covered by this batch.
    pub fn frame_count(&self) -> usize {
        match self {
            Self::Frames(areas) => areas.frame_count(),
            Self::Hole { frames } => *frames,
        }
    }
}

/// Read side of the capture transaction protocol.
pub trait InputIo {
    /// Begins a read of up to `frames` frames.
    ///
    /// A returned batch of 0 frames means no more data is available in this
    /// callback; `end_read` must not be called for it.
    fn begin_read(&mut self, frames: usize) -> Result<CaptureBatch<'_>, BackendError>;

    /// Ends the read begun by the last `begin_read`.
    fn end_read(&mut self) -> Result<(), BackendError>;
}

/// Write side of the playback transaction protocol.
pub trait OutputIo {
    /// Begins a write of up to `frames` frames.
    fn begin_write(&mut self, frames: usize) -> Result<WriteAreas<'_>, BackendError>;

    /// Ends the write begun by the last `begin_write`, submitting its frames.
    fn end_write(&mut self) -> Result<(), BackendError>;
}

/// Callbacks of an input stream, invoked from the backend's realtime thread.
pub trait CaptureHandler: Send + 'static {
    /// Frames are ready: at least `min_frames` must be read, at most
    /// `max_frames` may be.
    fn on_ready(&mut self, io: &mut dyn InputIo, min_frames: usize, max_frames: usize);

    /// The backend dropped captured frames because they were not read in time.
    fn on_overflow(&mut self) {}

    /// The stream hit an unrecoverable error.
    fn on_error(&mut self, error: BackendError) {
        let _ = error;
    }
}

/// Callbacks of an output stream, invoked from the backend's realtime thread.
pub trait PlaybackHandler: Send + 'static {
    /// The device needs frames: at least `min_frames` must be written, at
    /// most `max_frames` may be.
    fn on_ready(&mut self, io: &mut dyn OutputIo, min_frames: usize, max_frames: usize);

    /// The device ran out of frames to play.
    fn on_underflow(&mut self) {}

    /// The stream hit an unrecoverable error.
    fn on_error(&mut self, error: BackendError) {
        let _ = error;
    }
}

/// An open stream. Dropping the handle disposes the stream.
pub trait StreamHandle {
    /// Starts invoking the handler.
    fn start(&mut self) -> Result<(), BackendError>;

    /// Pauses (`true`) or resumes (`false`) the stream.
    ///
    /// Must not be called from inside a handler callback.
    fn pause(&self, pause: bool) -> Result<(), BackendError>;

    /// Discards frames queued in the backend (output streams only).
    fn clear_buffer(&self) -> Result<(), BackendError>;

    /// Latency the backend actually applied, if known.
    fn software_latency(&self) -> Option<Duration>;

    /// Format the stream was opened with.
    fn format(&self) -> &StreamFormat;

    /// Whether this is a capture or playback stream.
    fn direction(&self) -> Direction;
}

/// A native audio backend.
pub trait AudioBackend {
    /// Backend name, e.g. `"ALSA"`.
    fn name(&self) -> &str;

    /// Capture devices, in backend order.
    fn input_devices(&self) -> Result<Vec<DeviceInfo>, BackendError>;

    /// Playback devices, in backend order.
    fn output_devices(&self) -> Result<Vec<DeviceInfo>, BackendError>;

    /// Index of the default capture device in [`input_devices`](Self::input_devices).
    fn default_input_device(&self) -> Option<usize>;

    /// Index of the default playback device in [`output_devices`](Self::output_devices).
    fn default_output_device(&self) -> Option<usize>;

    /// Opens a capture stream. The stream is not started.
    fn open_input(
        &self,
        device: &DeviceInfo,
        params: &StreamParams,
        handler: Box<dyn CaptureHandler>,
    ) -> Result<Box<dyn StreamHandle>, BackendError>;

    /// Opens a playback stream. The stream is not started.
    fn open_output(
        &self,
        device: &DeviceInfo,
        params: &StreamParams,
        handler: Box<dyn PlaybackHandler>,
    ) -> Result<Box<dyn StreamHandle>, BackendError>;
}

/// All devices of a backend, with defaults.
#[derive(Debug, Clone)]
pub struct DeviceListing {
    /// Backend name.
    pub backend: String,
    /// Capture devices.
    pub inputs: Vec<DeviceInfo>,
    /// Playback devices.
    pub outputs: Vec<DeviceInfo>,
    /// Index of the default capture device.
    pub default_input: Option<usize>,
    /// Index of the default playback device.
    pub default_output: Option<usize>,
}

impl DeviceListing {
    /// The default capture device, if any.
    pub fn default_input_device(&self) -> Option<&DeviceInfo> {
        self.default_input.and_then(|i| self.inputs.get(i))
    }

    /// The default playback device, if any.
    pub fn default_output_device(&self) -> Option<&DeviceInfo> {
        self.default_output.and_then(|i| self.outputs.get(i))
    }
}

/// Enumerates every device of `backend`.
///
/// # Errors
///
/// Returns the backend error if either device list cannot be read.
pub fn list_devices(backend: &dyn AudioBackend) -> Result<DeviceListing, BackendError> {
    Ok(DeviceListing {
        backend: backend.name().to_string(),
        inputs: backend.input_devices()?,
        outputs: backend.output_devices()?,
        default_input: backend.default_input_device(),
        default_output: backend.default_output_device(),
    })
}

fn write_device(f: &mut fmt::Formatter<'_>, device: &DeviceInfo, is_default: bool) -> fmt::Result {
    let default = if is_default { " (default)" } else { "" };
    let raw = if device.is_raw() { " (raw)" } else { "" };
    writeln!(f, "{}{default}{raw}", device.name())?;
    writeln!(f, "  id: {}", device.id())?;

    if let Some(error) = device.probe_error() {
        return writeln!(f, "  probe error: {error}");
    }

    writeln!(f, "  channel layouts:")?;
    for layout in device.layouts() {
        let current = if device.current_layout() == Some(layout) {
            " (current)"
        } else {
            ""
        };
        writeln!(f, "    {layout}{current}")?;
    }

    write!(f, "  sample rates:")?;
    for range in device.sample_rates() {
        write!(f, " {range}")?;
    }
    writeln!(f)?;
    if let Some(rate) = device.current_sample_rate() {
        writeln!(f, "  current sample rate: {rate}")?;
    }

    write!(f, "  formats:")?;
    for format in device.formats() {
        write!(f, " {format}")?;
    }
    writeln!(f)?;
    if let Some(format) = device.current_format() {
        writeln!(f, "  current format: {format}")?;
    }

    if let Some((min, max)) = device.software_latency_range() {
        writeln!(
            f,
            "  software latency: {:.4} - {:.4} sec",
            min.as_secs_f64(),
            max.as_secs_f64()
        )?;
    }
    if let Some(current) = device.current_software_latency() {
        writeln!(f, "  current software latency: {:.4} sec", current.as_secs_f64())?;
    }
    writeln!(f)
}

impl fmt::Display for DeviceListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Backend: {}", self.backend)?;
        writeln!(f)?;
        writeln!(f, "--------Input Devices--------")?;
        writeln!(f)?;
        for (i, device) in self.inputs.iter().enumerate() {
            write_device(f, device, self.default_input == Some(i))?;
        }
        writeln!(f, "--------Output Devices--------")?;
        writeln!(f)?;
        for (i, device) in self.outputs.iter().enumerate() {
            write_device(f, device, self.default_output == Some(i))?;
        }
        write!(
            f,
            "{} devices found",
            self.inputs.len() + self.outputs.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> DeviceInfo {
        DeviceInfo::new("hw:0", "Built-in", Direction::Input).with_sample_rates(vec![
            SampleRateRange { min: 8000, max: 16000 },
            SampleRateRange::exact(44100),
            SampleRateRange::exact(96000),
        ])
    }

    #[test]
    fn test_supports_sample_rate() {
        let device = device();
        assert!(device.supports_sample_rate(11025));
        assert!(device.supports_sample_rate(44100));
        assert!(!device.supports_sample_rate(48000));
    }

    #[test]
    fn test_nearest_sample_rate() {
        let device = device();
        assert_eq!(device.nearest_sample_rate(12000), Some(12000));
        assert_eq!(device.nearest_sample_rate(48000), Some(44100));
        assert_eq!(device.nearest_sample_rate(4000), Some(8000));
        assert_eq!(device.nearest_sample_rate(200_000), Some(96000));
        let empty = DeviceInfo::new("x", "x", Direction::Output);
        assert_eq!(empty.nearest_sample_rate(48000), None);
    }

    #[test]
    fn test_sort_channel_layouts() {
        let mut device = device().with_layouts(vec![
            ChannelLayout::mono(),
            ChannelLayout::stereo(),
            ChannelLayout::default_for(6).unwrap(),
        ]);
        device.sort_channel_layouts();
        assert_eq!(device.layouts()[0].channel_count(), 6);
        assert_eq!(device.layouts()[2].channel_count(), 1);
    }

    #[test]
    fn test_device_equality_includes_raw_flag() {
        let shared = device();
        let raw = device().with_raw(true);
        assert_ne!(shared, raw);
        assert_eq!(shared, device());
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Input.to_string(), "input");
        assert_eq!(Direction::Output.to_string(), "output");
    }

    #[test]
    fn test_listing_display_marks_defaults() {
        let listing = DeviceListing {
            backend: "Mock".to_string(),
            inputs: vec![device().with_layouts(vec![ChannelLayout::stereo()])],
            outputs: vec![DeviceInfo::new("out", "Speakers", Direction::Output)],
            default_input: Some(0),
            default_output: None,
        };
        let text = listing.to_string();
        assert!(text.contains("Backend: Mock"));
        assert!(text.contains("Built-in (default)"));
        assert!(text.contains("Speakers\n"));
        assert!(text.contains("8000 - 16000 44100 96000"));
        assert!(text.ends_with("2 devices found"));
    }
}
