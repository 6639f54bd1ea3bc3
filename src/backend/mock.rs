//! Mock audio backend for testing without hardware.
//!
//! [`MockBackend`] reports scripted devices and records every stream it
//! opens. Tests drive the opened streams' handlers through
//! [`MockCaptureDriver`] and [`MockPlaybackDriver`], one callback cycle at a
//! time, so the whole pipeline runs deterministically on the test thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{
    AudioBackend, CaptureBatch, CaptureHandler, ChannelArea, DeviceInfo, Direction, InputIo,
    OutputIo, PlaybackHandler, ReadAreas, SampleRateRange, StreamHandle, StreamParams, WriteAreas,
};
use crate::error::{BackendError, BackendErrorKind};
use crate::format::StreamFormat;

/// Byte the playback driver pre-fills output buffers with, so tests can tell
/// written samples from untouched ones.
const UNWRITTEN: u8 = 0xEE;

/// One block of scripted capture input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBlock {
    /// Interleaved frame bytes in the stream's format.
    Frames(Vec<u8>),
    /// A gap of this many frames reported by the backend.
    Hole(usize),
}

struct StreamState<H: ?Sized> {
    handler: Mutex<Box<H>>,
    format: StreamFormat,
    planar: bool,
    max_batch: usize,
    started: AtomicBool,
    paused: AtomicBool,
    closed: AtomicBool,
    clears: AtomicU64,
}

impl<H: ?Sized> StreamState<H> {
    fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
            && !self.paused.load(Ordering::SeqCst)
            && !self.closed.load(Ordering::SeqCst)
    }
}

struct MockStream<H: ?Sized> {
    state: Arc<StreamState<H>>,
    direction: Direction,
    software_latency: Option<Duration>,
    start_error: Option<BackendError>,
}

impl<H: ?Sized> StreamHandle for MockStream<H> {
    fn start(&mut self) -> Result<(), BackendError> {
        if let Some(error) = self.start_error.take() {
            return Err(error);
        }
        self.state.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self, pause: bool) -> Result<(), BackendError> {
        self.state.paused.store(pause, Ordering::SeqCst);
        Ok(())
    }

    fn clear_buffer(&self) -> Result<(), BackendError> {
        if self.direction == Direction::Input {
            return Err(BackendError::new(
                BackendErrorKind::IncompatibleDevice,
                "clear_buffer is only supported on output streams",
            ));
        }
        self.state.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn software_latency(&self) -> Option<Duration> {
        self.software_latency
    }

    fn format(&self) -> &StreamFormat {
        &self.state.format
    }

    fn direction(&self) -> Direction {
        self.direction
    }
}

impl<H: ?Sized> Drop for MockStream<H> {
    fn drop(&mut self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

type CaptureState = Arc<StreamState<dyn CaptureHandler>>;
type PlaybackState = Arc<StreamState<dyn PlaybackHandler>>;

#[derive(Default)]
struct Opened {
    inputs: Vec<(StreamParams, CaptureState)>,
    outputs: Vec<(StreamParams, PlaybackState)>,
}

/// An in-process [`AudioBackend`] with scripted devices.
///
/// # Example
///
/// ```
/// use duplex_audio::backend::{list_devices, MockBackend};
/// use duplex_audio::{ChannelLayout, SampleFormat, StreamFormat};
///
/// let format = StreamFormat::new(SampleFormat::S16Le, 48000, ChannelLayout::stereo());
/// let backend = MockBackend::duplex(&format);
///
/// let listing = list_devices(&backend).unwrap();
/// assert_eq!(listing.inputs.len(), 1);
/// assert_eq!(listing.outputs.len(), 1);
/// ```
pub struct MockBackend {
    name: String,
    inputs: Vec<DeviceInfo>,
    outputs: Vec<DeviceInfo>,
    default_input: Option<usize>,
    default_output: Option<usize>,
    open_errors: Vec<(Direction, BackendError)>,
    start_errors: Vec<(Direction, BackendError)>,
    planar: bool,
    max_batch: usize,
    opened: Mutex<Opened>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Creates a backend named `"Mock"` with no devices.
    pub fn new() -> Self {
        Self {
            name: "Mock".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            default_input: None,
            default_output: None,
            open_errors: Vec::new(),
            start_errors: Vec::new(),
            planar: false,
            max_batch: usize::MAX,
            opened: Mutex::new(Opened::default()),
        }
    }

    /// Creates a backend with one input and one output device, both
    /// supporting exactly `format`, and both marked as the default.
    pub fn duplex(format: &StreamFormat) -> Self {
        Self::new()
            .with_input(Self::device("mock-in", "Mock Microphone", Direction::Input, format))
            .with_output(Self::device("mock-out", "Mock Speakers", Direction::Output, format))
    }

    /// Describes a device that supports exactly `format`.
    pub fn device(id: &str, name: &str, direction: Direction, format: &StreamFormat) -> DeviceInfo {
        DeviceInfo::new(id, name, direction)
            .with_formats(vec![format.sample_format])
            .with_current_format(format.sample_format)
            .with_sample_rates(vec![SampleRateRange::exact(format.sample_rate)])
            .with_current_sample_rate(format.sample_rate)
            .with_layouts(vec![format.layout.clone()])
            .with_current_layout(format.layout.clone())
            .with_software_latency(
                Duration::from_millis(1),
                Duration::from_secs(4),
                Duration::from_millis(20),
            )
    }

    /// Sets the backend name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a capture device. The first one added becomes the default.
    #[must_use]
    pub fn with_input(mut self, device: DeviceInfo) -> Self {
        self.inputs.push(device);
        self.default_input.get_or_insert(0);
        self
    }

    /// Adds a playback device. The first one added becomes the default.
    #[must_use]
    pub fn with_output(mut self, device: DeviceInfo) -> Self {
        self.outputs.push(device);
        self.default_output.get_or_insert(0);
        self
    }

    /// Overrides the default capture device index.
    #[must_use]
    pub fn with_default_input(mut self, index: Option<usize>) -> Self {
        self.default_input = index;
        self
    }

    /// Overrides the default playback device index.
    #[must_use]
    pub fn with_default_output(mut self, index: Option<usize>) -> Self {
        self.default_output = index;
        self
    }

    /// Makes opening a stream in `direction` fail with `error`.
    #[must_use]
    pub fn with_open_error(mut self, direction: Direction, error: BackendError) -> Self {
        self.open_errors.push((direction, error));
        self
    }

    /// Makes starting a stream in `direction` fail with `error`.
    #[must_use]
    pub fn with_start_error(mut self, direction: Direction, error: BackendError) -> Self {
        self.start_errors.push((direction, error));
        self
    }

    /// Hands out planar channel areas instead of interleaved ones.
    #[must_use]
    pub fn with_planar(mut self, planar: bool) -> Self {
        self.planar = planar;
        self
    }

    /// Caps the frames a single begin/end transaction covers, forcing
    /// handlers to loop.
    #[must_use]
    pub fn with_max_batch(mut self, frames: usize) -> Self {
        self.max_batch = frames.max(1);
        self
    }

    /// Number of streams opened so far in `direction`.
    pub fn open_count(&self, direction: Direction) -> usize {
        let opened = self.opened.lock();
        match direction {
            Direction::Input => opened.inputs.len(),
            Direction::Output => opened.outputs.len(),
        }
    }

    /// Parameters of the most recently opened stream in `direction`.
    pub fn last_params(&self, direction: Direction) -> Option<StreamParams> {
        let opened = self.opened.lock();
        match direction {
            Direction::Input => opened.inputs.last().map(|(p, _)| p.clone()),
            Direction::Output => opened.outputs.last().map(|(p, _)| p.clone()),
        }
    }

    /// Driver for the most recently opened capture stream.
    pub fn capture_driver(&self) -> Option<MockCaptureDriver> {
        self.opened
            .lock()
            .inputs
            .last()
            .map(|(_, state)| MockCaptureDriver {
                state: Arc::clone(state),
            })
    }

    /// Driver for the most recently opened playback stream.
    pub fn playback_driver(&self) -> Option<MockPlaybackDriver> {
        self.opened
            .lock()
            .outputs
            .last()
            .map(|(_, state)| MockPlaybackDriver {
                state: Arc::clone(state),
            })
    }

    fn check_open(&self, device: &DeviceInfo, params: &StreamParams, direction: Direction) -> Result<(), BackendError> {
        if let Some((_, error)) = self.open_errors.iter().find(|(d, _)| *d == direction) {
            return Err(error.clone());
        }
        let known = match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        };
        if !known.contains(device) {
            return Err(BackendError::new(BackendErrorKind::NoSuchDevice, device.id().to_string()));
        }
        let format = &params.format;
        if !device.supports_format(format.sample_format)
            || !device.supports_sample_rate(format.sample_rate)
            || !device.supports_layout(&format.layout)
        {
            return Err(BackendError::new(
                BackendErrorKind::IncompatibleDevice,
                format!("{} does not support {format}", device.name()),
            ));
        }
        Ok(())
    }

    fn applied_latency(device: &DeviceInfo, params: &StreamParams) -> Option<Duration> {
        match (params.software_latency, device.software_latency_range()) {
            (Some(wanted), Some((min, max))) => Some(wanted.clamp(min, max)),
            (Some(wanted), None) => Some(wanted),
            (None, _) => device.current_software_latency(),
        }
    }

    fn start_error(&self, direction: Direction) -> Option<BackendError> {
        self.start_errors
            .iter()
            .find(|(d, _)| *d == direction)
            .map(|(_, e)| e.clone())
    }

    fn new_state<H: ?Sized>(&self, handler: Box<H>, format: &StreamFormat) -> Arc<StreamState<H>> {
        Arc::new(StreamState {
            handler: Mutex::new(handler),
            format: format.clone(),
            planar: self.planar,
            max_batch: self.max_batch,
            started: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            clears: AtomicU64::new(0),
        })
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_devices(&self) -> Result<Vec<DeviceInfo>, BackendError> {
        Ok(self.inputs.clone())
    }

    fn output_devices(&self) -> Result<Vec<DeviceInfo>, BackendError> {
        Ok(self.outputs.clone())
    }

    fn default_input_device(&self) -> Option<usize> {
        self.default_input
    }

    fn default_output_device(&self) -> Option<usize> {
        self.default_output
    }

    fn open_input(
        &self,
        device: &DeviceInfo,
        params: &StreamParams,
        handler: Box<dyn CaptureHandler>,
    ) -> Result<Box<dyn StreamHandle>, BackendError> {
        self.check_open(device, params, Direction::Input)?;
        let state = self.new_state(handler, &params.format);
        self.opened
            .lock()
            .inputs
            .push((params.clone(), Arc::clone(&state)));
        Ok(Box::new(MockStream {
            state,
            direction: Direction::Input,
            software_latency: Self::applied_latency(device, params),
            start_error: self.start_error(Direction::Input),
        }))
    }

    fn open_output(
        &self,
        device: &DeviceInfo,
        params: &StreamParams,
        handler: Box<dyn PlaybackHandler>,
    ) -> Result<Box<dyn StreamHandle>, BackendError> {
        self.check_open(device, params, Direction::Output)?;
        let state = self.new_state(handler, &params.format);
        self.opened
            .lock()
            .outputs
            .push((params.clone(), Arc::clone(&state)));
        Ok(Box::new(MockStream {
            state,
            direction: Direction::Output,
            software_latency: Self::applied_latency(device, params),
            start_error: self.start_error(Direction::Output),
        }))
    }
}

/// Lays out interleaved frames the way the stream's areas expect.
fn to_layout(interleaved: &[u8], format: &StreamFormat, planar: bool, out: &mut Vec<u8>) {
    out.clear();
    if !planar {
        out.extend_from_slice(interleaved);
        return;
    }
    let bps = format.bytes_per_sample();
    let channels = format.channel_count();
    let frames = interleaved.len() / format.bytes_per_frame();
    out.resize(interleaved.len(), 0);
    for frame in 0..frames {
        for ch in 0..channels {
            let src = (frame * channels + ch) * bps;
            let dst = (ch * frames + frame) * bps;
            out[dst..dst + bps].copy_from_slice(&interleaved[src..src + bps]);
        }
    }
}

/// Inverse of [`to_layout`].
fn from_layout(buffer: &[u8], format: &StreamFormat, planar: bool, out: &mut Vec<u8>) {
    if !planar {
        out.extend_from_slice(buffer);
        return;
    }
    let bps = format.bytes_per_sample();
    let channels = format.channel_count();
    let frames = buffer.len() / format.bytes_per_frame();
    let start = out.len();
    out.resize(start + buffer.len(), 0);
    for frame in 0..frames {
        for ch in 0..channels {
            let src = (ch * frames + frame) * bps;
            let dst = start + (frame * channels + ch) * bps;
            out[dst..dst + bps].copy_from_slice(&buffer[src..src + bps]);
        }
    }
}

fn areas_for(format: &StreamFormat, planar: bool, frames: usize) -> Vec<ChannelArea> {
    if planar {
        ChannelArea::planar(format.channel_count(), format.bytes_per_sample(), frames)
    } else {
        ChannelArea::interleaved(format.channel_count(), format.bytes_per_sample())
    }
}

fn transaction_error(what: &str) -> BackendError {
    BackendError::new(BackendErrorKind::Invalid, what.to_string())
}

struct MockInput<'a> {
    blocks: VecDeque<MockBlock>,
    format: &'a StreamFormat,
    planar: bool,
    max_batch: usize,
    buffer: Vec<u8>,
    areas: Vec<ChannelArea>,
    open: bool,
    transactions: usize,
}

impl InputIo for MockInput<'_> {
    fn begin_read(&mut self, frames: usize) -> Result<CaptureBatch<'_>, BackendError> {
        if self.open {
            return Err(transaction_error("begin_read while a read is open"));
        }
        let bpf = self.format.bytes_per_frame();
        let limit = frames.min(self.max_batch);

        match self.blocks.pop_front() {
            Some(MockBlock::Hole(hole)) if limit > 0 => {
                let n = hole.min(limit);
                if hole > n {
                    self.blocks.push_front(MockBlock::Hole(hole - n));
                }
                self.open = n > 0;
                Ok(CaptureBatch::Hole { frames: n })
            }
            Some(MockBlock::Frames(mut bytes)) if limit > 0 => {
                let n = (bytes.len() / bpf).min(limit);
                let rest = bytes.split_off(n * bpf);
                if !rest.is_empty() {
                    self.blocks.push_front(MockBlock::Frames(rest));
                }
                to_layout(&bytes, self.format, self.planar, &mut self.buffer);
                self.areas = areas_for(self.format, self.planar, n);
                self.open = n > 0;
                Ok(CaptureBatch::Frames(ReadAreas::new(
                    &self.buffer,
                    &self.areas,
                    n,
                    self.format.bytes_per_sample(),
                )?))
            }
            other => {
                if let Some(block) = other {
                    self.blocks.push_front(block);
                }
                Ok(CaptureBatch::Hole { frames: 0 })
            }
        }
    }

    fn end_read(&mut self) -> Result<(), BackendError> {
        if !self.open {
            return Err(transaction_error("end_read without begin_read"));
        }
        self.open = false;
        self.transactions += 1;
        Ok(())
    }
}

/// Drives the handler of a mock capture stream.
#[derive(Clone)]
pub struct MockCaptureDriver {
    state: CaptureState,
}

impl MockCaptureDriver {
    /// Runs one `on_ready(min_frames, max_frames)` callback that reads from
    /// `blocks`.
    ///
    /// Returns the number of completed read transactions, or `None` if the
    /// stream is not running (never started, paused or disposed).
    pub fn deliver(&self, blocks: &[MockBlock], min_frames: usize, max_frames: usize) -> Option<usize> {
        if !self.state.is_running() {
            return None;
        }
        let mut io = MockInput {
            blocks: blocks.iter().cloned().collect(),
            format: &self.state.format,
            planar: self.state.planar,
            max_batch: self.state.max_batch,
            buffer: Vec::new(),
            areas: Vec::new(),
            open: false,
            transactions: 0,
        };
        self.state.handler.lock().on_ready(&mut io, min_frames, max_frames);
        Some(io.transactions)
    }

    /// Reports a backend-side overflow to the handler.
    pub fn signal_overflow(&self) {
        self.state.handler.lock().on_overflow();
    }

    /// Reports a stream error to the handler.
    pub fn signal_error(&self, error: BackendError) {
        self.state.handler.lock().on_error(error);
    }

    /// Whether the stream was started and is neither paused nor disposed.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Whether the stream handle has been dropped.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

struct MockOutput<'a> {
    format: &'a StreamFormat,
    planar: bool,
    max_batch: usize,
    capacity: usize,
    buffer: Vec<u8>,
    areas: Vec<ChannelArea>,
    open: bool,
    written: Vec<u8>,
}

impl OutputIo for MockOutput<'_> {
    fn begin_write(&mut self, frames: usize) -> Result<WriteAreas<'_>, BackendError> {
        if self.open {
            return Err(transaction_error("begin_write while a write is open"));
        }
        let n = frames.min(self.max_batch).min(self.capacity);
        self.buffer.clear();
        self.buffer.resize(n * self.format.bytes_per_frame(), UNWRITTEN);
        self.areas = areas_for(self.format, self.planar, n);
        self.open = n > 0;
        WriteAreas::new(
            &mut self.buffer,
            &self.areas,
            n,
            self.format.bytes_per_sample(),
        )
    }

    fn end_write(&mut self) -> Result<(), BackendError> {
        if !self.open {
            return Err(transaction_error("end_write without begin_write"));
        }
        self.open = false;
        self.capacity -= self.buffer.len() / self.format.bytes_per_frame();
        from_layout(&self.buffer, self.format, self.planar, &mut self.written);
        Ok(())
    }
}

/// Drives the handler of a mock playback stream.
#[derive(Clone)]
pub struct MockPlaybackDriver {
    state: PlaybackState,
}

impl MockPlaybackDriver {
    /// Runs one `on_ready(min_frames, max_frames)` callback.
    ///
    /// Returns the interleaved bytes the handler submitted, or `None` if the
    /// stream is not running. Bytes the handler left untouched read as
    /// `0xEE`.
    pub fn request(&self, min_frames: usize, max_frames: usize) -> Option<Vec<u8>> {
        if !self.state.is_running() {
            return None;
        }
        let mut io = MockOutput {
            format: &self.state.format,
            planar: self.state.planar,
            max_batch: self.state.max_batch,
            capacity: max_frames,
            buffer: Vec::new(),
            areas: Vec::new(),
            open: false,
            written: Vec::new(),
        };
        self.state.handler.lock().on_ready(&mut io, min_frames, max_frames);
        Some(io.written)
    }

    /// Reports a backend-side underflow to the handler.
    pub fn signal_underflow(&self) {
        self.state.handler.lock().on_underflow();
    }

    /// Reports a stream error to the handler.
    pub fn signal_error(&self, error: BackendError) {
        self.state.handler.lock().on_error(error);
    }

    /// Number of `clear_buffer` calls made on the stream.
    pub fn clear_count(&self) -> u64 {
        self.state.clears.load(Ordering::SeqCst)
    }

    /// Whether the stream was started and is neither paused nor disposed.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Whether the stream handle has been dropped.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}
