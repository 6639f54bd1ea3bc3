//! # duplex-audio
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Realtime duplex audio: route a capture device straight into a playback
//! device with bounded, configurable latency.
//!
//! `duplex-audio` negotiates a format both devices support, connects the two
//! streams through a lock-free ring buffer, and keeps running through data
//! loss: holes become silence, overflow drops the newest frames, underflow
//! plays silence. Every such event is counted and reported, never fatal.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use duplex_audio::{CpalBackend, DuplexAudio, StreamEvent};
//! use std::time::Duration;
//!
//! let session = DuplexAudio::builder()
//!     .latency(Duration::from_millis(200))
//!     .on_event(|e| tracing::warn!(?e, "stream event"))
//!     .start(&CpalBackend::new())?;
//!
//! std::thread::sleep(Duration::from_secs(10));
//! println!("{:?}", session.stats());
//! session.stop()?;
//! ```
//!
//! The same capture side can feed sinks instead of a speaker:
//!
//! ```rust,ignore
//! use duplex_audio::{CpalBackend, DuplexAudio, FileSink};
//!
//! let session = DuplexAudio::recorder()
//!     .add_sink(FileSink::wav("meeting.wav"))
//!     .start(&CpalBackend::new())
//!     .await?;
//!
//! tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//! session.stop().await?;
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Backend threads**: Realtime callbacks that never block or allocate
//! - **Ring Buffer**: Lock-free SPSC byte queue between capture and playback
//! - **Tokio Runtime**: Recorder drain task fans out to all registered sinks
//!
//! Backends are abstracted behind [`backend::AudioBackend`]. [`CpalBackend`]
//! talks to the system's audio hosts; [`MockBackend`] drives the pipeline
//! deterministically for tests.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod backend;
mod builder;
mod chunk;
mod config;
mod error;
mod event;
pub mod format;
pub mod pipeline;
mod recorder;
mod session;
mod sink;
mod tone;

pub use backend::{
    available_backends, list_devices, AudioBackend, CpalBackend, DeviceInfo, DeviceListing,
    Direction, MockBackend, SampleRateRange,
};
pub use builder::{DuplexAudio, DuplexAudioBuilder};
pub use chunk::CapturedChunk;
pub use config::{DeviceSelection, PipelineConfig, RecorderConfig};
pub use error::{BackendError, BackendErrorKind, DuplexAudioError, RingBufferError, SinkError};
pub use event::{event_callback, EventCallback, EventOrigin, StreamEvent};
pub use format::{ChannelId, ChannelLayout, FormatNegotiator, SampleFormat, StreamFormat};
pub use pipeline::RingBuffer;
pub use recorder::{RecorderBuilder, RecordingSession};
pub use session::{PipelineStats, Session};
pub use sink::{ChannelSink, FileSink, Sink};
pub use tone::{ToneBuilder, ToneGenerator, TonePlayer, TONE_FORMATS};
