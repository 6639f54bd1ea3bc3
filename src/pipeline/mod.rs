//! Audio pipeline components.
//!
//! The duplex pipeline connects an input stream to an output stream via a
//! ring buffer:
//!
//! ```text
//! Capture callback → CaptureBridge → RingBuffer → PlaybackBridge → Playback callback
//! ```
//!
//! The recorder replaces the playback side with a drain task:
//!
//! ```text
//! Capture callback → CaptureBridge → RingBuffer → Drain Task → Sinks
//! ```
//!
//! - **Ring Buffer**: Lock-free SPSC byte queue; each side owns one cursor
//! - **Capture Bridge**: Input handler; never blocks, fills holes with silence
//! - **Playback Bridge**: Output handler; plays silence on underflow
//! - **Drain Task**: Empties the ring on a timer and fans out to sinks

mod capture;
mod drain;
mod playback;
mod ring_buffer;

pub use capture::CaptureBridge;
pub(crate) use drain::{DrainCommand, DrainTask};
pub use playback::PlaybackBridge;
pub use ring_buffer::{ReadPointer, RingBuffer, RingReader, RingWriter, WritePointer};
