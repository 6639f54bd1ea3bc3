//! Sink trait and implementations for recorded audio.
//!
//! A [`Sink`] is any destination that can receive captured chunks from a
//! [`RecordingSession`](crate::RecordingSession). The crate provides two
//! built-in sinks:
//!
//! - [`ChannelSink`]: Sends chunks to a tokio mpsc channel
//! - [`FileSink`]: Writes chunks to a raw PCM or WAV file
//!
//! You can implement the [`Sink`] trait for custom destinations like
//! network endpoints or audio processors.

mod channel;
mod file;

pub use channel::ChannelSink;
pub use file::FileSink;

use crate::format::StreamFormat;
use crate::{CapturedChunk, SinkError};
use async_trait::async_trait;

/// A destination for recorded audio.
///
/// Sinks receive chunks from the recorder's drain task and process them
/// (write to file, send over network, forward to channel, etc.).
///
/// # Implementation Notes
///
/// - Methods take `&self` - use interior mutability (`Mutex`, `RwLock`) if needed
/// - All methods are async and run on the tokio runtime
/// - `on_start` is called with the negotiated format before any audio flows
/// - `on_stop` is called during graceful shutdown; close resources here
///
/// # Example
///
/// ```
/// use duplex_audio::{CapturedChunk, Sink, SinkError};
/// use async_trait::async_trait;
///
/// struct PrintSink {
///     name: String,
/// }
///
/// #[async_trait]
/// impl Sink for PrintSink {
///     fn name(&self) -> &str {
///         &self.name
///     }
///
///     async fn write(&self, chunk: &CapturedChunk) -> Result<(), SinkError> {
///         println!("Received {} frames", chunk.frame_count());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Sink: Send + Sync {
    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Called once before capture begins, with the format every chunk will
    /// have.
    ///
    /// Errors here are fatal and prevent the recorder from starting.
    ///
    /// Default implementation does nothing.
    async fn on_start(&self, format: &StreamFormat) -> Result<(), SinkError> {
        let _ = format;
        Ok(())
    }

    /// Write a chunk of captured audio.
    ///
    /// Errors are recoverable - the drain task will emit a
    /// [`StreamEvent::SinkError`] and retry based on [`RecorderConfig`]
    /// settings.
    ///
    /// [`StreamEvent::SinkError`]: crate::StreamEvent::SinkError
    /// [`RecorderConfig`]: crate::RecorderConfig
    async fn write(&self, chunk: &CapturedChunk) -> Result<(), SinkError>;

    /// Called during graceful shutdown, after the last chunk.
    ///
    /// Default implementation does nothing.
    async fn on_stop(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ChannelLayout, SampleFormat};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingSink {
        name: String,
        count: AtomicUsize,
    }

    impl CountingSink {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                count: AtomicUsize::new(0),
            }
        }

        fn count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Sink for CountingSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&self, _chunk: &CapturedChunk) -> Result<(), SinkError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_lifecycle() {
        let sink = CountingSink::new("test");
        let format = StreamFormat::new(SampleFormat::S16Le, 16000, ChannelLayout::mono());

        sink.on_start(&format).await.unwrap();

        let chunk = CapturedChunk::new(vec![0; 200], Duration::ZERO, format);
        sink.write(&chunk).await.unwrap();
        sink.write(&chunk).await.unwrap();

        assert_eq!(sink.count(), 2);

        sink.on_stop().await.unwrap();
    }

    #[test]
    fn test_sink_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<dyn Sink>>();
    }
}
