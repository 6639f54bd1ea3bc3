//! Tokio mpsc channel sink implementation.

use crate::sink::Sink;
use crate::{CapturedChunk, SinkError};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A sink that sends captured chunks to a tokio mpsc channel.
///
/// # Example
///
/// ```
/// use duplex_audio::{CapturedChunk, ChannelSink};
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel::<CapturedChunk>(100);
/// let sink = ChannelSink::new(tx);
///
/// // Use sink with the recorder builder...
/// // Then receive chunks:
/// // while let Some(chunk) = rx.recv().await { ... }
/// ```
pub struct ChannelSink {
    name: String,
    sender: mpsc::Sender<CapturedChunk>,
}

impl ChannelSink {
    /// Creates a new channel sink with the given sender.
    pub fn new(sender: mpsc::Sender<CapturedChunk>) -> Self {
        Self::with_name("channel", sender)
    }

    /// Creates a new channel sink with a custom name.
    pub fn with_name(name: impl Into<String>, sender: mpsc::Sender<CapturedChunk>) -> Self {
        Self {
            name: name.into(),
            sender,
        }
    }
}

#[async_trait]
impl Sink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, chunk: &CapturedChunk) -> Result<(), SinkError> {
        self.sender
            .send(chunk.clone())
            .await
            .map_err(|_| SinkError::ChannelClosed)
    }
}
