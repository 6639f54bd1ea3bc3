//! Error types for duplex-audio.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`DuplexAudioError`]): Prevent a pipeline from starting
//! - **Recoverable events**: Runtime data loss (overflow, underflow, holes)
//!   surfaced via [`EventCallback`](crate::EventCallback) and counted in
//!   [`PipelineStats`](crate::PipelineStats)

use std::fmt;
use std::path::PathBuf;

use crate::backend::Direction;

/// Fatal errors that prevent an audio pipeline from starting.
///
/// These errors are returned from the `start()` methods of the builders and
/// from [`FormatNegotiator`](crate::FormatNegotiator). No retry is attempted
/// for any of them.
#[derive(Debug, thiserror::Error)]
pub enum DuplexAudioError {
    /// No sample format is supported by every device involved.
    #[error("no compatible sample format between devices")]
    NoCompatibleFormat,

    /// No sample rate is supported by every device involved.
    #[error("no compatible sample rate between devices")]
    NoCompatibleSampleRate,

    /// The devices share no channel layout.
    #[error("no compatible channel layout between devices")]
    NoCompatibleChannelLayout,

    /// The backend refused to open a stream.
    #[error("failed to open {direction} stream: {source}")]
    StreamOpenFailed {
        /// Which stream failed.
        direction: Direction,
        /// The backend error, surfaced verbatim.
        #[source]
        source: BackendError,
    },

    /// The backend refused to start an opened stream.
    #[error("failed to start {direction} stream: {source}")]
    StreamStartFailed {
        /// Which stream failed.
        direction: Direction,
        /// The backend error, surfaced verbatim.
        #[source]
        source: BackendError,
    },

    /// The requested device was not found.
    #[error("device not found: {id}")]
    DeviceNotFound {
        /// Identifier of the device that wasn't found.
        id: String,
    },

    /// The backend reports no default device for this direction.
    #[error("no default {direction} device configured")]
    NoDefaultDevice {
        /// Direction that has no default device.
        direction: Direction,
    },

    /// The device exists but the backend could not probe its capabilities.
    #[error("cannot probe device {name}: {source}")]
    DeviceProbeFailed {
        /// Name of the device.
        name: String,
        /// Probe error reported by the backend.
        #[source]
        source: BackendError,
    },

    /// The configuration is invalid.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// No sinks were configured before starting a recorder.
    #[error("no sinks configured - add at least one sink")]
    NoSinksConfigured,

    /// A sink failed during initialization.
    #[error("sink '{sink_name}' failed to start: {reason}")]
    SinkStartFailed {
        /// Name of the sink that failed.
        sink_name: String,
        /// Why the sink failed to start.
        reason: String,
    },

    /// Any other error from the audio backend.
    #[error("audio backend error: {0}")]
    Backend(#[from] BackendError),
}

impl DuplexAudioError {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Error codes reported by an audio backend.
///
/// The numeric values match the code table of the native audio library the
/// backend contract was modelled on, so codes can be surfaced verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    /// Out of memory.
    NoMem,
    /// The backend does not appear to be active or running.
    InitAudioBackend,
    /// A system resource other than memory was not available.
    SystemResources,
    /// Attempted to open a device and failed.
    OpeningDevice,
    /// The device does not exist.
    NoSuchDevice,
    /// The programmer did not comply with the API.
    Invalid,
    /// The requested backend is not available.
    BackendUnavailable,
    /// An open stream had an error that can only be recovered from by
    /// destroying the stream and creating it again.
    Streaming,
    /// Attempted to use a device with parameters it cannot support.
    IncompatibleDevice,
    /// The backend could not find a client it needs.
    NoSuchClient,
    /// Attempted to use parameters that the backend cannot support.
    IncompatibleBackend,
    /// The backend server shut down or became inactive.
    BackendDisconnected,
    /// The operation was interrupted.
    Interrupted,
    /// The output buffer underflowed.
    Underflow,
    /// Unable to convert to or from UTF-8 to the native string format.
    EncodingString,
}

impl BackendErrorKind {
    const ALL: [Self; 15] = [
        Self::NoMem,
        Self::InitAudioBackend,
        Self::SystemResources,
        Self::OpeningDevice,
        Self::NoSuchDevice,
        Self::Invalid,
        Self::BackendUnavailable,
        Self::Streaming,
        Self::IncompatibleDevice,
        Self::NoSuchClient,
        Self::IncompatibleBackend,
        Self::BackendDisconnected,
        Self::Interrupted,
        Self::Underflow,
        Self::EncodingString,
    ];

    /// Returns the numeric backend code (1-based, 0 means "no error").
    pub fn code(self) -> i32 {
        match self {
            Self::NoMem => 1,
            Self::InitAudioBackend => 2,
            Self::SystemResources => 3,
            Self::OpeningDevice => 4,
            Self::NoSuchDevice => 5,
            Self::Invalid => 6,
            Self::BackendUnavailable => 7,
            Self::Streaming => 8,
            Self::IncompatibleDevice => 9,
            Self::NoSuchClient => 10,
            Self::IncompatibleBackend => 11,
            Self::BackendDisconnected => 12,
            Self::Interrupted => 13,
            Self::Underflow => 14,
            Self::EncodingString => 15,
        }
    }

    /// Looks up a kind from its numeric backend code.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Short human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::NoMem => "out of memory",
            Self::InitAudioBackend => "unable to initialize audio backend",
            Self::SystemResources => "system resource not available",
            Self::OpeningDevice => "unable to open device",
            Self::NoSuchDevice => "no such device",
            Self::Invalid => "invalid value",
            Self::BackendUnavailable => "backend unavailable",
            Self::Streaming => "unrecoverable streaming failure",
            Self::IncompatibleDevice => "incompatible device",
            Self::NoSuchClient => "no such client",
            Self::IncompatibleBackend => "incompatible backend",
            Self::BackendDisconnected => "backend disconnected",
            Self::Interrupted => "interrupted; try again",
            Self::Underflow => "buffer underflow",
            Self::EncodingString => "failed to encode string",
        }
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// An error reported by the audio backend, carrying its code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} (code {code}){}", detail(.message))]
pub struct BackendError {
    kind: BackendErrorKind,
    code: i32,
    message: String,
}

fn detail(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

impl BackendError {
    /// Creates a backend error with an additional message.
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code(),
            message: message.into(),
        }
    }

    /// Creates a backend error with no message beyond the kind.
    pub fn from_kind(kind: BackendErrorKind) -> Self {
        Self::new(kind, String::new())
    }

    /// The error kind.
    pub fn kind(&self) -> BackendErrorKind {
        self.kind
    }

    /// The numeric backend code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Backend-specific detail, possibly empty.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<BackendErrorKind> for BackendError {
    fn from(kind: BackendErrorKind) -> Self {
        Self::from_kind(kind)
    }
}

/// Cursor violations on a [`RingBuffer`](crate::RingBuffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RingBufferError {
    /// Tried to write or advance the write cursor past the free space.
    #[error("ring buffer overflow: {requested} bytes requested, {available} free")]
    Overflow {
        /// Bytes the caller asked for.
        requested: usize,
        /// Bytes that were free.
        available: usize,
    },

    /// Tried to read or advance the read cursor past the filled space.
    #[error("ring buffer underflow: {requested} bytes requested, {available} filled")]
    Underflow {
        /// Bytes the caller asked for.
        requested: usize,
        /// Bytes that were readable.
        available: usize,
    },

    /// Tried to publish bytes that were never written through the write pointer.
    #[error("cannot advance write cursor by {requested} bytes: only {staged} bytes were written")]
    Unstaged {
        /// Bytes the caller asked to publish.
        requested: usize,
        /// Bytes written since the last advance.
        staged: usize,
    },
}

/// Errors that can occur within a [`Sink`](crate::Sink) implementation.
///
/// Sink errors are recoverable - the drain task emits a
/// [`StreamEvent::SinkError`](crate::StreamEvent::SinkError) and retries.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// A write operation failed.
    #[error("write failed: {reason}")]
    WriteFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// File I/O error.
    #[error("file error: {path}: {source}")]
    FileError {
        /// Path to the file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The sink cannot store audio in this sample format.
    #[error("unsupported sample format for this sink: {format}")]
    UnsupportedFormat {
        /// The rejected format.
        format: String,
    },

    /// The receiving channel was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// Custom error for user-implemented sinks.
    #[error("{0}")]
    Custom(String),
}

impl SinkError {
    /// Creates a custom sink error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a write failed error with the given reason.
    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }

    /// Creates a file error for the given path.
    pub fn file_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileError {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplex_error_display() {
        let err = DuplexAudioError::DeviceNotFound {
            id: "hw:1".to_string(),
        };
        assert_eq!(err.to_string(), "device not found: hw:1");
    }

    #[test]
    fn test_stream_open_failed_surfaces_backend_code() {
        let err = DuplexAudioError::StreamOpenFailed {
            direction: Direction::Input,
            source: BackendError::new(BackendErrorKind::OpeningDevice, "busy"),
        };
        let text = err.to_string();
        assert!(text.contains("input"));
        assert!(text.contains("code 4"));
        assert!(text.contains("busy"));
    }

    #[test]
    fn test_backend_code_table_roundtrips() {
        for code in 1..=15 {
            let kind = BackendErrorKind::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
        }
        assert_eq!(BackendErrorKind::from_code(0), None);
        assert_eq!(BackendErrorKind::from_code(16), None);
    }

    #[test]
    fn test_backend_error_without_message() {
        let err = BackendError::from_kind(BackendErrorKind::NoSuchDevice);
        assert_eq!(err.to_string(), "no such device (code 5)");
        assert_eq!(err.code(), 5);
        assert!(err.message().is_empty());
    }

    #[test]
    fn test_ring_buffer_error_display() {
        let err = RingBufferError::Overflow {
            requested: 32,
            available: 16,
        };
        assert_eq!(
            err.to_string(),
            "ring buffer overflow: 32 bytes requested, 16 free"
        );
    }

    #[test]
    fn test_sink_error_custom() {
        let err = SinkError::custom("something went wrong");
        assert_eq!(err.to_string(), "something went wrong");
    }

    #[test]
    fn test_sink_error_file_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = SinkError::file_error("/tmp/test.raw", io_err);
        assert!(err.to_string().contains("/tmp/test.raw"));
    }
}
