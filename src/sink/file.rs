//! Raw PCM and WAV file sink implementation.

use crate::format::{SampleFormat, StreamFormat};
use crate::sink::Sink;
use crate::{CapturedChunk, SinkError};
use async_trait::async_trait;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

// WAV file format constants
// See: http://soundfile.sapp.org/doc/WaveFormat/

/// Byte offset of the file size field in WAV header (RIFF chunk size).
const WAV_FILE_SIZE_OFFSET: u64 = 4;

/// Byte offset of the data chunk size field in WAV header.
const WAV_DATA_SIZE_OFFSET: u64 = 40;

/// Size of the WAV header in bytes (RIFF + fmt + data chunk headers).
const WAV_HEADER_SIZE: usize = 44;

/// Size of the fmt chunk data (16 bytes for PCM).
const WAV_FMT_CHUNK_SIZE: u32 = 16;

/// Audio format code for integer PCM.
const WAV_FORMAT_PCM: u16 = 1;

/// Audio format code for IEEE float.
const WAV_FORMAT_IEEE_FLOAT: u16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Raw,
    Wav,
}

/// A sink that writes captured audio to a file.
///
/// Two containers are supported:
///
/// - [`FileSink::raw`]: interleaved frames written verbatim, any sample format
/// - [`FileSink::wav`]: RIFF/WAVE with a 44-byte header; accepts `u8`,
///   `s16le`, `s32le`, `f32le` and `f64le`
///
/// The file is created on first write and, for WAV, finalized (header
/// updated) on `on_stop()`. All file I/O is performed in a blocking thread
/// pool to avoid blocking the async runtime.
///
/// # Example
///
/// ```no_run
/// use duplex_audio::FileSink;
///
/// let sink = FileSink::wav("recording.wav");
/// // Use with the recorder builder...
/// ```
pub struct FileSink {
    name: String,
    container: Container,
    path: Arc<PathBuf>,
    state: Arc<Mutex<FileState>>,
}

struct FileState {
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl FileSink {
    /// Creates a new file sink that writes WAV format.
    pub fn wav(path: impl AsRef<Path>) -> Self {
        Self::with_container(path, Container::Wav)
    }

    /// Creates a new file sink that writes headerless interleaved samples.
    pub fn raw(path: impl AsRef<Path>) -> Self {
        Self::with_container(path, Container::Raw)
    }

    fn with_container(path: impl AsRef<Path>, container: Container) -> Self {
        Self {
            name: format!("file:{}", path.as_ref().display()),
            container,
            path: Arc::new(path.as_ref().to_path_buf()),
            state: Arc::new(Mutex::new(FileState {
                writer: None,
                bytes_written: 0,
            })),
        }
    }

    /// Returns the path this sink writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush buffered data to disk.
    ///
    /// This is useful for ensuring data is persisted during long recordings.
    /// Note: This does NOT update the WAV header - that happens on `on_stop()`.
    pub async fn flush(&self) -> Result<(), SinkError> {
        let state = Arc::clone(&self.state);
        let path = Arc::clone(&self.path);

        tokio::task::spawn_blocking(move || {
            let mut state = state.blocking_lock();
            if let Some(ref mut writer) = state.writer {
                writer
                    .flush()
                    .map_err(|e| SinkError::file_error(&*path, e))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| SinkError::custom(format!("flush task panicked: {e}")))?
    }

    /// WAV format code for a sample format, or `None` if WAV cannot carry it.
    fn wav_format_code(format: SampleFormat) -> Option<u16> {
        match format {
            SampleFormat::U8 | SampleFormat::S16Le | SampleFormat::S32Le => Some(WAV_FORMAT_PCM),
            SampleFormat::Float32Le | SampleFormat::Float64Le => Some(WAV_FORMAT_IEEE_FLOAT),
            _ => None,
        }
    }

    /// Writes a complete WAV header for `format`.
    fn write_wav_header(
        writer: &mut BufWriter<File>,
        format: &StreamFormat,
        data_size: u32,
    ) -> std::io::Result<()> {
        let format_code =
            Self::wav_format_code(format.sample_format).unwrap_or(WAV_FORMAT_PCM);
        let channels = format.channel_count() as u16;
        let bytes_per_sample = format.bytes_per_sample() as u16;

        // RIFF container header
        writer.write_all(b"RIFF")?;
        let file_size = WAV_HEADER_SIZE as u32 - 8 + data_size;
        writer.write_all(&file_size.to_le_bytes())?;
        writer.write_all(b"WAVE")?;

        // fmt subchunk
        writer.write_all(b"fmt ")?;
        writer.write_all(&WAV_FMT_CHUNK_SIZE.to_le_bytes())?;
        writer.write_all(&format_code.to_le_bytes())?;
        writer.write_all(&channels.to_le_bytes())?;
        writer.write_all(&format.sample_rate.to_le_bytes())?;

        let byte_rate = format.sample_rate * u32::from(channels) * u32::from(bytes_per_sample);
        writer.write_all(&byte_rate.to_le_bytes())?;

        let block_align = channels * bytes_per_sample;
        writer.write_all(&block_align.to_le_bytes())?;
        writer.write_all(&(bytes_per_sample * 8).to_le_bytes())?;

        // data subchunk header
        writer.write_all(b"data")?;
        writer.write_all(&data_size.to_le_bytes())?;

        Ok(())
    }

    /// Updates the WAV header with the final data size after recording.
    fn update_wav_header(writer: &mut BufWriter<File>, data_size: u32) -> std::io::Result<()> {
        let file_size = WAV_HEADER_SIZE as u32 - 8 + data_size;
        writer.seek(SeekFrom::Start(WAV_FILE_SIZE_OFFSET))?;
        writer.write_all(&file_size.to_le_bytes())?;

        writer.seek(SeekFrom::Start(WAV_DATA_SIZE_OFFSET))?;
        writer.write_all(&data_size.to_le_bytes())?;

        writer.seek(SeekFrom::End(0))?;

        Ok(())
    }

    fn write_blocking(
        state: &mut FileState,
        container: Container,
        path: &Path,
        chunk: &CapturedChunk,
    ) -> Result<(), SinkError> {
        // Initialize on first write
        if state.writer.is_none() {
            let file = File::create(path).map_err(|e| SinkError::file_error(path, e))?;
            let mut writer = BufWriter::new(file);

            if container == Container::Wav {
                // Placeholder sizes, patched on stop
                Self::write_wav_header(&mut writer, &chunk.format, 0)
                    .map_err(|e| SinkError::file_error(path, e))?;
            }

            state.writer = Some(writer);
        }

        if let Some(ref mut writer) = state.writer {
            writer
                .write_all(&chunk.data)
                .map_err(|e| SinkError::file_error(path, e))?;
            state.bytes_written += chunk.data.len() as u64;
        }

        Ok(())
    }

    fn finalize_blocking(
        state: &mut FileState,
        container: Container,
        path: &Path,
    ) -> Result<(), SinkError> {
        if let Some(ref mut writer) = state.writer {
            if container == Container::Wav {
                let data_size = u32::try_from(state.bytes_written).unwrap_or(u32::MAX);
                Self::update_wav_header(writer, data_size)
                    .map_err(|e| SinkError::file_error(path, e))?;
            }

            writer.flush().map_err(|e| SinkError::file_error(path, e))?;
        }

        state.writer = None;
        Ok(())
    }
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_start(&self, format: &StreamFormat) -> Result<(), SinkError> {
        if self.container == Container::Wav && Self::wav_format_code(format.sample_format).is_none()
        {
            return Err(SinkError::UnsupportedFormat {
                format: format.sample_format.to_string(),
            });
        }
        Ok(())
    }

    async fn write(&self, chunk: &CapturedChunk) -> Result<(), SinkError> {
        let state = Arc::clone(&self.state);
        let path = Arc::clone(&self.path);
        let container = self.container;
        let chunk = chunk.clone();

        tokio::task::spawn_blocking(move || {
            let mut state = state.blocking_lock();
            Self::write_blocking(&mut state, container, &path, &chunk)
        })
        .await
        .map_err(|e| SinkError::custom(format!("write task panicked: {e}")))?
    }

    async fn on_stop(&self) -> Result<(), SinkError> {
        let state = Arc::clone(&self.state);
        let path = Arc::clone(&self.path);
        let container = self.container;

        tokio::task::spawn_blocking(move || {
            let mut state = state.blocking_lock();
            Self::finalize_blocking(&mut state, container, &path)
        })
        .await
        .map_err(|e| SinkError::custom(format!("finalize task panicked: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ChannelLayout;
    use std::time::Duration;
    use tempfile::tempdir;

    fn chunk(format: &StreamFormat, data: Vec<u8>) -> CapturedChunk {
        CapturedChunk::new(data, Duration::ZERO, format.clone())
    }

    fn mono_s16() -> StreamFormat {
        StreamFormat::new(SampleFormat::S16Le, 16000, ChannelLayout::mono())
    }

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    #[tokio::test]
    async fn test_wav_header_and_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wav");
        let sink = FileSink::wav(&path);
        let format = mono_s16();

        sink.on_start(&format).await.unwrap();
        sink.write(&chunk(&format, vec![1, 0, 2, 0, 3, 0])).await.unwrap();
        sink.on_stop().await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), WAV_HEADER_SIZE + 6);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u16_at(&bytes, 20), WAV_FORMAT_PCM);
        assert_eq!(u16_at(&bytes, 22), 1); // channels
        assert_eq!(u32_at(&bytes, 24), 16000); // sample rate
        assert_eq!(u32_at(&bytes, 28), 32000); // byte rate
        assert_eq!(u16_at(&bytes, 32), 2); // block align
        assert_eq!(u16_at(&bytes, 34), 16); // bits per sample
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32_at(&bytes, 40), 6);
        assert_eq!(u32_at(&bytes, 4), 36 + 6);
        assert_eq!(&bytes[44..], &[1, 0, 2, 0, 3, 0]);
    }

    #[tokio::test]
    async fn test_wav_float_stereo_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let sink = FileSink::wav(&path);
        let format = StreamFormat::new(SampleFormat::Float32Le, 48000, ChannelLayout::stereo());

        sink.on_start(&format).await.unwrap();
        sink.write(&chunk(&format, vec![0; 16])).await.unwrap();
        sink.on_stop().await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(u16_at(&bytes, 20), WAV_FORMAT_IEEE_FLOAT);
        assert_eq!(u16_at(&bytes, 22), 2);
        assert_eq!(u32_at(&bytes, 28), 48000 * 8);
        assert_eq!(u16_at(&bytes, 32), 8);
        assert_eq!(u16_at(&bytes, 34), 32);
        assert_eq!(u32_at(&bytes, 40), 16);
    }

    #[tokio::test]
    async fn test_wav_rejects_big_endian() {
        let dir = tempdir().unwrap();
        let sink = FileSink::wav(dir.path().join("be.wav"));
        let format = StreamFormat::new(SampleFormat::S16Be, 44100, ChannelLayout::stereo());

        let result = sink.on_start(&format).await;
        assert!(matches!(result, Err(SinkError::UnsupportedFormat { .. })));
    }

    #[tokio::test]
    async fn test_raw_accepts_any_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capture.raw");
        let sink = FileSink::raw(&path);
        let format = StreamFormat::new(SampleFormat::S24Be, 44100, ChannelLayout::mono());

        sink.on_start(&format).await.unwrap();
        sink.write(&chunk(&format, vec![9, 8, 7, 6])).await.unwrap();
        sink.write(&chunk(&format, vec![5, 4, 3, 2])).await.unwrap();
        sink.on_stop().await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, vec![9, 8, 7, 6, 5, 4, 3, 2]);
    }

    #[tokio::test]
    async fn test_multiple_chunks_data_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("multi.wav");
        let sink = FileSink::wav(&path);
        let format = mono_s16();

        for _ in 0..3 {
            sink.write(&chunk(&format, vec![0; 100])).await.unwrap();
        }
        sink.flush().await.unwrap();
        sink.on_stop().await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(u32_at(&bytes, 40), 300);
        assert_eq!(bytes.len(), WAV_HEADER_SIZE + 300);
    }

    #[tokio::test]
    async fn test_invalid_path_error() {
        let sink = FileSink::wav("/nonexistent/dir/test.wav");
        let result = sink.write(&chunk(&mono_s16(), vec![0; 2])).await;

        let err = result.unwrap_err();
        assert!(matches!(err, SinkError::FileError { .. }));
        assert!(err.to_string().contains("nonexistent"));
    }

    #[tokio::test]
    async fn test_stop_without_write_creates_no_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        let sink = FileSink::wav(&path);

        sink.on_stop().await.unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn test_name_includes_path() {
        let sink = FileSink::raw("/tmp/out.raw");
        assert_eq!(sink.name(), "file:/tmp/out.raw");
        assert_eq!(sink.path(), Path::new("/tmp/out.raw"));
    }
}
