//! Drain task that empties the ring buffer into sinks.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::RecorderConfig;
use crate::event::{emit, EventCallback, StreamEvent};
use crate::format::StreamFormat;
use crate::pipeline::RingReader;
use crate::session::PipelineState;
use crate::sink::Sink;
use crate::{CapturedChunk, DuplexAudioError};

/// Command sent to the drain task.
pub(crate) enum DrainCommand {
    /// Drain what is left, stop the sinks and exit.
    Stop,
}

/// Periodically moves whole frames out of the ring buffer and fans them
/// out to all sinks.
pub(crate) struct DrainTask {
    reader: RingReader,
    fanout: Fanout,
    frames_drained: u64,
}

/// The sink side of the drain task. Kept apart from the reader so sink
/// futures only borrow shareable state.
struct Fanout {
    format: StreamFormat,
    sinks: Vec<Arc<dyn Sink>>,
    config: RecorderConfig,
    state: Arc<PipelineState>,
    on_event: Option<EventCallback>,
}

impl DrainTask {
    pub fn new(
        reader: RingReader,
        format: StreamFormat,
        sinks: Vec<Arc<dyn Sink>>,
        config: RecorderConfig,
        state: Arc<PipelineState>,
        on_event: Option<EventCallback>,
    ) -> Self {
        Self {
            reader,
            fanout: Fanout {
                format,
                sinks,
                config,
                state,
                on_event,
            },
            frames_drained: 0,
        }
    }

    /// Starts all sinks.
    ///
    /// Returns an error if any sink fails to start.
    pub async fn start_sinks(&self) -> Result<(), DuplexAudioError> {
        self.fanout.start_sinks().await
    }

    /// Takes every whole frame currently buffered as one chunk.
    fn take_chunk(&mut self) -> Option<CapturedChunk> {
        let format = &self.fanout.format;
        let bpf = format.bytes_per_frame();
        let available = self.reader.fill_count();
        let aligned = available - available % bpf;
        if aligned == 0 {
            return None;
        }

        let data = self.reader.read_to_vec(aligned);
        let timestamp = format.duration_of(self.frames_drained as usize);
        self.frames_drained += (data.len() / bpf) as u64;
        Some(CapturedChunk::new(data, timestamp, format.clone()))
    }

    async fn drain_once(&mut self) {
        if let Some(chunk) = self.take_chunk() {
            debug!(frames = chunk.frame_count(), "Draining captured audio");
            self.fanout.write_chunk(&chunk).await;
        }
    }

    /// Runs the task until a [`DrainCommand::Stop`] arrives or the command
    /// channel closes, then drains the remainder and stops the sinks.
    pub async fn run(mut self, mut cmd_rx: mpsc::Receiver<DrainCommand>) {
        let period = self.fanout.config.drain_interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.drain_once().await;
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(DrainCommand::Stop) | None => {
                            self.drain_once().await;
                            break;
                        }
                    }
                }
            }
        }

        self.fanout.stop_sinks().await;
        info!(frames = self.frames_drained, "Drain task finished");
    }
}

impl Fanout {
    /// Starts the sinks in order. If one fails, the sinks already started
    /// are stopped again.
    async fn start_sinks(&self) -> Result<(), DuplexAudioError> {
        for (started, sink) in self.sinks.iter().enumerate() {
            if let Err(e) = sink.on_start(&self.format).await {
                for sink in &self.sinks[..started] {
                    let _ = sink.on_stop().await;
                }
                return Err(DuplexAudioError::SinkStartFailed {
                    sink_name: sink.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Stops all sinks.
    async fn stop_sinks(&self) {
        for sink in &self.sinks {
            if let Err(e) = sink.on_stop().await {
                emit(
                    self.on_event.as_ref(),
                    StreamEvent::SinkError {
                        sink_name: sink.name().to_string(),
                        error: format!("Error during shutdown: {e}"),
                    },
                );
            }
        }
    }

    /// Writes a chunk to a single sink with retry logic.
    async fn write_to_sink(&self, sink: &Arc<dyn Sink>, chunk: &CapturedChunk) {
        let mut attempts = 0;
        let mut delay = self.config.sink_retry_delay;

        loop {
            match sink.write(chunk).await {
                Ok(()) => return,
                Err(e) => {
                    attempts += 1;
                    emit(
                        self.on_event.as_ref(),
                        StreamEvent::SinkError {
                            sink_name: sink.name().to_string(),
                            error: e.to_string(),
                        },
                    );

                    if attempts >= self.config.sink_retry_attempts {
                        // Max retries reached, give up on this chunk
                        return;
                    }

                    // Exponential backoff
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    /// Writes a chunk to all sinks concurrently.
    async fn write_chunk(&self, chunk: &CapturedChunk) {
        let futures: Vec<_> = self
            .sinks
            .iter()
            .map(|sink| self.write_to_sink(sink, chunk))
            .collect();

        futures::future::join_all(futures).await;
        self.state.chunks_processed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ChannelLayout, SampleFormat};
    use crate::pipeline::RingBuffer;
    use crate::SinkError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Mutex;

    struct TestSink {
        name: String,
        chunks: Mutex<Vec<CapturedChunk>>,
        fail_count: AtomicUsize,
        stopped: AtomicUsize,
    }

    impl TestSink {
        fn new(name: &str) -> Self {
            Self::failing(name, 0)
        }

        fn failing(name: &str, fail_times: usize) -> Self {
            Self {
                name: name.to_string(),
                chunks: Mutex::new(Vec::new()),
                fail_count: AtomicUsize::new(fail_times),
                stopped: AtomicUsize::new(0),
            }
        }

        async fn bytes(&self) -> Vec<u8> {
            let chunks = self.chunks.lock().await;
            chunks.iter().flat_map(|c| c.data.iter().copied()).collect()
        }
    }

    #[async_trait]
    impl Sink for TestSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&self, chunk: &CapturedChunk) -> Result<(), SinkError> {
            let remaining = self.fail_count.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_count.fetch_sub(1, Ordering::SeqCst);
                return Err(SinkError::custom("intentional failure"));
            }
            self.chunks.lock().await.push(chunk.clone());
            Ok(())
        }

        async fn on_stop(&self) -> Result<(), SinkError> {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn stereo_s16() -> StreamFormat {
        StreamFormat::new(SampleFormat::S16Le, 8000, ChannelLayout::stereo())
    }

    fn fast_config() -> RecorderConfig {
        RecorderConfig {
            drain_interval: Duration::from_millis(5),
            sink_retry_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    fn task(sinks: Vec<Arc<dyn Sink>>) -> (DrainTask, crate::pipeline::RingWriter) {
        let (writer, reader) = RingBuffer::with_capacity(256).split();
        let task = DrainTask::new(
            reader,
            stereo_s16(),
            sinks,
            fast_config(),
            Arc::new(PipelineState::new()),
            None,
        );
        (task, writer)
    }

    #[tokio::test]
    async fn test_take_chunk_keeps_partial_frame() {
        let (mut task, mut writer) = task(vec![]);
        writer.write(&[1, 2, 3, 4, 5, 6]).unwrap();

        let chunk = task.take_chunk().unwrap();
        assert_eq!(*chunk.data, vec![1, 2, 3, 4]);
        assert_eq!(chunk.timestamp, Duration::ZERO);
        assert_eq!(task.reader.fill_count(), 2);

        writer.write(&[7, 8]).unwrap();
        let chunk = task.take_chunk().unwrap();
        assert_eq!(*chunk.data, vec![5, 6, 7, 8]);
        // One frame already drained.
        assert_eq!(chunk.timestamp, stereo_s16().duration_of(1));
        assert!(task.take_chunk().is_none());
    }

    #[tokio::test]
    async fn test_writes_to_all_sinks() {
        let sink1 = Arc::new(TestSink::new("sink1"));
        let sink2 = Arc::new(TestSink::new("sink2"));
        let (mut task, mut writer) = task(vec![sink1.clone(), sink2.clone()]);

        writer.write(&[9; 8]).unwrap();
        task.drain_once().await;

        assert_eq!(sink1.bytes().await, vec![9; 8]);
        assert_eq!(sink2.bytes().await, vec![9; 8]);
        assert_eq!(task.fanout.state.snapshot().chunks_processed, 1);
    }

    #[tokio::test]
    async fn test_retries_on_failure() {
        let sink = Arc::new(TestSink::failing("sink", 2)); // Fail twice, then succeed
        let (mut task, mut writer) = task(vec![sink.clone()]);

        writer.write(&[1; 4]).unwrap();
        task.drain_once().await;

        assert_eq!(sink.bytes().await, vec![1; 4]);
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_attempts() {
        let sink = Arc::new(TestSink::failing("sink", 10));
        let (mut task, mut writer) = task(vec![sink.clone()]);

        writer.write(&[1; 4]).unwrap();
        task.drain_once().await;

        assert!(sink.bytes().await.is_empty());
        assert_eq!(sink.fail_count.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_run_drains_remainder_on_stop() {
        let sink = Arc::new(TestSink::new("sink"));
        let (task, mut writer) = task(vec![sink.clone()]);
        let (cmd_tx, cmd_rx) = mpsc::channel(1);

        writer.write(&[3; 16]).unwrap();
        cmd_tx.send(DrainCommand::Stop).await.unwrap();
        task.run(cmd_rx).await;

        assert_eq!(sink.bytes().await, vec![3; 16]);
        assert_eq!(sink.stopped.load(Ordering::SeqCst), 1);
    }

    struct RefusingSink;

    #[async_trait]
    impl Sink for RefusingSink {
        fn name(&self) -> &str {
            "refusing"
        }

        async fn on_start(&self, _format: &StreamFormat) -> Result<(), SinkError> {
            Err(SinkError::custom("no disk"))
        }

        async fn write(&self, _chunk: &CapturedChunk) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_start_failure_stops_started_sinks() {
        let first = Arc::new(TestSink::new("first"));
        let last = Arc::new(TestSink::new("last"));
        let (task, _writer) = task(vec![first.clone(), Arc::new(RefusingSink), last.clone()]);

        let result = task.start_sinks().await;
        match result {
            Err(DuplexAudioError::SinkStartFailed { sink_name, reason }) => {
                assert_eq!(sink_name, "refusing");
                assert!(reason.contains("no disk"));
            }
            other => panic!("expected SinkStartFailed, got {other:?}"),
        }
        assert_eq!(first.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(last.stopped.load(Ordering::SeqCst), 0);
    }
}
