//! Headless pipeline
//!
//! Probes local files with symphonia for their duration and runs a real-time
//! clock instead of rendering audio. End of stream is posted when the clock
//! reaches the duration. Network streams have no duration, are not seekable
//! and never end on their own.

use super::{local_path, BusMessage, BusMessageKind, MediaPipeline, PipelineFactory, PipelineState};
use crate::{Error, Result};
use std::path::Path;
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

/// Creates [`HeadlessPipeline`]s
#[derive(Debug, Default, Clone)]
pub struct HeadlessFactory;

impl HeadlessFactory {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineFactory for HeadlessFactory {
    fn create(&self, uri: &str) -> Result<Box<dyn MediaPipeline>> {
        let duration_ms = match local_path(uri) {
            Some(path) => Some(probe_duration(Path::new(path))?),
            None => None,
        };
        Ok(Box::new(HeadlessPipeline::new(uri, duration_ms)))
    }
}

/// Read the container headers and compute the default track's duration
fn probe_duration(path: &Path) -> Result<u64> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::Pipeline(format!("Failed to open {}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Pipeline(format!("Failed to probe {}: {}", path.display(), e)))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Pipeline(format!("No audio track in {}", path.display())))?;

    let params = &track.codec_params;
    match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Ok(frames * 1000 / rate as u64),
        _ => Err(Error::Pipeline(format!("Unknown duration for {}", path.display()))),
    }
}

/// Position clock: accumulated time plus the running segment
#[derive(Debug, Default)]
struct Clock {
    base_ms: u64,
    running_since: Option<Instant>,
}

impl Clock {
    fn position_ms(&self) -> u64 {
        self.base_ms
            + self
                .running_since
                .map(|since| since.elapsed().as_millis() as u64)
                .unwrap_or(0)
    }

    fn start(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    fn stop(&mut self) {
        self.base_ms = self.position_ms();
        self.running_since = None;
    }

    fn set(&mut self, position_ms: u64) {
        self.base_ms = position_ms;
        if self.running_since.is_some() {
            self.running_since = Some(Instant::now());
        }
    }
}

pub struct HeadlessPipeline {
    uri: String,
    duration_ms: Option<u64>,
    state: PipelineState,
    clock: Clock,
    bus_tx: mpsc::UnboundedSender<BusMessage>,
    bus_rx: Option<mpsc::UnboundedReceiver<BusMessage>>,
    eos_timer: Option<JoinHandle<()>>,
}

impl HeadlessPipeline {
    pub fn new(uri: &str, duration_ms: Option<u64>) -> Self {
        let (bus_tx, bus_rx) = mpsc::unbounded_channel();
        Self {
            uri: uri.to_string(),
            duration_ms,
            state: PipelineState::Null,
            clock: Clock::default(),
            bus_tx,
            bus_rx: Some(bus_rx),
            eos_timer: None,
        }
    }

    fn post(&self, kind: BusMessageKind) {
        // Receiver gone means the iteration is over; nothing to report to
        let _ = self.bus_tx.send(BusMessage::now(kind));
    }

    fn clamped_position(&self) -> u64 {
        let position = self.clock.position_ms();
        match self.duration_ms {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn disarm(&mut self) {
        if let Some(timer) = self.eos_timer.take() {
            timer.abort();
        }
    }

    /// Schedule end of stream for the remaining duration
    fn arm(&mut self) {
        self.disarm();
        let Some(duration) = self.duration_ms else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to schedule end of stream for {}", self.uri);
            return;
        };

        let remaining = Duration::from_millis(duration.saturating_sub(self.clock.position_ms()));
        let tx = self.bus_tx.clone();
        self.eos_timer = Some(runtime.spawn(async move {
            tokio::time::sleep(remaining).await;
            let _ = tx.send(BusMessage::now(BusMessageKind::Eos));
        }));
    }
}

impl MediaPipeline for HeadlessPipeline {
    fn set_state(&mut self, state: PipelineState) -> Result<()> {
        if state == self.state {
            return Ok(());
        }

        let old = self.state;
        match state {
            PipelineState::Playing => {
                self.clock.start();
                self.arm();
            }
            PipelineState::Null => {
                self.disarm();
                self.clock = Clock::default();
            }
            PipelineState::Ready | PipelineState::Paused => {
                self.disarm();
                self.clock.stop();
            }
        }
        self.state = state;

        debug!("{}: {} -> {}", self.uri, old, state);
        self.post(BusMessageKind::StateChanged { old, new: state });
        Ok(())
    }

    fn seek(&mut self, position_ms: u64) -> Result<()> {
        let Some(duration) = self.duration_ms else {
            return Err(Error::Pipeline(format!("{} is not seekable", self.uri)));
        };
        if position_ms > duration {
            return Err(Error::Pipeline(format!(
                "Seek to {}ms past end ({}ms)",
                position_ms, duration
            )));
        }

        self.clock.set(position_ms);
        if self.state == PipelineState::Playing {
            self.arm();
        }
        Ok(())
    }

    fn send_eos(&mut self) -> Result<()> {
        self.disarm();
        self.post(BusMessageKind::Eos);
        Ok(())
    }

    fn position_ms(&self) -> Option<u64> {
        match self.state {
            PipelineState::Null => None,
            _ => Some(self.clamped_position()),
        }
    }

    fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    fn query_seekable(&self) -> Option<bool> {
        Some(self.duration_ms.is_some())
    }

    fn take_bus(&mut self) -> Option<mpsc::UnboundedReceiver<BusMessage>> {
        self.bus_rx.take()
    }
}

impl Drop for HeadlessPipeline {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_fails() {
        let result = HeadlessFactory::new().create("file:///nonexistent/tonearm/a.flac");
        assert!(matches!(result, Err(Error::Pipeline(_))));
    }

    #[test]
    fn test_garbage_file_fails_probe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let uri = format!("file://{}", path.display());
        assert!(matches!(HeadlessFactory::new().create(&uri), Err(Error::Pipeline(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_to_end_of_stream() {
        let mut pipeline = HeadlessPipeline::new("file:///a.flac", Some(2_000));
        let mut bus = pipeline.take_bus().unwrap();
        assert!(pipeline.take_bus().is_none());

        pipeline.set_state(PipelineState::Playing).unwrap();
        let changed = bus.recv().await.unwrap();
        assert_eq!(
            changed.kind,
            BusMessageKind::StateChanged {
                old: PipelineState::Null,
                new: PipelineState::Playing
            }
        );

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(pipeline.position_ms(), Some(500));

        let eos = bus.recv().await.unwrap();
        assert_eq!(eos.kind, BusMessageKind::Eos);
        assert_eq!(pipeline.position_ms(), Some(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_clock() {
        let mut pipeline = HeadlessPipeline::new("file:///a.flac", Some(10_000));
        pipeline.set_state(PipelineState::Playing).unwrap();
        tokio::time::advance(Duration::from_millis(300)).await;
        pipeline.set_state(PipelineState::Paused).unwrap();
        tokio::time::advance(Duration::from_millis(5_000)).await;
        assert_eq!(pipeline.position_ms(), Some(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek() {
        let mut pipeline = HeadlessPipeline::new("file:///a.flac", Some(10_000));
        pipeline.set_state(PipelineState::Playing).unwrap();
        pipeline.seek(4_000).unwrap();
        assert_eq!(pipeline.position_ms(), Some(4_000));
        assert!(pipeline.seek(20_000).is_err());
    }

    #[test]
    fn test_stream_is_not_seekable() {
        let mut pipeline = HeadlessFactory::new().create("http://radio.example/live").unwrap();
        assert_eq!(pipeline.query_seekable(), Some(false));
        assert!(pipeline.seek(0).is_err());
    }
}
