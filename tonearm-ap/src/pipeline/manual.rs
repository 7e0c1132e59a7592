//! Externally driven pipeline
//!
//! Nothing advances on its own: the owner of a [`ManualHandle`] moves the
//! position, ends the stream or reports errors. Used by embedders that render
//! audio themselves and by the engine tests.

use super::{BusMessage, BusMessageKind, MediaPipeline, PipelineFactory, PipelineState};
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

struct Shared {
    uri: String,
    state: PipelineState,
    position_ms: u64,
    duration_ms: Option<u64>,
    seekable: Option<bool>,
    seeks: Vec<u64>,
    bus_tx: mpsc::UnboundedSender<BusMessage>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ManualPipeline {
    shared: Arc<Mutex<Shared>>,
    bus_rx: Option<mpsc::UnboundedReceiver<BusMessage>>,
}

impl MediaPipeline for ManualPipeline {
    fn set_state(&mut self, state: PipelineState) -> Result<()> {
        let mut shared = lock(&self.shared);
        if shared.state == state {
            return Ok(());
        }
        let old = shared.state;
        shared.state = state;
        if state == PipelineState::Null {
            shared.position_ms = 0;
        }
        let _ = shared
            .bus_tx
            .send(BusMessage::now(BusMessageKind::StateChanged { old, new: state }));
        Ok(())
    }

    fn seek(&mut self, position_ms: u64) -> Result<()> {
        let mut shared = lock(&self.shared);
        if shared.seekable != Some(true) {
            return Err(Error::Pipeline(format!("{} is not seekable", shared.uri)));
        }
        if shared.duration_ms.is_some_and(|duration| position_ms > duration) {
            return Err(Error::Pipeline(format!("Seek to {}ms past end", position_ms)));
        }
        shared.position_ms = position_ms;
        shared.seeks.push(position_ms);
        Ok(())
    }

    fn send_eos(&mut self) -> Result<()> {
        let _ = lock(&self.shared).bus_tx.send(BusMessage::now(BusMessageKind::Eos));
        Ok(())
    }

    fn position_ms(&self) -> Option<u64> {
        let shared = lock(&self.shared);
        match shared.state {
            PipelineState::Null => None,
            _ => Some(shared.position_ms),
        }
    }

    fn duration_ms(&self) -> Option<u64> {
        lock(&self.shared).duration_ms
    }

    fn query_seekable(&self) -> Option<bool> {
        lock(&self.shared).seekable
    }

    fn take_bus(&mut self) -> Option<mpsc::UnboundedReceiver<BusMessage>> {
        self.bus_rx.take()
    }
}

/// Remote control for one created pipeline
#[derive(Clone)]
pub struct ManualHandle {
    shared: Arc<Mutex<Shared>>,
}

impl ManualHandle {
    pub fn uri(&self) -> String {
        lock(&self.shared).uri.clone()
    }

    pub fn state(&self) -> PipelineState {
        lock(&self.shared).state
    }

    pub fn position_ms(&self) -> u64 {
        lock(&self.shared).position_ms
    }

    pub fn set_position(&self, position_ms: u64) {
        lock(&self.shared).position_ms = position_ms;
    }

    /// Seeks the engine performed, in order
    pub fn seeks(&self) -> Vec<u64> {
        lock(&self.shared).seeks.clone()
    }

    /// Change the duration and announce it on the bus
    pub fn set_duration(&self, duration_ms: Option<u64>) {
        lock(&self.shared).duration_ms = duration_ms;
        self.post(BusMessageKind::DurationChanged);
    }

    pub fn post(&self, kind: BusMessageKind) {
        let _ = lock(&self.shared).bus_tx.send(BusMessage::now(kind));
    }

    /// Play through to the end of the stream
    pub fn finish(&self) {
        {
            let mut shared = lock(&self.shared);
            if let Some(duration) = shared.duration_ms {
                shared.position_ms = duration;
            }
        }
        self.post(BusMessageKind::Eos);
    }

    pub fn fail(&self, message: &str) {
        self.post(BusMessageKind::Error(message.to_string()));
    }
}

struct FactorySettings {
    duration_ms: Option<u64>,
    seekable: Option<bool>,
    failing: HashSet<String>,
}

/// Creates [`ManualPipeline`]s and hands their handles to a [`ManualControl`]
pub struct ManualFactory {
    settings: Arc<Mutex<FactorySettings>>,
    created_tx: mpsc::UnboundedSender<ManualHandle>,
}

impl ManualFactory {
    pub fn new() -> (Self, ManualControl) {
        let settings = Arc::new(Mutex::new(FactorySettings {
            duration_ms: Some(180_000),
            seekable: Some(true),
            failing: HashSet::new(),
        }));
        let (created_tx, created_rx) = mpsc::unbounded_channel();

        let control = ManualControl {
            settings: Arc::clone(&settings),
            created_rx,
        };
        (Self { settings, created_tx }, control)
    }
}

impl PipelineFactory for ManualFactory {
    fn create(&self, uri: &str) -> Result<Box<dyn MediaPipeline>> {
        let settings = self.settings.lock().unwrap_or_else(|p| p.into_inner());
        if settings.failing.contains(uri) {
            return Err(Error::Pipeline(format!("Cannot create pipeline for {}", uri)));
        }

        let (bus_tx, bus_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared {
            uri: uri.to_string(),
            state: PipelineState::Null,
            position_ms: 0,
            duration_ms: settings.duration_ms,
            seekable: settings.seekable,
            seeks: Vec::new(),
            bus_tx,
        }));

        let _ = self.created_tx.send(ManualHandle {
            shared: Arc::clone(&shared),
        });
        Ok(Box::new(ManualPipeline {
            shared,
            bus_rx: Some(bus_rx),
        }))
    }
}

/// Receives handles of created pipelines and tunes future ones
pub struct ManualControl {
    settings: Arc<Mutex<FactorySettings>>,
    created_rx: mpsc::UnboundedReceiver<ManualHandle>,
}

impl ManualControl {
    /// Wait for the next pipeline the engine creates
    pub async fn next_pipeline(&mut self) -> Option<ManualHandle> {
        self.created_rx.recv().await
    }

    pub fn try_next_pipeline(&mut self) -> Option<ManualHandle> {
        self.created_rx.try_recv().ok()
    }

    /// Make creation fail for `uri`
    pub fn fail_create(&self, uri: &str) {
        self.settings
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .failing
            .insert(uri.to_string());
    }

    pub fn set_duration(&self, duration_ms: Option<u64>) {
        self.settings.lock().unwrap_or_else(|p| p.into_inner()).duration_ms = duration_ms;
    }

    pub fn set_seekable(&self, seekable: Option<bool>) {
        self.settings.lock().unwrap_or_else(|p| p.into_inner()).seekable = seekable;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_drives_pipeline() {
        let (factory, mut control) = ManualFactory::new();
        let mut pipeline = factory.create("file:///a.flac").unwrap();
        let mut bus = pipeline.take_bus().unwrap();
        let handle = control.next_pipeline().await.unwrap();
        assert_eq!(handle.uri(), "file:///a.flac");

        pipeline.set_state(PipelineState::Playing).unwrap();
        assert_eq!(handle.state(), PipelineState::Playing);
        assert!(matches!(
            bus.recv().await.unwrap().kind,
            BusMessageKind::StateChanged { new: PipelineState::Playing, .. }
        ));

        handle.set_position(1_500);
        assert_eq!(pipeline.position_ms(), Some(1_500));

        handle.finish();
        assert_eq!(bus.recv().await.unwrap().kind, BusMessageKind::Eos);
        assert_eq!(pipeline.position_ms(), Some(180_000));
    }

    #[test]
    fn test_failing_uri() {
        let (factory, control) = ManualFactory::new();
        control.fail_create("file:///bad.mp3");
        assert!(factory.create("file:///bad.mp3").is_err());
        assert!(factory.create("file:///good.mp3").is_ok());
    }

    #[test]
    fn test_unseekable() {
        let (factory, control) = ManualFactory::new();
        control.set_seekable(None);
        let mut pipeline = factory.create("http://radio.example/live").unwrap();
        assert_eq!(pipeline.query_seekable(), None);
        assert!(pipeline.seek(0).is_err());
    }
}
