//! Core playback engine - lifecycle and the worker loop
//!
//! One worker task per engine resolves the next item, runs a pipeline
//! iteration for it and loops. Callers never touch the pipeline: they record
//! intent in [`EngineStatus`] and send commands to the running iteration.

use crate::keepalive::{BusyReason, KeepAlive};
use crate::pipeline::PipelineFactory;
use crate::playback::state::EngineStatus;
use crate::{Error, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration, Instant};
use tonearm_common::config::{Config, EngineSettings};
use tonearm_common::db::{queues, Perspective};
use tonearm_common::events::{Event, EventBus, Topic};
use tracing::{debug, error, info, warn};

/// Requests delivered to the running pipeline iteration
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum PipelineCommand {
    Stop,
    Seek(u64),
    Pause,
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum LoopSignal {
    /// Re-run resolution now instead of at the next idle tick
    Wake,
    Quit,
}

pub struct PlaybackEngine {
    pub(super) pool: SqlitePool,
    pub(super) bus: EventBus,
    pub(super) factory: Arc<dyn PipelineFactory>,
    pub(super) keepalive: KeepAlive,
    pub(super) settings: EngineSettings,
    /// Perspective whose queue feeds playback
    pub(super) perspective: Perspective,

    pub(super) status: RwLock<EngineStatus>,

    /// Suppresses history writes during shutdown
    pub(super) freeze: AtomicBool,
    /// A "previous" transition is in progress; its stop is not recorded
    pub(super) going_back: AtomicBool,

    /// Present only while an iteration runs
    pub(super) commands: Mutex<Option<mpsc::UnboundedSender<PipelineCommand>>>,
    /// True while an iteration runs
    pub(super) streaming: watch::Sender<bool>,

    signal_tx: mpsc::UnboundedSender<LoopSignal>,
    signal_rx: Mutex<Option<mpsc::UnboundedReceiver<LoopSignal>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackEngine {
    pub fn new(
        pool: SqlitePool,
        bus: EventBus,
        factory: Arc<dyn PipelineFactory>,
        keepalive: KeepAlive,
        config: &Config,
    ) -> Arc<Self> {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (streaming, _) = watch::channel(false);

        Arc::new(Self {
            pool,
            bus,
            factory,
            keepalive,
            settings: config.engine.clone(),
            perspective: config.perspective,
            status: RwLock::new(EngineStatus::default()),
            freeze: AtomicBool::new(false),
            going_back: AtomicBool::new(false),
            commands: Mutex::new(None),
            streaming,
            signal_tx,
            signal_rx: Mutex::new(Some(signal_rx)),
            worker: Mutex::new(None),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn perspective(&self) -> Perspective {
        self.perspective
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Spawn the worker loop
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let Some(signals) = self.signal_rx.lock().await.take() else {
            return Err(Error::InvalidState("Playback engine already started".to_string()));
        };

        let engine = Arc::clone(self);
        *self.worker.lock().await = Some(tokio::spawn(engine.run(signals)));
        info!("Playback engine started (perspective: {})", self.perspective);
        Ok(())
    }

    /// Stop playback and the worker
    ///
    /// Each wait is bounded by `shutdown_timeout_ms`; a timeout is logged and
    /// shutdown carries on.
    pub async fn shutdown(&self) {
        info!("Shutting down playback engine");
        self.freeze.store(true, Ordering::SeqCst);
        self.stop_all().await;

        let budget = Duration::from_millis(self.settings.shutdown_timeout_ms);
        let mut streaming = self.streaming.subscribe();
        let stopped = timeout(budget, streaming.wait_for(|active| !*active))
            .await
            .is_ok();
        if !stopped {
            warn!("Pipeline did not stop within {:?}", budget);
        }

        let _ = self.signal_tx.send(LoopSignal::Quit);

        let worker = self.worker.lock().await.take();
        if let Some(mut handle) = worker {
            match timeout(budget, &mut handle).await {
                Ok(Ok(())) => info!("Playback worker stopped"),
                Ok(Err(e)) => error!("Playback worker failed: {}", e),
                Err(_) => {
                    warn!("Playback worker did not stop within {:?}, aborting", budget);
                    handle.abort();
                }
            }
        }
    }

    /// Make the worker resolve right away
    pub fn wake(&self) {
        let _ = self.signal_tx.send(LoopSignal::Wake);
    }

    async fn run(self: Arc<Self>, mut signals: mpsc::UnboundedReceiver<LoopSignal>) {
        let tick = Duration::from_millis(self.settings.idle_tick_ms);
        let mut idle_since = Instant::now();
        debug!("Playback worker running");

        loop {
            loop {
                match signals.try_recv() {
                    Ok(LoopSignal::Wake) => {}
                    Ok(LoopSignal::Quit) | Err(TryRecvError::Disconnected) => return,
                    Err(TryRecvError::Empty) => break,
                }
            }

            let resolved = {
                let _busy = self.keepalive.hold(BusyReason::Resolving);
                self.resolve_next().await
            };
            match resolved {
                Ok(Some(item)) => {
                    self.run_iteration(item).await;
                    idle_since = Instant::now();
                    continue;
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to resolve next item: {}", e),
            }

            self.check_idle(&mut idle_since);
            match timeout(tick, signals.recv()).await {
                Ok(Some(LoopSignal::Quit)) | Ok(None) => return,
                Ok(Some(LoopSignal::Wake)) | Err(_) => {}
            }
        }
    }

    /// Ask for idle once nothing has played for `idle_timeout_secs`
    fn check_idle(&self, idle_since: &mut Instant) {
        if self.settings.idle_timeout_secs == 0 {
            return;
        }
        let limit = Duration::from_secs(self.settings.idle_timeout_secs);
        if idle_since.elapsed() >= limit && self.keepalive.request_idle() {
            *idle_since = Instant::now();
        }
    }

    /// Mutate the status and broadcast the resulting snapshot
    pub(super) async fn update_status<F>(&self, apply: F)
    where
        F: FnOnce(&mut EngineStatus),
    {
        let snapshot = {
            let mut status = self.status.write().await;
            apply(&mut status);
            status.snapshot()
        };
        self.bus.emit(
            Topic::Playback,
            Event::PlaybackChanged {
                snapshot,
                timestamp: Utc::now(),
            },
        );
    }

    /// Broadcast the current length of `perspective`'s queue
    pub async fn announce_queue(&self, perspective: Perspective) {
        match queues::len(&self.pool, perspective).await {
            Ok(length) => {
                self.bus.emit(
                    Topic::QueueStore,
                    Event::QueueChanged {
                        perspective,
                        length,
                        timestamp: Utc::now(),
                    },
                );
            }
            Err(e) => warn!("Failed to read {} queue length: {}", perspective, e),
        }
    }

    pub fn announce_playlist(&self, playlist_id: i64) {
        self.bus.emit(
            Topic::PlaylistStore,
            Event::PlaylistChanged {
                playlist_id,
                timestamp: Utc::now(),
            },
        );
    }
}
