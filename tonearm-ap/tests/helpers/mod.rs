//! Test helpers for tonearm-ap integration tests
//!
//! Builds an engine on an in-memory database with a manually driven pipeline
//! and fast ticks.

#![allow(dead_code)]

use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tonearm_ap::pipeline::{ManualControl, ManualFactory, ManualHandle};
use tonearm_ap::{KeepAlive, PlaybackEngine, Player};
use tonearm_common::config::Config;
use tonearm_common::db::{self, history, PlaybackHistory};
use tonearm_common::events::{EventBus, PipelineState, PlaybackSnapshot};

const WAIT: Duration = Duration::from_secs(3);

pub struct Harness {
    pub player: Player,
    pub engine: Arc<PlaybackEngine>,
    pub control: ManualControl,
    pub keepalive: KeepAlive,
    pub pool: SqlitePool,
}

pub async fn harness() -> Harness {
    harness_with(|_| {}).await
}

pub async fn harness_with(tune: impl FnOnce(&mut Config)) -> Harness {
    let pool = db::memory_pool().await.unwrap();

    let mut config = Config::default();
    config.engine.idle_tick_ms = 20;
    config.engine.bus_poll_ms = 10;
    config.engine.progress_interval_ms = 50;
    config.engine.shutdown_timeout_ms = 1000;
    tune(&mut config);

    let (factory, control) = ManualFactory::new();
    let keepalive = KeepAlive::new();
    let engine = PlaybackEngine::new(
        pool.clone(),
        EventBus::new(),
        Arc::new(factory),
        keepalive.clone(),
        &config,
    );
    engine.start().await.unwrap();

    Harness {
        player: Player::new(Arc::clone(&engine)),
        engine,
        control,
        keepalive,
        pool,
    }
}

pub fn locations(paths: &[&str]) -> Vec<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

pub fn uri(path: &str) -> String {
    format!("file://{}", path)
}

impl Harness {
    /// Next pipeline the engine creates
    pub async fn next_pipeline(&mut self) -> ManualHandle {
        timeout(WAIT, self.control.next_pipeline())
            .await
            .expect("engine did not create a pipeline")
            .expect("factory dropped")
    }

    /// Next pipeline, once it is playing
    pub async fn next_playing(&mut self) -> ManualHandle {
        let handle = self.next_pipeline().await;
        self.wait_for("playing", |s| s.state == PipelineState::Playing).await;
        handle
    }

    /// Assert no pipeline gets created for a while
    pub async fn assert_no_pipeline(&mut self) {
        sleep(Duration::from_millis(150)).await;
        if let Some(handle) = self.control.try_next_pipeline() {
            panic!("unexpected pipeline for {}", handle.uri());
        }
    }

    pub async fn wait_for<F>(&self, what: &str, check: F) -> PlaybackSnapshot
    where
        F: Fn(&PlaybackSnapshot) -> bool,
    {
        let deadline = Instant::now() + WAIT;
        loop {
            let snapshot = self.player.get_state().await;
            if check(&snapshot) {
                return snapshot;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {}: {:?}", what, snapshot);
            sleep(Duration::from_millis(5)).await;
        }
    }

    /// Wait until the iteration is gone and its status torn down
    pub async fn wait_until_stopped(&self) {
        let deadline = Instant::now() + WAIT;
        while self.player.is_streaming().await || self.player.get_playback().await.is_some() {
            assert!(Instant::now() < deadline, "stream did not stop");
            sleep(Duration::from_millis(5)).await;
        }
    }

    /// History, oldest first
    pub async fn history(&self) -> Vec<PlaybackHistory> {
        let mut entries = history::recent(&self.pool, 100).await.unwrap();
        entries.reverse();
        entries
    }

    pub async fn wait_for_history(&self, count: usize) -> Vec<PlaybackHistory> {
        let deadline = Instant::now() + WAIT;
        loop {
            let entries = self.history().await;
            if entries.len() >= count {
                return entries;
            }
            assert!(Instant::now() < deadline, "history has {} entries, wanted {}", entries.len(), count);
            sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn history_locations(&self) -> Vec<String> {
        self.history().await.into_iter().map(|h| h.location).collect()
    }
}
