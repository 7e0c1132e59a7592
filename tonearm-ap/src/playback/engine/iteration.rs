//! One pipeline iteration: create, drive until it ends, tear down

use super::core::{PipelineCommand, PlaybackEngine};
use crate::keepalive::BusyReason;
use crate::pipeline::{self, BusMessage, BusMessageKind, MediaPipeline, PipelineState};
use chrono::Utc;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tonearm_common::db::{history, playbacks, Playback, Track, TrackRef};
use tonearm_common::events::{Event, LastEvent, Topic};
use tracing::{debug, error, info, warn};

/// Item picked by the resolver, ready to play
#[derive(Debug, Clone)]
pub(super) struct Resolved {
    pub playback: Playback,
    pub track: Option<Track>,
    /// Resolved from the active playlist
    pub in_playlist: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// End of stream
    Ended,
    /// Stop command
    Stopped,
    /// Creation, state change or bus error; never recorded
    Failed,
}

impl PlaybackEngine {
    pub(super) async fn run_iteration(&self, item: Resolved) {
        let _busy = self.keepalive.hold(BusyReason::Streaming);
        let Resolved {
            playback,
            track,
            in_playlist,
        } = item;
        let uri = pipeline::uri_for(&playback.location);

        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        {
            // stop_all records its intent under this lock
            let mut commands = self.commands.lock().await;
            if self.status.read().await.last_event == LastEvent::StopAll {
                info!("Stopped during resolution, {} stays pending", playback.location);
                return;
            }
            *commands = Some(command_tx);
        }
        self.streaming.send_replace(true);

        // Consumed up front so a failing item is not retried forever
        if let Err(e) = playbacks::mark_played(&self.pool, playback.id).await {
            warn!("Failed to mark playback {} played: {}", playback.id, e);
        }

        let known_duration = track
            .as_ref()
            .and_then(|t| t.duration_ms)
            .and_then(|d| u64::try_from(d).ok());
        self.update_status(|status| {
            status.playback = Some(playback.clone());
            status.track = track.clone();
            status.in_playlist = in_playlist;
            status.position_ms = 0;
            status.duration_ms = known_duration;
            status.seekable = false;
            status.started = false;
        })
        .await;

        info!("Starting {}", uri);
        let (outcome, position_ms) = match self.factory.create(&uri) {
            Ok(mut pipeline) => {
                let outcome = self.drive(pipeline.as_mut(), &mut command_rx, &playback).await;
                self.commands.lock().await.take();

                let position_ms = match pipeline.position_ms() {
                    Some(position) => position,
                    None => self.status.read().await.position_ms,
                };
                if let Err(e) = pipeline.set_state(PipelineState::Null) {
                    warn!("Failed to tear down pipeline for {}: {}", uri, e);
                }
                (outcome, position_ms)
            }
            Err(e) => {
                error!("Failed to create pipeline for {}: {}", uri, e);
                self.commands.lock().await.take();
                (Outcome::Failed, 0)
            }
        };

        let started = self.status.read().await.started;
        let going_back = self.going_back.swap(false, Ordering::SeqCst);
        let frozen = self.freeze.load(Ordering::SeqCst);
        debug!(
            "{} finished: {:?} at {}ms (going back: {}, frozen: {})",
            uri, outcome, position_ms, going_back, frozen
        );
        if outcome != Outcome::Failed && started && !going_back && !frozen {
            self.record_play(&playback, position_ms).await;
        }

        self.update_status(|status| status.reset_stream()).await;
        self.streaming.send_replace(false);
    }

    async fn drive(
        &self,
        pipeline: &mut dyn MediaPipeline,
        commands: &mut mpsc::UnboundedReceiver<PipelineCommand>,
        playback: &Playback,
    ) -> Outcome {
        let Some(mut bus) = pipeline.take_bus() else {
            error!("Pipeline for {} has no bus", playback.location);
            return Outcome::Failed;
        };

        for state in [PipelineState::Ready, PipelineState::Playing] {
            if let Err(e) = pipeline.set_state(state) {
                error!("Failed to set {} on {}: {}", state, playback.location, e);
                return Outcome::Failed;
            }
        }

        let mut poll = interval(Duration::from_millis(self.settings.bus_poll_ms));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_progress = Instant::now();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(PipelineCommand::Stop) | None => return Outcome::Stopped,
                    Some(command) => self.apply_command(pipeline, command).await,
                },
                message = bus.recv() => match message {
                    Some(message) => {
                        if let Some(outcome) = self.on_bus_message(pipeline, message, playback).await {
                            return outcome;
                        }
                    }
                    None => {
                        error!("Pipeline bus for {} closed", playback.location);
                        return Outcome::Failed;
                    }
                },
                _ = poll.tick() => self.poll_position(pipeline, &mut last_progress).await,
            }
        }
    }

    async fn apply_command(&self, pipeline: &mut dyn MediaPipeline, command: PipelineCommand) {
        match command {
            PipelineCommand::Seek(position_ms) => {
                let (state, seekable) = {
                    let status = self.status.read().await;
                    (status.state, status.seekable)
                };
                if state != PipelineState::Playing || !seekable {
                    debug!("Seek ignored in state {} (seekable: {})", state, seekable);
                    return;
                }
                match pipeline.seek(position_ms) {
                    Ok(()) => {
                        self.update_status(|status| status.position_ms = position_ms)
                            .await
                    }
                    Err(e) => debug!("Seek to {}ms ignored: {}", position_ms, e),
                }
            }
            PipelineCommand::Pause => {
                if let Err(e) = pipeline.set_state(PipelineState::Paused) {
                    warn!("Pause failed: {}", e);
                }
            }
            PipelineCommand::Resume => {
                if let Err(e) = pipeline.set_state(PipelineState::Playing) {
                    warn!("Resume failed: {}", e);
                }
            }
            PipelineCommand::Stop => {}
        }
    }

    /// React to one bus message; `Some` ends the iteration
    async fn on_bus_message(
        &self,
        pipeline: &mut dyn MediaPipeline,
        message: BusMessage,
        playback: &Playback,
    ) -> Option<Outcome> {
        match message.kind {
            BusMessageKind::StateChanged { old, new } => {
                let first_play = new == PipelineState::Playing && !self.status.read().await.started;
                let seekable = first_play && pipeline.query_seekable().unwrap_or(false);
                let duration = pipeline.duration_ms();

                self.update_status(|status| {
                    status.previous_state = old;
                    status.state = new;
                    if first_play {
                        status.started = true;
                        status.seekable = seekable;
                        if duration.is_some() {
                            status.duration_ms = duration;
                        }
                    }
                })
                .await;

                if first_play && seekable && playback.skip_ms > 0 {
                    let skip = playback.skip_ms as u64;
                    match pipeline.seek(skip) {
                        Ok(()) => self.update_status(|status| status.position_ms = skip).await,
                        Err(e) => debug!("Skip to {}ms ignored: {}", skip, e),
                    }
                }
                None
            }
            BusMessageKind::Error(e) => {
                error!("Pipeline error on {}: {}", playback.location, e);
                Some(Outcome::Failed)
            }
            BusMessageKind::Warning(w) => {
                warn!("Pipeline warning on {}: {}", playback.location, w);
                None
            }
            BusMessageKind::Info(i) => {
                debug!("Pipeline info on {}: {}", playback.location, i);
                None
            }
            BusMessageKind::Eos => Some(Outcome::Ended),
            BusMessageKind::DurationChanged => {
                let duration = pipeline.duration_ms();
                self.update_status(|status| status.duration_ms = duration).await;
                None
            }
        }
    }

    /// Refresh cached position/duration and emit progress when due
    async fn poll_position(&self, pipeline: &mut dyn MediaPipeline, last_progress: &mut Instant) {
        let position = pipeline.position_ms();
        let duration = pipeline.duration_ms();
        let every = Duration::from_millis(self.settings.progress_interval_ms);

        let progress = {
            let mut status = self.status.write().await;
            if let Some(position) = position {
                status.position_ms = position;
            }
            if status.duration_ms.is_none() {
                status.duration_ms = duration;
            }

            let due = !every.is_zero() && last_progress.elapsed() >= every;
            match (&status.playback, status.state) {
                (Some(playback), PipelineState::Playing) if due => Some(Event::PlaybackProgress {
                    location: playback.location.clone(),
                    position_ms: status.position_ms,
                    duration_ms: status.duration_ms,
                    timestamp: Utc::now(),
                }),
                _ => None,
            }
        };

        if let Some(event) = progress {
            *last_progress = Instant::now();
            self.bus.emit(Topic::Playback, event);
        }
    }

    async fn record_play(&self, playback: &Playback, position_ms: u64) {
        let item = TrackRef {
            location: playback.location.clone(),
            track_id: playback.track_id,
        };
        let entry = match history::record(&self.pool, &item, position_ms as i64).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to record {} in history: {}", item.location, e);
                return;
            }
        };

        self.bus.emit(
            Topic::HistoryStore,
            Event::HistoryAppended {
                location: entry.location,
                track_id: entry.track_id,
                duration_played_ms: position_ms,
                timestamp: Utc::now(),
            },
        );
        if let Some(track_id) = entry.track_id {
            self.bus.emit(
                Topic::CollectionStore,
                Event::TrackUpdated {
                    track_id,
                    timestamp: Utc::now(),
                },
            );
        }
    }
}
