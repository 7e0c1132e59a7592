//! Commands and status probes
//!
//! Commands record intent in the status and, when a stream is running, send
//! it a request. They return whether the request applied; a request that does
//! not fit the current state is ignored rather than treated as an error.

use super::core::{PipelineCommand, PlaybackEngine};
use crate::playback::state::{Hint, PlaylistContext};
use crate::Result;
use std::sync::atomic::Ordering;
use tonearm_common::db::{playbacks, playlists, queues, Playback, TrackRef};
use tonearm_common::events::{LastEvent, PipelineState, PlaybackSnapshot};
use tracing::{debug, info};

impl PlaybackEngine {
    /// Play `items` ahead of the queue
    ///
    /// Forced: the first item replaces any pending playback, the rest go to
    /// the head of the queue, and the current stream is stopped. Otherwise the
    /// items are appended to the queue. No items means resume.
    pub async fn play(&self, force: bool, items: Vec<TrackRef>) -> Result<()> {
        let Some((first, rest)) = items.split_first() else {
            self.resume().await;
            return Ok(());
        };

        if force {
            playbacks::replace_pending(&self.pool, first, 0).await?;
            if !rest.is_empty() {
                queues::insert(&self.pool, self.perspective, 1, rest.to_vec()).await?;
                self.announce_queue(self.perspective).await;
            }

            let commands = self.commands.lock().await;
            self.going_back.store(false, Ordering::SeqCst);
            self.update_status(|status| {
                status.last_event = LastEvent::Play;
                status.hint = None;
            })
            .await;
            if let Some(tx) = commands.as_ref() {
                let _ = tx.send(PipelineCommand::Stop);
            }
            info!("Playing {} now", first.location);
        } else {
            queues::enqueue(&self.pool, self.perspective, items.clone()).await?;
            self.announce_queue(self.perspective).await;
            self.update_status(|status| status.last_event = LastEvent::Play)
                .await;
            debug!("Queued {} items", items.len());
        }

        self.wake();
        Ok(())
    }

    /// Resume a paused stream, or re-arm the worker after stop-all
    pub async fn resume(&self) -> bool {
        let commands = self.commands.lock().await;
        if let Some(tx) = commands.as_ref() {
            if self.status.read().await.state != PipelineState::Paused {
                return false;
            }
            self.update_status(|status| status.last_event = LastEvent::Play)
                .await;
            let _ = tx.send(PipelineCommand::Resume);
            return true;
        }
        drop(commands);

        let rearm = self.status.read().await.last_event == LastEvent::StopAll;
        if rearm {
            info!("Resuming after stop-all");
            self.update_status(|status| status.last_event = LastEvent::ResumeAll)
                .await;
        }
        self.wake();
        rearm
    }

    pub async fn pause(&self) -> bool {
        let commands = self.commands.lock().await;
        let Some(tx) = commands.as_ref() else {
            return false;
        };
        if self.status.read().await.state != PipelineState::Playing {
            return false;
        }
        self.update_status(|status| status.last_event = LastEvent::Pause)
            .await;
        let _ = tx.send(PipelineCommand::Pause);
        true
    }

    /// Seek the current stream; ignored unless playing a seekable stream
    pub async fn seek(&self, position_ms: u64) -> bool {
        let commands = self.commands.lock().await;
        let Some(tx) = commands.as_ref() else {
            return false;
        };
        let (state, seekable) = {
            let status = self.status.read().await;
            (status.state, status.seekable)
        };
        if state != PipelineState::Playing || !seekable {
            return false;
        }
        self.update_status(|status| status.last_event = LastEvent::Seek)
            .await;
        let _ = tx.send(PipelineCommand::Seek(position_ms));
        true
    }

    pub async fn next(&self) -> bool {
        let commands = self.commands.lock().await;
        let Some(tx) = commands.as_ref() else {
            return false;
        };
        self.going_back.store(false, Ordering::SeqCst);
        self.update_status(|status| {
            status.hint = status.in_playlist.then_some(Hint::NextInPlaylist);
            status.last_event = LastEvent::Next;
        })
        .await;
        let _ = tx.send(PipelineCommand::Stop);
        true
    }

    /// Go back, or restart the current stream once past the played threshold
    pub async fn previous(&self) -> bool {
        let commands = self.commands.lock().await;
        let Some(tx) = commands.as_ref() else {
            return false;
        };

        let (position_ms, in_playlist) = {
            let status = self.status.read().await;
            (status.position_ms, status.in_playlist)
        };
        if position_ms >= self.settings.played_threshold_ms {
            debug!("Previous at {}ms restarts the current stream", position_ms);
            self.update_status(|status| status.last_event = LastEvent::Seek)
                .await;
            let _ = tx.send(PipelineCommand::Seek(0));
            return true;
        }

        self.going_back.store(true, Ordering::SeqCst);
        self.update_status(|status| {
            status.hint = Some(if in_playlist {
                Hint::PreviousInPlaylist
            } else {
                Hint::PreviousInHistory
            });
            status.last_event = LastEvent::Previous;
        })
        .await;
        let _ = tx.send(PipelineCommand::Stop);
        true
    }

    /// End the current stream; the worker moves on
    pub async fn stop_stream(&self) -> bool {
        let commands = self.commands.lock().await;
        let Some(tx) = commands.as_ref() else {
            return false;
        };
        self.update_status(|status| {
            status.hint = None;
            status.last_event = LastEvent::StopStream;
        })
        .await;
        let _ = tx.send(PipelineCommand::Stop);
        true
    }

    /// End the current stream and idle until the next play or resume
    pub async fn stop_all(&self) -> bool {
        let commands = self.commands.lock().await;
        self.update_status(|status| {
            status.hint = None;
            status.last_event = LastEvent::StopAll;
        })
        .await;
        info!("Stop all");
        match commands.as_ref() {
            Some(tx) => tx.send(PipelineCommand::Stop).is_ok(),
            None => false,
        }
    }

    /// Start playing `playlist_id` at `position`
    pub async fn activate_playlist(&self, playlist_id: i64, position: i64) -> Result<()> {
        playlists::set_active(&self.pool, playlist_id, position).await?;
        self.announce_playlist(playlist_id);

        let commands = self.commands.lock().await;
        self.going_back.store(false, Ordering::SeqCst);
        self.update_status(|status| {
            status.playlist = Some(PlaylistContext {
                playlist_id,
                position,
            });
            status.hint = Some(Hint::ResumePlaylist);
            status.last_event = LastEvent::PlaybarActivate;
        })
        .await;
        if let Some(tx) = commands.as_ref() {
            let _ = tx.send(PipelineCommand::Stop);
        }
        drop(commands);

        info!("Playing playlist {} from position {}", playlist_id, position);
        self.wake();
        Ok(())
    }

    /// Stop driving playback from `playlist_id`
    ///
    /// Returns false when it was not the active playlist.
    pub async fn deactivate_playlist(&self, playlist_id: i64) -> Result<bool> {
        let commands = self.commands.lock().await;
        let (active, in_playlist) = {
            let status = self.status.read().await;
            (
                status.playlist.is_some_and(|ctx| ctx.playlist_id == playlist_id),
                status.in_playlist,
            )
        };
        playlists::clear_active(&self.pool, playlist_id).await?;
        if !active {
            return Ok(false);
        }

        self.update_status(|status| {
            status.playlist = None;
            status.hint = Some(Hint::StopPlaylist);
            if status.last_event != LastEvent::StopAll {
                status.last_event = LastEvent::PlaybarDeactivate;
            }
        })
        .await;
        if let (Some(tx), true) = (commands.as_ref(), in_playlist) {
            let _ = tx.send(PipelineCommand::Stop);
        }
        drop(commands);

        info!("Playlist {} deactivated", playlist_id);
        self.announce_playlist(playlist_id);
        Ok(true)
    }

    pub async fn state(&self) -> PipelineState {
        self.status.read().await.state
    }

    pub async fn snapshot(&self) -> PlaybackSnapshot {
        self.status.read().await.snapshot()
    }

    pub async fn playback(&self) -> Option<Playback> {
        self.status.read().await.playback.clone()
    }

    pub async fn active_playlist(&self) -> Option<PlaylistContext> {
        self.status.read().await.playlist
    }

    /// A pipeline iteration is running
    pub async fn is_streaming(&self) -> bool {
        self.commands.lock().await.is_some()
    }

    /// Something would play after the current stream
    pub async fn has_next(&self) -> Result<bool> {
        if playbacks::pending_count(&self.pool).await? > 0 {
            return Ok(true);
        }
        if queues::len(&self.pool, self.perspective).await? > 0 {
            return Ok(true);
        }
        let context = self.status.read().await.playlist;
        match context {
            Some(ctx) => Ok(playlists::track_at(&self.pool, ctx.playlist_id, ctx.position + 1)
                .await?
                .is_some()),
            None => Ok(false),
        }
    }
}
