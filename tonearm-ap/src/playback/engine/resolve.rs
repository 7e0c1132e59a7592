//! Resolution of the next item to play
//!
//! Order: history request, stop-all idle, pending playback, playlist hint,
//! head of the queue, continuation of the active playlist. A playlist hint met
//! while a playback is pending is kept for the resolution after it.

use super::core::PlaybackEngine;
use super::iteration::Resolved;
use crate::playback::state::{Hint, PlaylistContext};
use crate::Result;
use tonearm_common::db::{history, playbacks, playlists, queues, tracks, Playback, Track, TrackRef};
use tonearm_common::events::LastEvent;
use tracing::{debug, info};

impl PlaybackEngine {
    pub(super) async fn resolve_next(&self) -> Result<Option<Resolved>> {
        let (hint, last_event, last_location, cursor) = {
            let mut status = self.status.write().await;
            (
                status.hint.take(),
                status.last_event,
                status.last_location.clone(),
                status.history_cursor,
            )
        };

        if hint == Some(Hint::PreviousInHistory) {
            if let Some(item) = self.resolve_from_history(cursor, last_location.as_deref()).await? {
                return Ok(Some(item));
            }
        }

        if last_event == LastEvent::StopAll {
            return Ok(None);
        }

        // A forced play outranks playlist steps, which wait for the next pass
        if let Some(playback) = playbacks::next_pending(&self.pool).await? {
            {
                let mut status = self.status.write().await;
                status.history_cursor = None;
                if let Some(hint) = hint.filter(|h| *h != Hint::PreviousInHistory) {
                    debug!("Deferring {:?} behind pending playback {}", hint, playback.id);
                    status.hint.get_or_insert(hint);
                }
            }
            return self.resolved(playback, false).await.map(Some);
        }

        let resolved = self.resolve_forward(hint).await?;
        if resolved.is_some() {
            self.status.write().await.history_cursor = None;
        }
        Ok(resolved)
    }

    /// Step back through history, skipping the location that just played
    ///
    /// With no older entry the current location is played again.
    async fn resolve_from_history(
        &self,
        cursor: Option<i64>,
        current: Option<&str>,
    ) -> Result<Option<Resolved>> {
        let (item, cursor) = match history::previous_before(&self.pool, cursor, current).await? {
            Some(entry) => (
                TrackRef {
                    location: entry.location,
                    track_id: entry.track_id,
                },
                Some(entry.id),
            ),
            None => match current {
                Some(location) => {
                    let track = tracks::find_by_location(&self.pool, location).await?;
                    (
                        TrackRef {
                            location: location.to_string(),
                            track_id: track.map(|t| t.id),
                        },
                        cursor,
                    )
                }
                None => return Ok(None),
            },
        };

        debug!("Going back to {}", item.location);
        let playback = playbacks::replace_pending(&self.pool, &item, 0).await?;
        self.status.write().await.history_cursor = cursor;
        self.resolved(playback, false).await.map(Some)
    }

    async fn resolve_forward(&self, hint: Option<Hint>) -> Result<Option<Resolved>> {
        let context = self.status.read().await.playlist;

        match (hint, context) {
            (Some(Hint::NextInPlaylist), Some(ctx)) => {
                if let Some(item) = self.resolve_from_playlist(ctx.playlist_id, ctx.position + 1).await? {
                    return Ok(Some(item));
                }
            }
            (Some(Hint::PreviousInPlaylist), Some(ctx)) => {
                let position = (ctx.position - 1).max(1);
                if let Some(item) = self.resolve_from_playlist(ctx.playlist_id, position).await? {
                    return Ok(Some(item));
                }
            }
            (Some(Hint::ResumePlaylist), Some(ctx)) => {
                if let Some(item) = self.resolve_from_playlist(ctx.playlist_id, ctx.position).await? {
                    return Ok(Some(item));
                }
            }
            (Some(Hint::StopPlaylist), Some(ctx)) => self.leave_playlist(ctx.playlist_id).await?,
            _ => {}
        }

        if let Some(playback) = playbacks::next_pending(&self.pool).await? {
            return self.resolved(playback, false).await.map(Some);
        }

        if let Some(playback) = queues::pop_into_pending(&self.pool, self.perspective).await? {
            self.announce_queue(self.perspective).await;
            return self.resolved(playback, false).await.map(Some);
        }

        // Re-read: a hint above may have ended the playlist
        let context = self.status.read().await.playlist;
        if let Some(ctx) = context {
            return self.resolve_from_playlist(ctx.playlist_id, ctx.position + 1).await;
        }

        Ok(None)
    }

    /// Pend the playlist entry at `position`, or leave the playlist past its end
    async fn resolve_from_playlist(&self, playlist_id: i64, position: i64) -> Result<Option<Resolved>> {
        let Some(entry) = playlists::track_at(&self.pool, playlist_id, position).await? else {
            self.leave_playlist(playlist_id).await?;
            return Ok(None);
        };

        let playback = playbacks::create(&self.pool, &entry.track_ref(), 0).await?;
        playlists::set_active(&self.pool, playlist_id, position).await?;
        self.status.write().await.playlist = Some(PlaylistContext {
            playlist_id,
            position,
        });
        self.announce_playlist(playlist_id);

        self.resolved(playback, true).await.map(Some)
    }

    pub(super) async fn leave_playlist(&self, playlist_id: i64) -> Result<()> {
        {
            let mut status = self.status.write().await;
            if status.playlist.is_some_and(|ctx| ctx.playlist_id == playlist_id) {
                status.playlist = None;
            }
        }
        playlists::clear_active(&self.pool, playlist_id).await?;
        info!("Left playlist {}", playlist_id);
        self.announce_playlist(playlist_id);
        Ok(())
    }

    async fn resolved(&self, playback: Playback, in_playlist: bool) -> Result<Resolved> {
        let track: Option<Track> = match playback.track_id {
            Some(id) => tracks::get(&self.pool, id).await?,
            None => None,
        };
        Ok(Resolved {
            playback,
            track,
            in_playlist,
        })
    }
}
