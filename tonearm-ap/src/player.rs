//! Player facade
//!
//! The seam transports and remote-control adapters call through. Requests are
//! validated here and rejected synchronously; everything past validation is
//! handed to the engine, whose own failures are logged rather than returned.
//! Store mutations broadcast on their topic once they have been committed.

use crate::pipeline;
use crate::playback::PlaybackEngine;
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tonearm_common::db::{
    history, playlists, queues, tracks, Perspective, Playback, PlaybackHistory, Playlist,
    PlaylistTrack, QueueTrack, TrackRef,
};
use tonearm_common::events::{PipelineState, PlaybackSnapshot, SubscriberId, Subscription, Topic};

/// Local file types the player accepts
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "oga", "opus", "m4a", "mp4", "aac", "wav"];

/// Reject empty locations and local files of unsupported type
///
/// Returns the location with surrounding whitespace removed.
pub fn validate_location(location: &str) -> Result<&str> {
    let location = location.trim();
    if location.is_empty() {
        return Err(Error::InvalidRequest("Empty location".to_string()));
    }
    if location.starts_with("http://") || location.starts_with("https://") {
        return Ok(location);
    }

    let path = pipeline::local_path(location)
        .ok_or_else(|| Error::InvalidRequest(format!("Unsupported scheme: {}", location)))?;
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => Ok(location),
        _ => Err(Error::InvalidRequest(format!("Unsupported file type: {}", location))),
    }
}

fn require_position(position: i64) -> Result<()> {
    if position < 1 {
        return Err(Error::InvalidRequest(format!(
            "Position must be positive, got {}",
            position
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct Player {
    engine: Arc<PlaybackEngine>,
}

impl Player {
    pub fn new(engine: Arc<PlaybackEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<PlaybackEngine> {
        &self.engine
    }

    /// Validate and resolve locations and track ids, in that order
    async fn track_refs(&self, locations: &[String], ids: &[i64]) -> Result<Vec<TrackRef>> {
        let pool = self.engine.pool();
        let mut items = Vec::with_capacity(locations.len() + ids.len());

        let locations = locations
            .iter()
            .map(|location| validate_location(location))
            .collect::<Result<Vec<_>>>()?;
        for location in locations {
            let track = tracks::find_by_location(pool, location).await?;
            items.push(TrackRef {
                location: location.to_string(),
                track_id: track.map(|t| t.id),
            });
        }
        for &id in ids {
            match tracks::get(pool, id).await? {
                Some(track) => items.push(TrackRef::track(&track)),
                None => return Err(Error::NotFound(format!("Track {}", id))),
            }
        }
        Ok(items)
    }

    async fn require_playlist(&self, playlist_id: i64) -> Result<Playlist> {
        playlists::get(self.engine.pool(), playlist_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Playlist {}", playlist_id)))
    }

    // Playback commands

    pub async fn next_stream(&self) -> bool {
        self.engine.next().await
    }

    pub async fn previous_stream(&self) -> bool {
        self.engine.previous().await
    }

    /// `off = true` turns pause off (resumes), `false` pauses
    pub async fn pause_stream(&self, off: bool) -> bool {
        if off {
            self.engine.resume().await
        } else {
            self.engine.pause().await
        }
    }

    pub async fn play_streams(&self, force: bool, locations: &[String], ids: &[i64]) -> Result<()> {
        let items = self.track_refs(locations, ids).await?;
        self.engine.play(force, items).await
    }

    /// Unsupported or out-of-range seeks are ignored, not errors
    pub async fn seek_in_stream(&self, position_ms: i64) -> Result<bool> {
        let position_ms = u64::try_from(position_ms)
            .map_err(|_| Error::InvalidRequest(format!("Negative seek position {}", position_ms)))?;
        Ok(self.engine.seek(position_ms).await)
    }

    pub async fn stop_all(&self) -> bool {
        self.engine.stop_all().await
    }

    pub async fn stop_stream(&self) -> bool {
        self.engine.stop_stream().await
    }

    /// Play the entry at `position` of a playbar playlist
    pub async fn try_playing_from_bar(&self, playlist_id: i64, position: i64) -> Result<()> {
        require_position(position)?;
        self.require_playlist(playlist_id).await?;
        if playlists::track_at(self.engine.pool(), playlist_id, position)
            .await?
            .is_none()
        {
            return Err(Error::InvalidRequest(format!(
                "Playlist {} has no entry at position {}",
                playlist_id, position
            )));
        }
        self.engine.activate_playlist(playlist_id, position).await
    }

    pub async fn quit_playing_from_bar(&self, playlist_id: i64) -> Result<bool> {
        self.require_playlist(playlist_id).await?;
        self.engine.deactivate_playlist(playlist_id).await
    }

    // Status probes

    pub async fn is_playing(&self) -> bool {
        self.engine.state().await == PipelineState::Playing
    }

    pub async fn is_paused(&self) -> bool {
        self.engine.state().await == PipelineState::Paused
    }

    pub async fn is_ready(&self) -> bool {
        self.engine.state().await == PipelineState::Ready
    }

    pub async fn is_streaming(&self) -> bool {
        self.engine.is_streaming().await
    }

    pub async fn is_stopped(&self) -> bool {
        self.engine.state().await == PipelineState::Null
    }

    pub async fn has_next_stream(&self) -> Result<bool> {
        self.engine.has_next().await
    }

    pub async fn get_playback(&self) -> Option<Playback> {
        self.engine.playback().await
    }

    pub async fn get_state(&self) -> PlaybackSnapshot {
        self.engine.snapshot().await
    }

    // Subscriptions

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.engine.bus().subscribe(topic)
    }

    /// Ask subscriber `id` to end its stream
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.engine.bus().unsubscribe_request(id)
    }

    // Queue

    pub async fn queue_list(&self, perspective: Perspective) -> Result<Vec<QueueTrack>> {
        Ok(queues::list(self.engine.pool(), perspective).await?)
    }

    pub async fn enqueue(
        &self,
        perspective: Perspective,
        locations: &[String],
        ids: &[i64],
    ) -> Result<Vec<QueueTrack>> {
        let items = self.track_refs(locations, ids).await?;
        let queue = queues::enqueue(self.engine.pool(), perspective, items).await?;
        self.queue_changed(perspective).await;
        Ok(queue)
    }

    pub async fn queue_insert(
        &self,
        perspective: Perspective,
        position: i64,
        locations: &[String],
        ids: &[i64],
    ) -> Result<Vec<QueueTrack>> {
        require_position(position)?;
        let items = self.track_refs(locations, ids).await?;
        let queue = queues::insert(self.engine.pool(), perspective, position, items).await?;
        self.queue_changed(perspective).await;
        Ok(queue)
    }

    pub async fn queue_remove(&self, perspective: Perspective, position: i64) -> Result<Option<QueueTrack>> {
        require_position(position)?;
        let removed = queues::remove_at(self.engine.pool(), perspective, position).await?;
        if removed.is_some() {
            self.queue_changed(perspective).await;
        }
        Ok(removed)
    }

    pub async fn queue_move(
        &self,
        perspective: Perspective,
        to: i64,
        from: i64,
    ) -> Result<Vec<QueueTrack>> {
        require_position(to)?;
        require_position(from)?;
        let queue = queues::move_entry(self.engine.pool(), perspective, to, from).await?;
        self.queue_changed(perspective).await;
        Ok(queue)
    }

    pub async fn queue_clear(&self, perspective: Perspective) -> Result<u64> {
        let cleared = queues::clear(self.engine.pool(), perspective).await?;
        self.queue_changed(perspective).await;
        Ok(cleared)
    }

    async fn queue_changed(&self, perspective: Perspective) {
        self.engine.announce_queue(perspective).await;
        if perspective == self.engine.perspective() {
            self.engine.wake();
        }
    }

    // Playlists

    pub async fn list_playlists(&self, perspective: Perspective) -> Result<Vec<Playlist>> {
        Ok(playlists::list(self.engine.pool(), perspective).await?)
    }

    pub async fn create_playlist(&self, name: &str, perspective: Perspective) -> Result<Playlist> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidRequest("Empty playlist name".to_string()));
        }
        let playlist = playlists::create(self.engine.pool(), name, perspective).await?;
        self.engine.announce_playlist(playlist.id);
        Ok(playlist)
    }

    /// Show a playlist in its perspective's playbar
    pub async fn open_playlist(&self, playlist_id: i64) -> Result<Playlist> {
        self.require_playlist(playlist_id).await?;
        let playlist = playlists::open(self.engine.pool(), playlist_id).await?;
        self.engine.announce_playlist(playlist_id);
        Ok(playlist)
    }

    /// Remove a playlist from the playbar, dropping its dynamic entries
    pub async fn close_playlist(&self, playlist_id: i64) -> Result<Playlist> {
        self.require_playlist(playlist_id).await?;
        self.engine.deactivate_playlist(playlist_id).await?;
        let playlist = playlists::close(self.engine.pool(), playlist_id).await?;
        self.engine.announce_playlist(playlist_id);
        Ok(playlist)
    }

    pub async fn playlist_tracks(&self, playlist_id: i64) -> Result<Vec<PlaylistTrack>> {
        self.require_playlist(playlist_id).await?;
        Ok(playlists::tracks(self.engine.pool(), playlist_id).await?)
    }

    /// Append entries; dynamic ones disappear when the playlist is closed
    pub async fn playlist_add(
        &self,
        playlist_id: i64,
        locations: &[String],
        ids: &[i64],
        dynamic: bool,
    ) -> Result<Vec<PlaylistTrack>> {
        self.require_playlist(playlist_id).await?;
        let items = self.track_refs(locations, ids).await?;
        let list = playlists::add(self.engine.pool(), playlist_id, items, dynamic).await?;
        self.engine.announce_playlist(playlist_id);
        Ok(list)
    }

    pub async fn playlist_insert(
        &self,
        playlist_id: i64,
        position: i64,
        locations: &[String],
        ids: &[i64],
    ) -> Result<Vec<PlaylistTrack>> {
        require_position(position)?;
        self.require_playlist(playlist_id).await?;
        let items = self.track_refs(locations, ids).await?;
        let list = playlists::insert(self.engine.pool(), playlist_id, position, items, false).await?;
        self.engine.announce_playlist(playlist_id);
        Ok(list)
    }

    pub async fn playlist_remove(&self, playlist_id: i64, position: i64) -> Result<Option<PlaylistTrack>> {
        require_position(position)?;
        self.require_playlist(playlist_id).await?;
        let removed = playlists::remove_at(self.engine.pool(), playlist_id, position).await?;
        if removed.is_some() {
            self.engine.announce_playlist(playlist_id);
        }
        Ok(removed)
    }

    pub async fn playlist_move(&self, playlist_id: i64, to: i64, from: i64) -> Result<Vec<PlaylistTrack>> {
        require_position(to)?;
        require_position(from)?;
        self.require_playlist(playlist_id).await?;
        let list = playlists::move_entry(self.engine.pool(), playlist_id, to, from).await?;
        self.engine.announce_playlist(playlist_id);
        Ok(list)
    }

    // History

    pub async fn recent_history(&self, limit: i64) -> Result<Vec<PlaybackHistory>> {
        require_position(limit)?;
        Ok(history::recent(self.engine.pool(), limit).await?)
    }
}
