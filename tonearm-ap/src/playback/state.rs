//! Engine status shared between the worker and callers

use serde::{Deserialize, Serialize};
use tonearm_common::db::{Playback, Track};
use tonearm_common::events::{LastEvent, PipelineState, PlaybackSnapshot};

/// What the worker should resolve once the current stream has ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Hint {
    NextInPlaylist,
    PreviousInPlaylist,
    PreviousInHistory,
    /// Start the active playlist at its stored position
    ResumePlaylist,
    StopPlaylist,
}

/// Active playlist and the position last resolved from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistContext {
    pub playlist_id: i64,
    pub position: i64,
}

#[derive(Debug, Clone, Default)]
pub struct EngineStatus {
    pub state: PipelineState,
    pub previous_state: PipelineState,
    pub last_event: LastEvent,
    pub playback: Option<Playback>,
    pub track: Option<Track>,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub seekable: bool,
    /// Set once the current stream first reached `Playing`
    pub started: bool,
    pub hint: Option<Hint>,
    pub playlist: Option<PlaylistContext>,
    /// Current item was resolved from `playlist`
    pub in_playlist: bool,
    /// Location of the item that played last, kept after teardown
    pub last_location: Option<String>,
    /// Last history entry resolved by "previous"
    pub history_cursor: Option<i64>,
}

impl EngineStatus {
    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state,
            last_event: self.last_event,
            playback: self.playback.clone(),
            track: self.track.clone(),
            position_ms: self.position_ms,
            duration_ms: self.duration_ms,
            seekable: self.seekable,
            playlist_id: self.playlist.map(|ctx| ctx.playlist_id),
            playlist_position: self.playlist.map(|ctx| ctx.position),
        }
    }

    /// Clear everything tied to the stream that just ended
    pub fn reset_stream(&mut self) {
        if let Some(playback) = self.playback.take() {
            self.last_location = Some(playback.location);
        }
        self.track = None;
        self.previous_state = self.state;
        self.state = PipelineState::Null;
        self.position_ms = 0;
        self.duration_ms = None;
        self.seekable = false;
        self.started = false;
        self.in_playlist = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_reset_keeps_last_location_and_playlist() {
        let mut status = EngineStatus {
            state: PipelineState::Playing,
            playback: Some(Playback {
                id: 1,
                location: "/music/a.flac".to_string(),
                track_id: None,
                played: true,
                skip_ms: 0,
                created_at: Utc::now(),
            }),
            position_ms: 1200,
            playlist: Some(PlaylistContext { playlist_id: 3, position: 2 }),
            in_playlist: true,
            ..Default::default()
        };

        status.reset_stream();

        assert_eq!(status.state, PipelineState::Null);
        assert_eq!(status.previous_state, PipelineState::Playing);
        assert_eq!(status.last_location.as_deref(), Some("/music/a.flac"));
        assert!(status.playback.is_none());
        assert_eq!(status.position_ms, 0);
        assert!(!status.in_playlist);

        let snapshot = status.snapshot();
        assert_eq!(snapshot.playlist_id, Some(3));
        assert_eq!(snapshot.playlist_position, Some(2));
    }
}
