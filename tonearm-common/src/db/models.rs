//! Database models

use crate::reorder::Positionable;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

/// Top-level content category; each owns one queue and one playbar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Perspective {
    Music,
    Podcasts,
    Radio,
}

impl Perspective {
    pub const ALL: [Perspective; 3] = [Perspective::Music, Perspective::Podcasts, Perspective::Radio];

    pub fn as_str(&self) -> &'static str {
        match self {
            Perspective::Music => "music",
            Perspective::Podcasts => "podcasts",
            Perspective::Radio => "radio",
        }
    }
}

impl std::fmt::Display for Perspective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Perspective {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "music" => Ok(Perspective::Music),
            "podcasts" => Ok(Perspective::Podcasts),
            "radio" => Ok(Perspective::Radio),
            other => Err(Error::UnknownPerspective(other.to_string())),
        }
    }
}

fn perspective_column(row: &SqliteRow) -> Result<Perspective> {
    Perspective::from_str(&row.get::<String, _>("perspective"))
}

/// Location plus optional catalog reference; the unit fed into queues and playlists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRef {
    pub location: String,
    pub track_id: Option<i64>,
}

impl TrackRef {
    pub fn location(location: impl Into<String>) -> Self {
        Self { location: location.into(), track_id: None }
    }

    pub fn track(track: &Track) -> Self {
        Self { location: track.location.clone(), track_id: Some(track.id) }
    }
}

/// Catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    pub location: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_ms: Option<i64>,
    pub play_count: i64,
    pub last_played: Option<DateTime<Utc>>,
}

impl Track {
    pub(crate) fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            location: row.get("location"),
            title: row.get("title"),
            artist: row.get("artist"),
            album: row.get("album"),
            duration_ms: row.get("duration_ms"),
            play_count: row.get("play_count"),
            last_played: row.get("last_played"),
        }
    }
}

/// Fields for a new catalog entry
#[derive(Debug, Clone, Default)]
pub struct NewTrack {
    pub location: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_ms: Option<i64>,
}

/// "Now playing / about to play" record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playback {
    pub id: i64,
    pub location: String,
    pub track_id: Option<i64>,
    pub played: bool,
    /// Offset to seek to once the stream is playing
    pub skip_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl Playback {
    pub(crate) fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            location: row.get("location"),
            track_id: row.get("track_id"),
            played: row.get("played"),
            skip_ms: row.get("skip_ms"),
            created_at: row.get("created_at"),
        }
    }
}

/// Completed play
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackHistory {
    pub id: i64,
    pub location: String,
    pub track_id: Option<i64>,
    pub duration_played_ms: i64,
    pub played_at: DateTime<Utc>,
}

impl PlaybackHistory {
    pub(crate) fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            location: row.get("location"),
            track_id: row.get("track_id"),
            duration_played_ms: row.get("duration_played_ms"),
            played_at: row.get("played_at"),
        }
    }
}

/// Queue entry
///
/// `id == 0` marks a row not yet written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueTrack {
    pub id: i64,
    pub perspective: Perspective,
    pub position: i64,
    pub location: String,
    pub track_id: Option<i64>,
    pub played: bool,
    #[serde(skip)]
    pub ignore: bool,
}

impl QueueTrack {
    pub fn unsaved(perspective: Perspective, item: TrackRef) -> Self {
        Self {
            id: 0,
            perspective,
            position: 0,
            location: item.location,
            track_id: item.track_id,
            played: false,
            ignore: false,
        }
    }

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.get("id"),
            perspective: perspective_column(row)?,
            position: row.get("position"),
            location: row.get("location"),
            track_id: row.get("track_id"),
            played: row.get("played"),
            ignore: false,
        })
    }
    pub fn track_ref(&self) -> TrackRef {
        TrackRef { location: self.location.clone(), track_id: self.track_id }
    }
}

impl Positionable for QueueTrack {
    fn position(&self) -> i64 {
        self.position
    }
    fn set_position(&mut self, position: i64) {
        self.position = position;
    }
    fn is_ignored(&self) -> bool {
        self.ignore
    }
    fn set_ignored(&mut self, ignored: bool) {
        self.ignore = ignored;
    }
}

/// Named, user-curated sequence belonging to a perspective's playbar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub perspective: Perspective,
    /// Shown in the playbar
    pub open: bool,
    /// Currently driving playback
    pub active: bool,
    /// Position of the entry being played while active (0 when none)
    pub active_position: i64,
}

impl Playlist {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.get("id"),
            name: row.get("name"),
            perspective: perspective_column(row)?,
            open: row.get("open"),
            active: row.get("active"),
            active_position: row.get("active_position"),
        })
    }
}

/// Playlist entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistTrack {
    pub id: i64,
    pub playlist_id: i64,
    pub position: i64,
    pub location: String,
    pub track_id: Option<i64>,
    /// Transient entry, removed when the playlist closes
    pub dynamic: bool,
    #[serde(skip)]
    pub ignore: bool,
}

impl PlaylistTrack {
    pub fn unsaved(playlist_id: i64, item: TrackRef, dynamic: bool) -> Self {
        Self {
            id: 0,
            playlist_id,
            position: 0,
            location: item.location,
            track_id: item.track_id,
            dynamic,
            ignore: false,
        }
    }

    pub(crate) fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            playlist_id: row.get("playlist_id"),
            position: row.get("position"),
            location: row.get("location"),
            track_id: row.get("track_id"),
            dynamic: row.get("dynamic"),
            ignore: false,
        }
    }

    pub fn track_ref(&self) -> TrackRef {
        TrackRef { location: self.location.clone(), track_id: self.track_id }
    }
}

impl Positionable for PlaylistTrack {
    fn position(&self) -> i64 {
        self.position
    }
    fn set_position(&mut self, position: i64) {
        self.position = position;
    }
    fn is_ignored(&self) -> bool {
        self.ignore
    }
    fn set_ignored(&mut self, ignored: bool) {
        self.ignore = ignored;
    }
}
