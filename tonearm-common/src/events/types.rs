//! Event payload types
//!
//! Supporting types for topics, pipeline state and playback snapshots.

use crate::db::{Perspective, Playback, Track};
use serde::{Deserialize, Serialize};

/// Bus topics a subscriber can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    Playback,
    QueueStore,
    CollectionStore,
    PlaylistStore,
    HistoryStore,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Playback => "playback",
            Topic::QueueStore => "queue-store",
            Topic::CollectionStore => "collection-store",
            Topic::PlaylistStore => "playlist-store",
            Topic::HistoryStore => "history-store",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media pipeline state as observed by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// No pipeline
    #[default]
    Null,
    Ready,
    Paused,
    Playing,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Null => write!(f, "null"),
            PipelineState::Ready => write!(f, "ready"),
            PipelineState::Paused => write!(f, "paused"),
            PipelineState::Playing => write!(f, "playing"),
        }
    }
}

/// Most recent intent recorded by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LastEvent {
    #[default]
    None,
    Play,
    Pause,
    Previous,
    Next,
    Seek,
    StopStream,
    StopAll,
    ResumeAll,
    PlaylistStart,
    PlaylistStop,
    PlaybarActivate,
    PlaybarDeactivate,
}

/// Point-in-time view of the engine, as broadcast on [`Topic::Playback`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub state: PipelineState,
    pub last_event: LastEvent,
    pub playback: Option<Playback>,
    pub track: Option<Track>,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub seekable: bool,
    /// Playlist driving playback, if any
    pub playlist_id: Option<i64>,
    pub playlist_position: Option<i64>,
}

/// Events carried by the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Bare notification with no payload
    Empty,

    /// Engine status changed (state, current item, last intent)
    PlaybackChanged {
        snapshot: PlaybackSnapshot,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic position update while playing
    PlaybackProgress {
        location: String,
        position_ms: u64,
        duration_ms: Option<u64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A perspective's queue was mutated
    QueueChanged {
        perspective: Perspective,
        length: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A playlist or its track list was mutated
    PlaylistChanged {
        playlist_id: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A completed play was appended to history
    HistoryAppended {
        location: String,
        track_id: Option<i64>,
        duration_played_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Catalog entry changed (tags, play count)
    TrackUpdated {
        track_id: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}
