//! Tonearm audio player
//!
//! Playback engine driving a media pipeline from pending playbacks, the
//! perspective queue, open playlists and play history, plus the player
//! facade transports call through.

pub mod error;
pub mod keepalive;
pub mod pipeline;
pub mod playback;
pub mod player;

pub use error::{Error, Result};
pub use keepalive::{BusyGuard, BusyReason, KeepAlive};
pub use playback::PlaybackEngine;
pub use player::Player;
