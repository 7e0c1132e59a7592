//! Playback engine and its status types

pub mod engine;
pub mod state;

pub use engine::PlaybackEngine;
pub use state::{EngineStatus, Hint, PlaylistContext};
