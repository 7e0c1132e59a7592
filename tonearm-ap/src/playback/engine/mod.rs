//! Playback engine
//!
//! **Module Structure:**
//! - `core.rs`: engine struct, lifecycle and the worker loop
//! - `control.rs`: commands and status probes for callers
//! - `resolve.rs`: picking the next item to play
//! - `iteration.rs`: one pipeline run and its bus reaction

mod control;
mod core;
mod iteration;
mod resolve;

pub use self::core::PlaybackEngine;
