//! # Tonearm Common Library
//!
//! Shared code for the Tonearm player including:
//! - Data model and the SQLite persistence collaborator
//! - Ordered-list reordering used by queues and playlists
//! - Event subscription bus (topics, subscribers, deliveries)
//! - Configuration loading

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod reorder;

pub use error::{Error, Result};
pub use reorder::Positionable;
