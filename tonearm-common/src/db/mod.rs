//! Persistence collaborator
//!
//! SQLite storage for the catalog, pending playbacks, play history, queues and
//! playlists. Positional mutations run inside one transaction each; nothing in
//! this module broadcasts, callers publish after a successful write.

pub mod history;
pub mod init;
pub mod models;
pub mod playbacks;
pub mod playlists;
pub mod queues;
pub mod tracks;

pub use init::*;
pub use models::*;
