//! Failures of the shared store and configuration layer

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Creating the database directory failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file unreadable, malformed or out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// No track or playlist with that id
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Unknown perspective: {0}")]
    UnknownPerspective(String),

    /// The single pending-playback slot is already taken
    #[error("A playback is already pending")]
    PlaybackPending,
}

impl Error {
    /// Map a unique-index violation on the pending slot to [`Error::PlaybackPending`]
    pub(crate) fn from_pending_insert(error: sqlx::Error) -> Self {
        match error.as_database_error() {
            Some(db) if db.is_unique_violation() => Error::PlaybackPending,
            _ => Error::Database(error),
        }
    }
}
