//! Error types for tonearm-ap
//!
//! Only validation failures reach callers of the player; engine-internal
//! failures are logged and absorbed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Store or configuration failure from tonearm-common
    #[error(transparent)]
    Common(tonearm_common::Error),

    /// Media pipeline creation, seek or state change failed
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Rejected at the player boundary
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown track or playlist id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Engine lifecycle misuse, such as starting it twice
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<tonearm_common::Error> for Error {
    fn from(error: tonearm_common::Error) -> Self {
        match error {
            tonearm_common::Error::NotFound { entity, id } => {
                Error::NotFound(format!("{} {}", entity, id))
            }
            other => Error::Common(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
