pub mod cleanup;
pub mod clock;
pub mod download;
pub mod index;
pub mod reconciler;
pub mod remote;
pub mod resolver;
pub mod scan;
pub mod timestamps;
pub mod upload;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

use drivesync_core::DriveError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote store error: {0}")]
    Remote(#[from] DriveError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timestamp parse error: {0}")]
    TimeParse(#[from] time::error::Parse),
    #[error("timestamp format error: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("remote id allocation returned no ids")]
    NoGeneratedIds,
}
