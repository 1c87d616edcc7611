use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a container, or was never finalized.
    #[error("bad container format: {0}")]
    Format(&'static str),

    /// Framing violation inside a container. Fatal; no partial recovery.
    #[error("corrupt data: {0}")]
    Corrupt(&'static str),

    #[error("segment {segment} is not within bounds [0..{count})")]
    SegmentRange { segment: u64, count: u64 },

    #[error("segment selection cannot change once reading has started")]
    SelectionLocked,

    #[error("lock file already held: {0}")]
    LockHeld(PathBuf),

    #[error("no volume eligible to receive the write")]
    NoVolume,

    #[error("name cannot be normalised to a path fragment: {0:?}")]
    InvalidName(String),
}

pub type Result<T> = std::result::Result<T, Error>;
