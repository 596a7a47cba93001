use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use wordlog_git::ArchiveError;

use crate::codec::CodecError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Already logging to {}; restart with a new log file", .0.display())]
    AlreadyLogging(PathBuf),

    #[error("No session is open")]
    NotLogging,

    #[error("Malformed timestamp: {0:?}")]
    MalformedTimestamp(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("IO error on {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Log {} has no {field} recorded", path.display())]
    MissingField { path: PathBuf, field: &'static str },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl StoreError {
    pub(crate) fn file(path: &Path, source: io::Error) -> Self {
        StoreError::File {
            path: path.to_path_buf(),
            source,
        }
    }
}
