//! Mirror error types.

use std::path::PathBuf;

use burrow_remote::RemoteError;
use burrow_transfer::TransferError;

/// Why a single tree entry could not be mirrored.
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    #[error("mkdir failed: {0}")]
    Mkdir(#[source] RemoteError),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// Errors produced while mirroring a directory tree.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("remote session unavailable: {0}")]
    SessionUnavailable(#[source] RemoteError),

    #[error("invalid remote path {path}: {source}")]
    InvalidRemotePath {
        path: String,
        #[source]
        source: RemoteError,
    },

    #[error("cannot stat local path {}: {source}", path.display())]
    LocalStat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("local path is not a directory: {}", .0.display())]
    LocalNotDirectory(PathBuf),

    #[error("cannot stat remote path {path}: {source}")]
    RemoteStat {
        path: String,
        #[source]
        source: RemoteError,
    },

    #[error("remote path is not a directory: {0}")]
    RemoteNotDirectory(String),

    #[error("cannot scan {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{remote}: {source}")]
    Entry {
        remote: String,
        #[source]
        source: EntryError,
    },
}
