//! Resumable, parallel, chunked uploads over a [`RemoteSession`].
//!
//! [`put_file`] resumes from the remote file's current size, splits the rest
//! into fixed-size chunks and uploads them through a bounded [`WorkerPool`].
//! Every chunk opens its own remote handle, so completion order never
//! affects the resulting content.
//!
//! [`RemoteSession`]: burrow_remote::RemoteSession

mod chunked;
mod driver;
mod pool;
mod progress;
mod retry;
mod types;

#[cfg(test)]
mod testing;

use std::path::PathBuf;

use burrow_remote::RemoteError;

pub use chunked::{ChunkError, LocalSource};
pub use driver::{SinkFactory, TransferOptions, TransferOutcome, put_file};
pub use pool::{PoolStopped, WorkerPool};
pub use progress::{
    ProgressAggregator, ProgressReporter, ProgressSink, ProgressUpdate, SpeedCalculator,
};
pub use retry::RetryPolicy;
pub use types::{Chunk, TransferJob, plan_chunks};

/// Chunk size: 128 KiB.
pub const CHUNK_SIZE: usize = 128 * 1024;

/// Default number of concurrent chunk uploads per file.
pub const DEFAULT_WORKERS: usize = 16;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
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

    #[error("{} is not a regular file", .0.display())]
    NotAFile(PathBuf),

    #[error("cannot open local path {}: {source}", path.display())]
    LocalOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("remote target {0} is a directory")]
    RemoteIsDirectory(String),

    #[error("chunk at offset {offset} failed after {attempts} attempt(s): {source}")]
    ChunkFailed {
        offset: u64,
        attempts: u32,
        #[source]
        source: ChunkError,
    },

    #[error("cannot set permissions on {path}: {source}")]
    Chmod {
        path: String,
        #[source]
        source: RemoteError,
    },

    #[error(transparent)]
    Pool(#[from] PoolStopped),
}
