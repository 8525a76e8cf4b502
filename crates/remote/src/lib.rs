//! Remote file session seam.
//!
//! The transfer engine never talks to SSH directly. It drives a
//! [`RemoteSession`], which supplies the handful of SFTP-like operations
//! an upload needs: readiness, path canonicalization, stat, positional
//! writes through per-attempt handles, mkdir and chmod.
//!
//! Two implementations ship with the crate:
//! - [`LocalStore`] maps a virtual POSIX namespace onto a local directory.
//! - `SftpSession` (feature `sftp`) speaks SFTP over an ssh2 session.

mod error;
mod local;
pub mod path;
#[cfg(feature = "sftp")]
mod sftp;

use std::future::Future;
use std::pin::Pin;

pub use error::RemoteError;
pub use local::LocalStore;
#[cfg(feature = "sftp")]
pub use sftp::{SftpConfig, SftpSession};

/// Boxed future returned by every remote operation.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Attributes of a remote path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    /// Size in bytes.
    pub size: u64,
    /// True when the path is a directory.
    pub is_dir: bool,
    /// Permission bits (`0o7777` mask).
    pub mode: u32,
}

/// An authenticated remote file store.
///
/// Implementations must be safe to share across concurrent chunk tasks:
/// every method takes `&self` and distinct calls never share a cursor.
pub trait RemoteSession: Send + Sync {
    /// Resolves once the session is authenticated and usable.
    ///
    /// Cheap once the session is up; called again before every chunk attempt.
    fn ready(&self) -> RemoteFuture<'_, ()>;

    /// Resolves `path` to an absolute remote path. An empty path is the
    /// remote working directory.
    fn canonicalize<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, String>;

    /// Stats `path`. Fails when the path does not exist.
    fn stat<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, RemoteStat>;

    /// Opens `path` for writing, creating it if missing. Existing content
    /// is never truncated.
    fn open_write<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, Box<dyn RemoteFile>>;

    /// Creates a single directory. Fails if it exists or the parent is missing.
    fn mkdir<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, ()>;

    /// Sets the permission bits of `path`.
    fn chmod<'a>(&'a self, path: &'a str, mode: u32) -> RemoteFuture<'a, ()>;
}

/// A remote file handle owned by exactly one chunk attempt.
pub trait RemoteFile: Send {
    /// Moves the write position to `offset` bytes from the start.
    fn seek(&mut self, offset: u64) -> RemoteFuture<'_, ()>;

    /// Writes part of `buf`, returning how many bytes were accepted.
    ///
    /// A short count is not an error; callers loop over the remainder.
    fn write<'a>(&'a mut self, buf: &'a [u8]) -> RemoteFuture<'a, usize>;

    /// Flushes and releases the handle.
    fn close(&mut self) -> RemoteFuture<'_, ()>;
}
