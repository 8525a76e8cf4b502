//! Directory-rooted store with SFTP semantics.
//!
//! Virtual absolute paths (`/a/b`) map onto `root/a/b`. Relative paths
//! resolve against a virtual home, `/` unless overridden.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::watch;

use crate::path;
use crate::{RemoteError, RemoteFile, RemoteFuture, RemoteSession, RemoteStat};

/// A [`RemoteSession`] backed by a local directory.
pub struct LocalStore {
    root: PathBuf,
    home: String,
    ready: watch::Sender<bool>,
}

impl LocalStore {
    /// Creates a store rooted at `root` that is ready immediately.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_readiness(root.into(), true)
    }

    /// Creates a store whose [`ready`](RemoteSession::ready) blocks until
    /// [`set_ready`](Self::set_ready) is called.
    pub fn pending(root: impl Into<PathBuf>) -> Self {
        Self::with_readiness(root.into(), false)
    }

    fn with_readiness(root: PathBuf, ready: bool) -> Self {
        let (ready, _) = watch::channel(ready);
        Self {
            root,
            home: "/".into(),
            ready,
        }
    }

    /// Sets the virtual working directory relative paths resolve against.
    pub fn with_home(mut self, home: impl Into<String>) -> Self {
        self.home = home.into();
        self
    }

    /// Marks the store as usable, releasing every pending `ready()` call.
    pub fn set_ready(&self) {
        self.ready.send_replace(true);
    }

    /// Local directory backing the virtual `/`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, virtual_path: &str) -> Result<String, RemoteError> {
        let absolute = if virtual_path.starts_with('/') {
            virtual_path.to_string()
        } else {
            path::join(&self.home, virtual_path)
        };
        path::normalize(&absolute).ok_or_else(|| RemoteError::InvalidPath(virtual_path.into()))
    }

    fn local_path(&self, virtual_path: &str) -> Result<PathBuf, RemoteError> {
        let resolved = self.resolve(virtual_path)?;
        Ok(self.root.join(resolved.trim_start_matches('/')))
    }
}

impl RemoteSession for LocalStore {
    fn ready(&self) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            let mut rx = self.ready.subscribe();
            rx.wait_for(|up| *up)
                .await
                .map(|_| ())
                .map_err(|_| RemoteError::SessionClosed)
        })
    }

    fn canonicalize<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, String> {
        Box::pin(async move { self.resolve(path) })
    }

    fn stat<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, RemoteStat> {
        Box::pin(async move {
            let local = self.local_path(path)?;
            let meta = tokio::fs::metadata(&local)
                .await
                .map_err(|e| RemoteError::io(path, e))?;
            Ok(RemoteStat {
                size: meta.len(),
                is_dir: meta.is_dir(),
                mode: mode_of(&meta),
            })
        })
    }

    fn open_write<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, Box<dyn RemoteFile>> {
        Box::pin(async move {
            let local = self.local_path(path)?;
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&local)
                .await
                .map_err(|e| RemoteError::io(path, e))?;
            Ok(Box::new(LocalFile {
                file,
                path: path.to_string(),
            }) as Box<dyn RemoteFile>)
        })
    }

    fn mkdir<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let local = self.local_path(path)?;
            tokio::fs::create_dir(&local)
                .await
                .map_err(|e| RemoteError::io(path, e))
        })
    }

    fn chmod<'a>(&'a self, path: &'a str, mode: u32) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let local = self.local_path(path)?;
            let meta = tokio::fs::metadata(&local)
                .await
                .map_err(|e| RemoteError::io(path, e))?;
            tokio::fs::set_permissions(&local, permissions_for(meta.permissions(), mode))
                .await
                .map_err(|e| RemoteError::io(path, e))
        })
    }
}

struct LocalFile {
    file: tokio::fs::File,
    path: String,
}

impl RemoteFile for LocalFile {
    fn seek(&mut self, offset: u64) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            self.file
                .seek(SeekFrom::Start(offset))
                .await
                .map(|_| ())
                .map_err(|e| RemoteError::io(self.path.clone(), e))
        })
    }

    fn write<'a>(&'a mut self, buf: &'a [u8]) -> RemoteFuture<'a, usize> {
        Box::pin(async move {
            self.file
                .write(buf)
                .await
                .map_err(|e| RemoteError::io(self.path.clone(), e))
        })
    }

    fn close(&mut self) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            self.file
                .flush()
                .await
                .map_err(|e| RemoteError::io(self.path.clone(), e))
        })
    }
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    match (meta.is_dir(), meta.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

#[cfg(unix)]
fn permissions_for(_current: std::fs::Permissions, mode: u32) -> std::fs::Permissions {
    use std::os::unix::fs::PermissionsExt;
    std::fs::Permissions::from_mode(mode & 0o7777)
}

#[cfg(not(unix))]
fn permissions_for(mut current: std::fs::Permissions, mode: u32) -> std::fs::Permissions {
    current.set_readonly(mode & 0o200 == 0);
    current
}
