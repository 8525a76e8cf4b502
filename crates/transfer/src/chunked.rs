use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use burrow_remote::{RemoteError, RemoteFile, RemoteSession};
use tracing::{debug, warn};

use crate::retry::RetryPolicy;
use crate::types::Chunk;

/// Why a single chunk attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("local read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl ChunkError {
    /// True when repeating the attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Read(e) => !matches!(
                e.kind(),
                ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::InvalidInput
            ),
            Self::Remote(e) => e.is_retryable(),
        }
    }
}

// ---------------------------------------------------------------------------
// LocalSource
// ---------------------------------------------------------------------------

/// A local file shared by concurrent chunk tasks.
///
/// Reads are positional and never touch a shared cursor, so any number of
/// tasks can read different ranges of the same handle at once.
#[derive(Clone)]
pub struct LocalSource {
    file: Arc<std::fs::File>,
    path: PathBuf,
}

impl LocalSource {
    /// Opens `path` for reading.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self {
            file: Arc::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads up to `len` bytes at `offset`.
    ///
    /// Short reads are retried until `len` bytes arrive or the file ends;
    /// the returned buffer is truncated to what was actually read.
    pub async fn read_at(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; len];
            let mut filled = 0;
            while filled < len {
                match pread(&file, &mut buf[filled..], offset + filled as u64) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => return Err(e),
                }
            }
            buf.truncate(filled);
            Ok(buf)
        })
        .await
        .map_err(std::io::Error::other)?
    }
}

#[cfg(unix)]
fn pread(file: &std::fs::File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn pread(file: &std::fs::File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

// ---------------------------------------------------------------------------
// Chunk upload
// ---------------------------------------------------------------------------

/// Uploads one chunk, retrying failed attempts per `retry`.
///
/// Returns the number of bytes written, or the last attempt's error with
/// the attempt count once the failure is fatal or the budget is spent.
pub(crate) async fn upload_chunk(
    session: &dyn RemoteSession,
    source: &LocalSource,
    remote: &str,
    chunk: Chunk,
    retry: &RetryPolicy,
) -> Result<usize, (ChunkError, u32)> {
    let mut attempt = 1;
    loop {
        match try_chunk(session, source, remote, chunk).await {
            Ok(written) => {
                if attempt > 1 {
                    debug!(offset = chunk.offset, attempt, "chunk recovered");
                }
                return Ok(written);
            }
            Err(e) if e.is_retryable() && retry.allows_retry(attempt) => {
                let backoff = retry.backoff(attempt);
                warn!(
                    offset = chunk.offset,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "chunk attempt failed, retrying"
                );
                retry.pause(attempt).await;
                attempt += 1;
            }
            Err(e) => return Err((e, attempt)),
        }
    }
}

/// One attempt: read the range, write it through a fresh remote handle.
async fn try_chunk(
    session: &dyn RemoteSession,
    source: &LocalSource,
    remote: &str,
    chunk: Chunk,
) -> Result<usize, ChunkError> {
    session.ready().await?;

    let data = source
        .read_at(chunk.offset, chunk.length)
        .await
        .map_err(ChunkError::Read)?;

    let mut file = session.open_write(remote).await?;
    let written = write_at(file.as_mut(), remote, chunk.offset, &data).await;
    let closed = file.close().await;
    let written = written?;
    closed?;
    Ok(written)
}

/// Seeks to `offset` and writes all of `data`, looping over short writes.
async fn write_at(
    file: &mut dyn RemoteFile,
    remote: &str,
    offset: u64,
    data: &[u8],
) -> Result<usize, RemoteError> {
    file.seek(offset).await?;

    let mut written = 0;
    while written < data.len() {
        let n = file.write(&data[written..]).await?;
        if n == 0 {
            return Err(RemoteError::io(
                remote,
                std::io::Error::from(ErrorKind::WriteZero),
            ));
        }
        written += n;
    }
    Ok(written)
}
