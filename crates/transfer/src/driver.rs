//! Single-file upload driver.

use std::path::Path;
use std::sync::Arc;

use burrow_remote::{RemoteSession, path};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::chunked::{LocalSource, upload_chunk};
use crate::pool::WorkerPool;
use crate::progress::{ProgressAggregator, ProgressSink, ProgressUpdate};
use crate::retry::RetryPolicy;
use crate::types::TransferJob;
use crate::{CHUNK_SIZE, DEFAULT_WORKERS, TransferError};

/// Builds a progress sink for one file, given its remote path and size.
pub type SinkFactory = Arc<dyn Fn(&str, u64) -> Box<dyn ProgressSink> + Send + Sync>;

/// Knobs for [`put_file`].
#[derive(Clone)]
pub struct TransferOptions {
    /// Concurrent chunk uploads.
    pub workers: usize,
    pub chunk_size: usize,
    pub retry: RetryPolicy,
    /// Progress display; none by default.
    pub progress: Option<SinkFactory>,
    /// Upload into an existing remote directory under the local file name.
    /// When off, a directory at the target fails the job.
    pub into_directory: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            chunk_size: CHUNK_SIZE,
            retry: RetryPolicy::default(),
            progress: None,
            into_directory: true,
        }
    }
}

impl std::fmt::Debug for TransferOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferOptions")
            .field("workers", &self.workers)
            .field("chunk_size", &self.chunk_size)
            .field("retry", &self.retry)
            .field("progress", &self.progress.is_some())
            .field("into_directory", &self.into_directory)
            .finish()
    }
}

/// What [`put_file`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Final remote path after canonicalization.
    pub remote_path: String,
    pub total_size: u64,
    pub resume_offset: u64,
    /// Chunks dispatched.
    pub chunks: usize,
    pub bytes_written: u64,
    /// True when the remote file was already complete.
    pub skipped: bool,
}

struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&mut self, _update: &ProgressUpdate) {}
}

/// Uploads `local` to `remote`, resuming from the remote file's size.
///
/// When `remote` names an existing directory and `options.into_directory` is
/// set, the file lands inside it under its local name. Chunk failures are retried per `options.retry`; a chunk
/// that still fails surfaces as [`TransferError::ChunkFailed`] once every
/// other chunk has run, leaving the remote file ready to resume.
pub async fn put_file(
    session: Arc<dyn RemoteSession>,
    remote: &str,
    local: &Path,
    options: &TransferOptions,
) -> Result<TransferOutcome, TransferError> {
    let span = info_span!("put_file", local = %local.display(), remote = %remote);
    run(session, remote, local, options).instrument(span).await
}

async fn run(
    session: Arc<dyn RemoteSession>,
    remote: &str,
    local: &Path,
    options: &TransferOptions,
) -> Result<TransferOutcome, TransferError> {
    session
        .ready()
        .await
        .map_err(TransferError::SessionUnavailable)?;

    let canonical = session.canonicalize(remote).await.map_err(|e| {
        TransferError::InvalidRemotePath {
            path: remote.to_string(),
            source: e,
        }
    })?;

    let meta = tokio::fs::metadata(local)
        .await
        .map_err(|e| TransferError::LocalStat {
            path: local.to_path_buf(),
            source: e,
        })?;
    if !meta.is_file() {
        return Err(TransferError::NotAFile(local.to_path_buf()));
    }

    let source = LocalSource::open(local).map_err(|e| TransferError::LocalOpen {
        path: local.to_path_buf(),
        source: e,
    })?;

    let target_stat = session.stat(&canonical).await;
    let (target, existing) = match target_stat {
        Ok(stat) if stat.is_dir && options.into_directory => {
            let name = local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let target = path::join(&canonical, &name);
            let existing = session.stat(&target).await;
            (target, existing)
        }
        other => (canonical, other),
    };

    let remote_size = match existing {
        Ok(stat) if stat.is_dir => return Err(TransferError::RemoteIsDirectory(target)),
        Ok(stat) => stat.size,
        Err(e) => {
            if !e.is_not_found() {
                debug!(remote = %target, error = %e, "remote stat failed, starting from zero");
            }
            0
        }
    };

    let job = TransferJob::new(
        local.to_path_buf(),
        target,
        options.chunk_size,
        options.workers.max(1),
        meta.len(),
        remote_size,
    );

    if job.is_complete() {
        info!(remote = %job.remote_path, "file already fully uploaded");
        return Ok(TransferOutcome {
            remote_path: job.remote_path,
            total_size: job.total_size,
            resume_offset: job.resume_offset,
            chunks: 0,
            bytes_written: 0,
            skipped: true,
        });
    }
    if job.resume_offset > 0 {
        info!(
            offset = job.resume_offset,
            total = job.total_size,
            "resuming upload"
        );
    }

    let chunks = job.chunks().len();
    let bytes_written = upload_chunks(&session, &source, &job, options).await?;

    let mode = local_mode(&meta);
    session
        .chmod(&job.remote_path, mode)
        .await
        .map_err(|e| TransferError::Chmod {
            path: job.remote_path.clone(),
            source: e,
        })?;

    info!(
        remote = %job.remote_path,
        bytes = bytes_written,
        mode = %format!("{mode:o}"),
        "upload complete"
    );

    Ok(TransferOutcome {
        remote_path: job.remote_path,
        total_size: job.total_size,
        resume_offset: job.resume_offset,
        chunks,
        bytes_written,
        skipped: false,
    })
}

/// Runs every chunk of `job` through a fresh pool and returns the bytes
/// written. Fails with the lowest-offset chunk failure, if any.
async fn upload_chunks(
    session: &Arc<dyn RemoteSession>,
    source: &LocalSource,
    job: &TransferJob,
    options: &TransferOptions,
) -> Result<u64, TransferError> {
    let chunks = job.chunks();
    let sink: Box<dyn ProgressSink> = match &options.progress {
        Some(factory) => factory(&job.remote_path, job.total_size),
        None => Box::new(NullSink),
    };
    let (reporter, progress) = ProgressAggregator::start(job.resume_offset, job.total_size, sink);
    let (failures_tx, mut failures) = mpsc::unbounded_channel();
    let remote: Arc<str> = Arc::from(job.remote_path.as_str());

    info!("using {} workers", job.workers);
    debug!(chunks = chunks.len(), chunk_size = job.chunk_size, "dispatching chunks");

    let mut pool = WorkerPool::new(job.workers);
    for chunk in chunks {
        let session = Arc::clone(session);
        let source = source.clone();
        let remote = Arc::clone(&remote);
        let reporter = reporter.clone();
        let failures = failures_tx.clone();
        let retry = options.retry;

        let queued = pool
            .enqueue(async move {
                match upload_chunk(session.as_ref(), &source, &remote, chunk, &retry).await {
                    Ok(written) => reporter.report(written as u64),
                    Err((err, attempts)) => {
                        let _ = failures.send(TransferError::ChunkFailed {
                            offset: chunk.offset,
                            attempts,
                            source: err,
                        });
                    }
                }
            })
            .await;
        if let Err(e) = queued {
            pool.stop().await;
            return Err(e.into());
        }
    }

    pool.wait().await;
    pool.stop().await;
    drop(reporter);
    drop(failures_tx);

    let bytes_written = match progress.await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "progress task failed");
            0
        }
    };

    let mut first: Option<TransferError> = None;
    let mut failed = 0;
    while let Ok(err) = failures.try_recv() {
        failed += 1;
        warn!(error = %err, "chunk failed");
        let lower = match (&first, &err) {
            (None, _) => true,
            (
                Some(TransferError::ChunkFailed { offset: a, .. }),
                TransferError::ChunkFailed { offset: b, .. },
            ) => b < a,
            _ => false,
        };
        if lower {
            first = Some(err);
        }
    }

    match first {
        Some(err) => {
            warn!(failed, written = bytes_written, "upload incomplete, rerun to resume");
            Err(err)
        }
        None => Ok(bytes_written),
    }
}

#[cfg(unix)]
fn local_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn local_mode(meta: &std::fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
