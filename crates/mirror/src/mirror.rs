//! Sequential tree mirroring.

use std::path::Path;
use std::sync::Arc;

use burrow_remote::{RemoteSession, path};
use burrow_transfer::{TransferOptions, put_file};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::{EntryError, MirrorError};
use crate::scanner::scan_tree;
use crate::types::{EntryFailure, MirrorEntry, MirrorPolicy, MirrorReport};

/// Knobs for [`put_dir`].
#[derive(Debug, Clone, Default)]
pub struct MirrorOptions {
    /// Applied to every file of the tree. `into_directory` is ignored.
    pub transfer: TransferOptions,
    pub policy: MirrorPolicy,
}

/// Mirrors the local directory `local` into the remote directory `remote`.
///
/// The tree lands under `remote/<name of local>`. Directories are created
/// before anything inside them; files are uploaded one at a time, each with
/// its own chunk pool. Existing remote directories are reused and complete
/// remote files are skipped, so rerunning an interrupted mirror resumes it.
pub async fn put_dir(
    session: Arc<dyn RemoteSession>,
    remote: &str,
    local: &Path,
    options: &MirrorOptions,
) -> Result<MirrorReport, MirrorError> {
    let span = info_span!("put_dir", local = %local.display(), remote = %remote);
    run(session, remote, local, options).instrument(span).await
}

async fn run(
    session: Arc<dyn RemoteSession>,
    remote: &str,
    local: &Path,
    options: &MirrorOptions,
) -> Result<MirrorReport, MirrorError> {
    session
        .ready()
        .await
        .map_err(MirrorError::SessionUnavailable)?;

    let remote_root =
        session
            .canonicalize(remote)
            .await
            .map_err(|e| MirrorError::InvalidRemotePath {
                path: remote.to_string(),
                source: e,
            })?;

    let meta = tokio::fs::metadata(local)
        .await
        .map_err(|e| MirrorError::LocalStat {
            path: local.to_path_buf(),
            source: e,
        })?;
    if !meta.is_dir() {
        return Err(MirrorError::LocalNotDirectory(local.to_path_buf()));
    }

    let remote_meta = session
        .stat(&remote_root)
        .await
        .map_err(|e| MirrorError::RemoteStat {
            path: remote_root.clone(),
            source: e,
        })?;
    if !remote_meta.is_dir {
        return Err(MirrorError::RemoteNotDirectory(remote_root));
    }

    let name = local_name(local).await;
    let remote_base = path::join(&remote_root, &name);

    let entries = {
        let root = local.to_path_buf();
        let base = remote_base.clone();
        tokio::task::spawn_blocking(move || scan_tree(&root, &base))
            .await
            .map_err(|e| MirrorError::Scan {
                path: local.to_path_buf(),
                source: std::io::Error::other(e),
            })??
    };

    let files = entries.iter().filter(|e| !e.is_dir).count();
    info!(
        entries = entries.len(),
        files,
        target = %remote_base,
        "mirroring tree"
    );

    // Every file has an exact target; a directory in its place is a failure.
    let transfer = TransferOptions {
        into_directory: false,
        ..options.transfer.clone()
    };

    let mut report = MirrorReport::default();
    for entry in &entries {
        let result = if entry.is_dir {
            mirror_dir(session.as_ref(), entry, &mut report).await
        } else {
            mirror_file(&session, entry, &transfer, &mut report).await
        };

        if let Err(error) = result {
            match options.policy {
                MirrorPolicy::FailFast => {
                    return Err(MirrorError::Entry {
                        remote: entry.remote_path.clone(),
                        source: error,
                    });
                }
                MirrorPolicy::BestEffort => {
                    warn!(remote = %entry.remote_path, error = %error, "entry failed, continuing");
                    report.failures.push(EntryFailure {
                        local_path: entry.local_path.clone(),
                        remote_path: entry.remote_path.clone(),
                        error,
                    });
                }
            }
        }
    }

    info!(
        dirs_created = report.dirs_created,
        dirs_existing = report.dirs_existing,
        files_transferred = report.files_transferred,
        files_skipped = report.files_skipped,
        bytes = report.bytes_written,
        failures = report.failures.len(),
        "mirror finished"
    );
    Ok(report)
}

async fn mirror_dir(
    session: &dyn RemoteSession,
    entry: &MirrorEntry,
    report: &mut MirrorReport,
) -> Result<(), EntryError> {
    match session.mkdir(&entry.remote_path).await {
        Ok(()) => {
            debug!(remote = %entry.remote_path, "created directory");
            report.dirs_created += 1;
            Ok(())
        }
        Err(e) => match session.stat(&entry.remote_path).await {
            Ok(stat) if stat.is_dir => {
                debug!(remote = %entry.remote_path, "directory already exists");
                report.dirs_existing += 1;
                Ok(())
            }
            _ => Err(EntryError::Mkdir(e)),
        },
    }
}

async fn mirror_file(
    session: &Arc<dyn RemoteSession>,
    entry: &MirrorEntry,
    options: &TransferOptions,
    report: &mut MirrorReport,
) -> Result<(), EntryError> {
    let outcome = put_file(
        Arc::clone(session),
        &entry.remote_path,
        &entry.local_path,
        options,
    )
    .await?;

    if outcome.skipped {
        report.files_skipped += 1;
    } else {
        report.files_transferred += 1;
        report.bytes_written += outcome.bytes_written;
    }
    Ok(())
}

/// Final component of `local`, resolving `.`/`..` through the filesystem.
async fn local_name(local: &Path) -> String {
    if let Some(name) = local.file_name() {
        return name.to_string_lossy().into_owned();
    }
    tokio::fs::canonicalize(local)
        .await
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default()
}
