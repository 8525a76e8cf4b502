use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::EntryError;

/// One node of the local tree and where it lands remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    pub local_path: PathBuf,
    pub remote_path: String,
    /// Path below the scanned root, `/`-separated. Empty for the root.
    pub relative_path: String,
    pub is_dir: bool,
}

/// What to do when one entry fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MirrorPolicy {
    /// Log the failure, record it in the report and keep going.
    #[default]
    BestEffort,
    /// Stop at the first failure.
    FailFast,
}

/// An entry that could not be mirrored under [`MirrorPolicy::BestEffort`].
#[derive(Debug)]
pub struct EntryFailure {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub error: EntryError,
}

/// Summary of a mirror run.
#[derive(Debug, Default)]
pub struct MirrorReport {
    pub dirs_created: usize,
    /// Directories that were already present remotely.
    pub dirs_existing: usize,
    pub files_transferred: usize,
    /// Files whose remote copy was already complete.
    pub files_skipped: usize,
    pub bytes_written: u64,
    pub failures: Vec<EntryFailure>,
}

impl MirrorReport {
    /// True when every entry was mirrored.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
