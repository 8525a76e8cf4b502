//! Recursive directory upload.
//!
//! [`put_dir`] replicates a local tree under a remote directory: a pre-order
//! walk creates each directory before its contents, and every file goes
//! through [`burrow_transfer::put_file`] one after another.

mod error;
mod mirror;
mod scanner;
mod types;

pub use error::{EntryError, MirrorError};
pub use mirror::{MirrorOptions, put_dir};
pub use scanner::scan_tree;
pub use types::{EntryFailure, MirrorEntry, MirrorPolicy, MirrorReport};
