//! Local tree scanning.
//!
//! Walks a directory in pre-order and maps every node onto a remote path.
//! Siblings are visited in name order so runs are reproducible.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::MirrorError;
use crate::types::MirrorEntry;

/// Scans `local_root` and returns its entries, the root first.
///
/// Each entry's remote path is `remote_base` joined with its relative path.
/// Relative paths use `/` as separator on every platform. Symlinks to files
/// are followed; symlinks to directories are skipped to avoid cycles.
pub fn scan_tree(local_root: &Path, remote_base: &str) -> Result<Vec<MirrorEntry>, MirrorError> {
    let mut entries = vec![MirrorEntry {
        local_path: local_root.to_path_buf(),
        remote_path: remote_base.to_string(),
        relative_path: String::new(),
        is_dir: true,
    }];

    walk_dir(local_root, local_root, remote_base, &mut entries)?;

    Ok(entries)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    remote_base: &str,
    entries: &mut Vec<MirrorEntry>,
) -> Result<(), MirrorError> {
    let scan_err = |source: std::io::Error| MirrorError::Scan {
        path: current.to_path_buf(),
        source,
    };

    let mut children = std::fs::read_dir(current)
        .map_err(scan_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(scan_err)?;
    children.sort_by_key(|e| e.file_name());

    for child in children {
        let path = child.path();
        let file_type = child.file_type().map_err(scan_err)?;

        let is_dir = if file_type.is_symlink() {
            match std::fs::metadata(&path) {
                Ok(meta) if meta.is_dir() => {
                    warn!(path = %path.display(), "skipping symlinked directory");
                    continue;
                }
                Ok(meta) if meta.is_file() => false,
                Ok(_) => {
                    debug!(path = %path.display(), "skipping special file");
                    continue;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping broken symlink");
                    continue;
                }
            }
        } else if file_type.is_dir() {
            true
        } else if file_type.is_file() {
            false
        } else {
            debug!(path = %path.display(), "skipping special file");
            continue;
        };

        let rel_path = path
            .strip_prefix(root)
            .map_err(|e| scan_err(std::io::Error::other(e)))?;

        // Normalize to forward slashes.
        let rel_str = rel_path.to_string_lossy().replace('\\', "/");

        entries.push(MirrorEntry {
            local_path: path.clone(),
            remote_path: burrow_remote::path::join(remote_base, &rel_str),
            relative_path: rel_str,
            is_dir,
        });

        if is_dir {
            walk_dir(root, &path, remote_base, entries)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("d2").join("d3")).unwrap();
        fs::create_dir(root.join("d1")).unwrap();
        fs::write(root.join("d1").join("a.txt"), b"AAA").unwrap();
        fs::write(root.join("d2").join("d3").join("b.txt"), b"BBBB").unwrap();
        fs::write(root.join("top.txt"), b"T").unwrap();

        dir
    }

    fn relative(entries: &[MirrorEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.relative_path.as_str()).collect()
    }

    #[test]
    fn scan_is_sorted_pre_order() {
        let dir = create_test_tree();
        let entries = scan_tree(dir.path(), "/srv/tree").unwrap();

        assert_eq!(
            relative(&entries),
            vec!["", "d1", "d1/a.txt", "d2", "d2/d3", "d2/d3/b.txt", "top.txt"]
        );
        assert!(entries[0].is_dir);
        assert!(entries[1].is_dir);
        assert!(!entries[2].is_dir);
    }

    #[test]
    fn scan_maps_remote_paths() {
        let dir = create_test_tree();
        let entries = scan_tree(dir.path(), "/srv/tree").unwrap();

        let remote: Vec<&str> = entries.iter().map(|e| e.remote_path.as_str()).collect();
        assert_eq!(remote[0], "/srv/tree");
        assert_eq!(remote[1], "/srv/tree/d1");
        assert_eq!(remote[5], "/srv/tree/d2/d3/b.txt");
        assert_eq!(entries[5].local_path, dir.path().join("d2").join("d3").join("b.txt"));
    }

    #[test]
    fn every_directory_precedes_its_children() {
        let dir = create_test_tree();
        let entries = scan_tree(dir.path(), "/r").unwrap();

        for (i, e) in entries.iter().enumerate() {
            if let Some((parent, _)) = e.relative_path.rsplit_once('/') {
                let parent_idx = entries
                    .iter()
                    .position(|p| p.relative_path == parent)
                    .unwrap();
                assert!(parent_idx < i, "{parent} listed after {}", e.relative_path);
            }
        }
    }

    #[test]
    fn scan_empty_dir() {
        let dir = TempDir::new().unwrap();
        let entries = scan_tree(dir.path(), "/r").unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_dir);
    }

    #[test]
    fn scan_nonexistent_dir() {
        let result = scan_tree(Path::new("/nonexistent/path/that/does/not/exist"), "/r");
        assert!(matches!(result, Err(MirrorError::Scan { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_to_files_are_followed_and_dir_links_skipped() {
        let dir = create_test_tree();
        let root = dir.path();
        std::os::unix::fs::symlink(root.join("top.txt"), root.join("link.txt")).unwrap();
        std::os::unix::fs::symlink(root.join("d2"), root.join("loop")).unwrap();
        std::os::unix::fs::symlink(root.join("gone"), root.join("broken")).unwrap();

        let entries = scan_tree(root, "/r").unwrap();
        let rel = relative(&entries);
        assert!(rel.contains(&"link.txt"));
        assert!(!rel.iter().any(|p| p.starts_with("loop")));
        assert!(!rel.contains(&"broken"));

        let link = entries.iter().find(|e| e.relative_path == "link.txt").unwrap();
        assert!(!link.is_dir);
    }
}
