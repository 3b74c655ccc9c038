//! Writes a full timestamped backup of the project tree before a schema
//! migration runs. The walk mirrors the recursive directory copies used
//! elsewhere in this codebase for cache and classpath scanning.

use std::path::{Path, PathBuf};

use archon_core::{codes, ArchonError};
use archon_layout::ProjectLayout;

/// A project-relative directory never copied into a backup: the backups
/// directory itself (a backup must not contain earlier backups) and the
/// scratch tmp dir under `.archon`.
fn is_excluded(root: &Path, entry: &Path) -> bool {
    let Ok(rel) = entry.strip_prefix(root) else {
        return false;
    };
    let mut components = rel.components();
    match components.next() {
        Some(c) if c.as_os_str() == "backups" => true,
        Some(c) if c.as_os_str() == ".archon" => {
            matches!(components.next(), Some(c2) if c2.as_os_str() == "tmp")
        }
        _ => false,
    }
}

/// Copies the project tree into `backups/<rfc3339-timestamp>/`, excluding
/// the backups directory and the tmp scratch dir, and returns the backup's
/// path.
pub fn backup_project(layout: &ProjectLayout) -> Result<PathBuf, ArchonError> {
    let root = layout.root().as_path().to_path_buf();
    let dest = layout.backups_dir().join(rfc3339_now());
    std::fs::create_dir_all(&dest).map_err(|e| ArchonError::io("create backup directory", &e))?;

    let walker = walkdir::WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_excluded(&root, entry.path()));

    for entry in walker {
        let entry = entry.map_err(|e| {
            ArchonError::new(codes::IO_READ_FAILED, format!("walking project tree for backup: {e}"))
        })?;
        let rel = entry.path().strip_prefix(&root).expect("walkdir yields paths under root");
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| ArchonError::io("create backup subdirectory", &e))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ArchonError::io("create backup subdirectory", &e))?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| ArchonError::io("copy file into backup", &e))?;
        }
    }

    Ok(dest)
}

fn rfc3339_now() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
        .replace(':', "-")
}

#[cfg(test)]
mod tests {
    use archon_core::path::AbsPathBuf;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn backs_up_nodes_but_not_backups_or_tmp() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(AbsPathBuf::new(dir.path().to_path_buf()).unwrap());
        layout.create_skeleton().unwrap();
        std::fs::write(layout.nodes_dir().join("root.json"), b"{}").unwrap();
        std::fs::write(layout.tmp_dir().join("scratch.tmp"), b"junk").unwrap();

        let backup_path = backup_project(&layout).unwrap();
        assert!(backup_path.join("nodes").join("root.json").exists());
        assert!(!backup_path.join(".archon").join("tmp").exists());
        assert!(!backup_path.join("backups").exists());
    }
}
