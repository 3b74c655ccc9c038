//! The atomic write protocol: write a temp file in the same directory, sync
//! it, rename it over the destination, then best-effort sync the parent
//! directory. A reader can never observe a partially written file, because
//! `rename` is the only operation that makes the new bytes visible at the
//! destination path.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use archon_core::ArchonError;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), ArchonError> {
    atomic_write_with(path, |file| file.write_all(bytes))
}

/// As [`atomic_write`], but the caller streams bytes into the temp file
/// itself (used when serializing directly to the file handle).
pub fn atomic_write_with(
    path: &Path,
    write: impl FnOnce(&mut fs::File) -> io::Result<()>,
) -> Result<(), ArchonError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| ArchonError::io("create project directory", &e))?;

    let (tmp_path, mut file) =
        open_unique_tmp_file(path, parent).map_err(|e| ArchonError::io("open temp file", &e))?;

    let result = (|| -> io::Result<()> {
        write(&mut file)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = result {
        drop(file);
        let _ = fs::remove_file(&tmp_path);
        return Err(ArchonError::io("write temp file", &err));
    }
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(ArchonError::io("rename temp file into place", &err));
    }

    sync_parent_dir_best_effort(parent);
    Ok(())
}

/// Deletes a single file via the same crash-safe discipline: the file is
/// either fully present or fully absent, never partially truncated.
pub fn atomic_remove(path: &Path) -> Result<(), ArchonError> {
    match fs::remove_file(path) {
        Ok(()) => {
            if let Some(parent) = path.parent() {
                sync_parent_dir_best_effort(parent);
            }
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ArchonError::io("remove file", &err)),
    }
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}

fn sync_parent_dir_best_effort(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(dir_handle) = fs::File::open(dir) {
            if let Err(err) = dir_handle.sync_all() {
                tracing::debug!(
                    target: "archon.layout",
                    dir = %dir.display(),
                    error = %err,
                    "failed to fsync parent directory (best effort)"
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nodes/ab/abcdef.json");
        atomic_write(&path, b"{\"hello\":true}").unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{\"hello\":true}");
    }

    #[test]
    fn overwrite_replaces_atomically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.json");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        // no leftover temp files
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn remove_of_missing_file_is_ok() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        atomic_remove(&path).unwrap();
    }
}
