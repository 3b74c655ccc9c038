//! The verb-level contract consumed by the snapshot manager and friends,
//! plus the adapter that routes each verb to the porcelain executor or the
//! in-process reader per a fixed read/write split.

use std::path::{Path, PathBuf};

use archon_core::ArchonError;

use crate::executor::PorcelainExecutor;
use crate::reader::InProcessReader;
use crate::types::{CommitRef, StatusEntry, TagInfo};

/// The minimal verb set every caller in Archon needs from version control.
/// Implementations may route individual verbs to whichever backend suits
/// them; callers should not assume a single underlying mechanism.
pub trait VcsBackend: Send + Sync {
    fn init(&self) -> Result<(), ArchonError>;
    fn status(&self) -> Result<Vec<StatusEntry>, ArchonError>;
    fn current_branch(&self) -> Result<Option<String>, ArchonError>;
    fn add(&self, paths: &[PathBuf]) -> Result<(), ArchonError>;
    fn commit(&self, message: &str) -> Result<CommitRef, ArchonError>;
    fn tag(&self, name: &str, commit: &CommitRef) -> Result<(), ArchonError>;
    fn list_tags(&self) -> Result<Vec<TagInfo>, ArchonError>;
    fn delete_tag(&self, name: &str) -> Result<(), ArchonError>;
    fn checkout(&self, commit: &CommitRef) -> Result<(), ArchonError>;
    fn diff(&self, from: &CommitRef, to: &CommitRef) -> Result<String, ArchonError>;
    fn clone_from(&self, url: &str, dest: &Path) -> Result<(), ArchonError>;
    fn fetch(&self) -> Result<(), ArchonError>;
    fn pull(&self) -> Result<(), ArchonError>;
    fn push(&self) -> Result<(), ArchonError>;
    fn lfs_init(&self) -> Result<(), ArchonError>;
    fn lfs_track(&self, pattern: &str) -> Result<(), ArchonError>;
}

/// Combines the porcelain executor (writes, remotes, credentials, LFS) with
/// the in-process reader (tag enumeration, commit metadata) behind the
/// single [`VcsBackend`] contract.
pub struct VcsAdapter {
    executor: PorcelainExecutor,
    reader: InProcessReader,
}

impl VcsAdapter {
    #[must_use]
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        let repo_path = repo_path.into();
        Self {
            executor: PorcelainExecutor::new(repo_path.clone()),
            reader: InProcessReader::new(repo_path),
        }
    }

    #[must_use]
    pub fn executor(&self) -> &PorcelainExecutor {
        &self.executor
    }

    #[must_use]
    pub fn reader(&self) -> &InProcessReader {
        &self.reader
    }
}

impl VcsBackend for VcsAdapter {
    fn init(&self) -> Result<(), ArchonError> {
        self.executor.check_available()?;
        self.executor.run(&["init"])?.into_result("init")?;
        Ok(())
    }

    fn status(&self) -> Result<Vec<StatusEntry>, ArchonError> {
        self.executor.check_available()?;
        let output = self.executor.run(&["status", "--porcelain"])?.into_result("status")?;
        Ok(parse_porcelain_status(&output.stdout))
    }

    fn current_branch(&self) -> Result<Option<String>, ArchonError> {
        self.reader.current_branch()
    }

    fn add(&self, paths: &[PathBuf]) -> Result<(), ArchonError> {
        self.executor.check_available()?;
        let mut args = vec!["add".to_string()];
        args.extend(paths.iter().map(|p| p.to_string_lossy().to_string()));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.executor.run(&args)?.into_result("add")?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<CommitRef, ArchonError> {
        self.executor.check_available()?;
        self.executor.run(&["commit", "-m", message])?.into_result("commit")?;
        self.reader.head_commit()
    }

    fn tag(&self, name: &str, commit: &CommitRef) -> Result<(), ArchonError> {
        self.executor.check_available()?;
        self.executor.run(&["tag", name, &commit.0])?.into_result("tag")?;
        Ok(())
    }

    fn list_tags(&self) -> Result<Vec<TagInfo>, ArchonError> {
        self.reader.list_tags()
    }

    fn delete_tag(&self, name: &str) -> Result<(), ArchonError> {
        self.executor.check_available()?;
        self.executor.run(&["tag", "-d", name])?.into_result("tag -d")?;
        Ok(())
    }

    fn checkout(&self, commit: &CommitRef) -> Result<(), ArchonError> {
        self.executor.check_available()?;
        self.executor.run(&["checkout", &commit.0])?.into_result("checkout")?;
        Ok(())
    }

    fn diff(&self, from: &CommitRef, to: &CommitRef) -> Result<String, ArchonError> {
        self.executor.check_available()?;
        let output = self.executor.run(&["diff", &from.0, &to.0])?.into_result("diff")?;
        Ok(output.stdout)
    }

    fn clone_from(&self, url: &str, dest: &Path) -> Result<(), ArchonError> {
        self.executor.check_available()?;
        self.executor
            .run_in(Path::new("."), &["clone", url, &dest.to_string_lossy()])?
            .into_result("clone")?;
        Ok(())
    }

    fn fetch(&self) -> Result<(), ArchonError> {
        self.executor.check_available()?;
        self.executor.run(&["fetch"])?.into_result("fetch")?;
        Ok(())
    }

    fn pull(&self) -> Result<(), ArchonError> {
        self.executor.check_available()?;
        self.executor.run(&["pull"])?.into_result("pull")?;
        Ok(())
    }

    fn push(&self) -> Result<(), ArchonError> {
        self.executor.check_available()?;
        self.executor.run(&["push"])?.into_result("push")?;
        Ok(())
    }

    fn lfs_init(&self) -> Result<(), ArchonError> {
        self.executor.check_available()?;
        self.executor.run(&["lfs", "install", "--local"])?.into_result("lfs install")?;
        Ok(())
    }

    fn lfs_track(&self, pattern: &str) -> Result<(), ArchonError> {
        self.executor.check_available()?;
        self.executor.run(&["lfs", "track", pattern])?.into_result("lfs track")?;
        Ok(())
    }
}

fn parse_porcelain_status(output: &str) -> Vec<StatusEntry> {
    use crate::types::FileStatusKind;

    output
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (code, path) = line.split_at(2.min(line.len()));
            let path = path.trim().to_string();
            let kind = match code.trim() {
                "A" | "AM" => FileStatusKind::Added,
                "M" | "MM" => FileStatusKind::Modified,
                "D" => FileStatusKind::Deleted,
                "R" => FileStatusKind::Renamed,
                "??" => FileStatusKind::Untracked,
                _ => FileStatusKind::Modified,
            };
            if path.is_empty() { None } else { Some(StatusEntry { path, kind }) }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_porcelain_status_lines() {
        let raw = " M src/lib.rs\n?? new_file.txt\nA  added.rs\n";
        let entries = parse_porcelain_status(raw);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].path, "new_file.txt");
    }
}
