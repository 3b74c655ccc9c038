//! The version control adapter: a porcelain executor for writes,
//! remotes, and LFS, and an in-process reader for latency-sensitive
//! read-mostly paths (tag enumeration, commit metadata), behind one
//! [`VcsBackend`] contract.

mod backend;
mod executor;
mod reader;
mod types;

pub use backend::{VcsAdapter, VcsBackend};
pub use executor::{CommandOutput, PorcelainExecutor};
pub use reader::InProcessReader;
pub use types::{CommitRef, FileStatusKind, StatusEntry, TagInfo};

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn init_repo() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let adapter = VcsAdapter::new(dir.path());
        adapter.init().unwrap();
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        adapter.add(&[dir.path().join("a.txt")]).unwrap();
        std::process::Command::new("git")
            .args(["-C", &dir.path().to_string_lossy(), "config", "user.email", "test@example.com"])
            .status()
            .unwrap();
        std::process::Command::new("git")
            .args(["-C", &dir.path().to_string_lossy(), "config", "user.name", "Test"])
            .status()
            .unwrap();
        dir
    }

    #[test]
    fn init_commit_and_tag_round_trip() {
        let dir = init_repo();
        let adapter = VcsAdapter::new(dir.path());
        let commit = adapter.commit("initial").unwrap();
        adapter.tag("v1", &commit).unwrap();

        let tags = adapter.list_tags().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "v1");
        assert_eq!(tags[0].commit, commit);
    }

    #[test]
    fn status_reports_untracked_files() {
        let dir = init_repo();
        let adapter = VcsAdapter::new(dir.path());
        adapter.commit("initial").unwrap();
        fs::write(dir.path().join("b.txt"), "new").unwrap();

        let status = adapter.status().unwrap();
        assert!(status.iter().any(|e| e.path == "b.txt" && e.kind == FileStatusKind::Untracked));
    }
}
