//! Read-mostly access to the repository (tag enumeration, commit metadata,
//! branch name) via an in-process object database reader, used when a
//! subprocess round-trip would add needless latency.

use std::path::{Path, PathBuf};

use archon_core::{codes, ArchonError};

use crate::types::{CommitRef, TagInfo};

pub struct InProcessReader {
    repo_path: PathBuf,
}

impl InProcessReader {
    #[must_use]
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self { repo_path: repo_path.into() }
    }

    fn open(&self) -> Result<gix::Repository, ArchonError> {
        gix::open(&self.repo_path)
            .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("open repository: {e}")))
    }

    pub fn current_branch(&self) -> Result<Option<String>, ArchonError> {
        let repo = self.open()?;
        let head = repo
            .head()
            .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("read HEAD: {e}")))?;
        Ok(head.referent_name().map(|name| name.shorten().to_string()))
    }

    pub fn head_commit(&self) -> Result<CommitRef, ArchonError> {
        let repo = self.open()?;
        let id = repo
            .head_id()
            .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("resolve HEAD commit: {e}")))?;
        Ok(CommitRef(id.detach().to_string()))
    }

    /// Enumerates every tag, peeling annotated tags down to the commit they
    /// point at.
    pub fn list_tags(&self) -> Result<Vec<TagInfo>, ArchonError> {
        let repo = self.open()?;
        let platform = repo
            .references()
            .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("enumerate references: {e}")))?;
        let tags = platform
            .tags()
            .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("enumerate tags: {e}")))?;

        let mut out = Vec::new();
        for tag_ref in tags {
            let mut tag_ref =
                tag_ref.map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("read tag reference: {e}")))?;
            let name = tag_ref.name().shorten().to_string();
            let id = tag_ref
                .peel_to_id_in_place()
                .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("peel tag {name}: {e}")))?;
            out.push(TagInfo { name, commit: CommitRef(id.detach().to_string()) });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// Resolves a commit's subject line, used when the snapshot sidecar is
    /// missing and metadata must be inferred from history alone.
    pub fn commit_summary(&self, commit: &CommitRef) -> Result<String, ArchonError> {
        let repo = self.open()?;
        let id = gix::ObjectId::from_hex(commit.0.as_bytes())
            .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("invalid commit id {}: {e}", commit.0)))?;
        let object = repo
            .find_object(id)
            .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("load commit {}: {e}", commit.0)))?;
        let commit = object
            .try_into_commit()
            .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("object is not a commit: {e}")))?;
        let message = commit
            .message()
            .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("read commit message: {e}")))?;
        Ok(message.summary().to_string())
    }

    #[must_use]
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Reads every blob under `prefix` (e.g. `"nodes"`) as it existed in
    /// `commit`, without touching the working tree. Used to materialize a
    /// historical tree for diffing and merging without the
    /// destructive `checkout` a live restore uses.
    pub fn read_blobs_under(&self, commit: &CommitRef, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, ArchonError> {
        let repo = self.open()?;
        let id = gix::ObjectId::from_hex(commit.0.as_bytes())
            .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("invalid commit id {}: {e}", commit.0)))?;
        let commit_obj = repo
            .find_object(id)
            .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("load commit {}: {e}", commit.0)))?
            .try_into_commit()
            .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("object is not a commit: {e}")))?;
        let tree = commit_obj
            .tree()
            .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("load tree for commit {}: {e}", commit.0)))?;

        let mut recorder = gix::traverse::tree::Recorder::default();
        tree.traverse()
            .breadthfirst(&mut recorder)
            .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("walk tree for commit {}: {e}", commit.0)))?;

        let mut out = Vec::new();
        for entry in recorder.records {
            let path = entry.filepath.to_string();
            if !path.starts_with(prefix) || !entry.mode.is_blob() {
                continue;
            }
            let blob = repo
                .find_object(entry.oid)
                .map_err(|e| ArchonError::new(codes::GIT_COMMAND_FAILED, format!("load blob {}: {e}", entry.oid)))?;
            out.push((path, blob.data.clone()));
        }
        Ok(out)
    }
}
