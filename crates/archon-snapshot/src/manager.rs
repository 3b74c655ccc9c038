//! Named, immutable snapshots: a (commit, tag) pair with a JSON sidecar
//! carrying human-facing metadata.

use std::fs;
use std::sync::Arc;

use archon_core::{codes, ArchonError};
use archon_layout::ProjectLayout;
use archon_vcs::{CommitRef, VcsBackend};

use crate::hooks::{IndexRebuildHook, NoopIndexRebuildHook};
use crate::types::{SnapshotInfo, SnapshotSidecar};
use crate::validate::validate_snapshot_name;

pub struct SnapshotManager {
    layout: ProjectLayout,
    vcs: Arc<dyn VcsBackend>,
    index_hook: Arc<dyn IndexRebuildHook>,
}

impl SnapshotManager {
    #[must_use]
    pub fn new(layout: ProjectLayout, vcs: Arc<dyn VcsBackend>) -> Self {
        Self { layout, vcs, index_hook: Arc::new(NoopIndexRebuildHook) }
    }

    #[must_use]
    pub fn with_index_hook(mut self, hook: Arc<dyn IndexRebuildHook>) -> Self {
        self.index_hook = hook;
        self
    }

    /// Stages every tracked file, commits, tags the commit, and writes the
    /// sidecar atomically. Rolls back the tag (and any sidecar already
    /// written) if a later step fails; a completed commit is never undone,
    /// since history is append-only.
    pub fn create(&self, name: &str, description: Option<&str>) -> Result<SnapshotInfo, ArchonError> {
        validate_snapshot_name(name)?;
        if self.sidecar_path(name).exists() {
            return Err(ArchonError::new(
                codes::VALIDATION_DUPLICATE_NAME,
                format!("a snapshot named {name:?} already exists"),
            ));
        }

        self.vcs.add(&[self.layout.root().as_path().to_path_buf()])?;
        let commit = self.vcs.commit(&format!("snapshot: {name}"))?;

        if let Err(err) = self.vcs.tag(name, &commit) {
            return Err(err);
        }

        let sidecar = SnapshotSidecar {
            name: name.to_string(),
            commit_ref: commit.0.clone(),
            created_at: now_rfc3339(),
            description: description.map(str::to_string),
            labels: Vec::new(),
        };
        if let Err(err) = self.write_sidecar(&sidecar) {
            let _ = self.vcs.delete_tag(name);
            return Err(err);
        }

        Ok(SnapshotInfo {
            name: sidecar.name,
            commit,
            created_at: Some(sidecar.created_at),
            description: sidecar.description,
            labels: sidecar.labels,
            has_sidecar: true,
        })
    }

    /// Enumerates tags and joins them with sidecars; a tag lacking a
    /// sidecar is reported with inferred metadata rather than dropped.
    pub fn list(&self) -> Result<Vec<SnapshotInfo>, ArchonError> {
        let mut out = Vec::new();
        for tag in self.vcs.list_tags()? {
            match self.read_sidecar(&tag.name) {
                Ok(Some(sidecar)) => out.push(SnapshotInfo {
                    name: sidecar.name,
                    commit: tag.commit,
                    created_at: Some(sidecar.created_at),
                    description: sidecar.description,
                    labels: sidecar.labels,
                    has_sidecar: true,
                }),
                Ok(None) => out.push(SnapshotInfo {
                    name: tag.name,
                    commit: tag.commit,
                    created_at: None,
                    description: None,
                    labels: Vec::new(),
                    has_sidecar: false,
                }),
                Err(err) => return Err(err),
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// Checks out the snapshot's commit and rebuilds the search index. This
    /// changes the working copy only; history is never rewritten.
    pub fn restore(&self, name: &str) -> Result<(), ArchonError> {
        let commit = self.resolve_commit(name)?;
        self.vcs.checkout(&commit)?;
        self.index_hook.rebuild_index()
    }

    /// Removes the sidecar and the tag; the underlying commit is untouched.
    pub fn delete(&self, name: &str) -> Result<(), ArchonError> {
        let path = self.sidecar_path(name);
        if path.exists() {
            archon_layout::atomic_remove(&path)?;
        }
        self.vcs.delete_tag(name)
    }

    fn resolve_commit(&self, name: &str) -> Result<CommitRef, ArchonError> {
        if let Some(sidecar) = self.read_sidecar(name)? {
            return Ok(CommitRef(sidecar.commit_ref));
        }
        self.vcs
            .list_tags()?
            .into_iter()
            .find(|tag| tag.name == name)
            .map(|tag| tag.commit)
            .ok_or_else(|| ArchonError::not_found(format!("snapshot {name:?}")))
    }

    fn sidecar_path(&self, name: &str) -> std::path::PathBuf {
        self.layout.snapshot_sidecar_path(name)
    }

    fn read_sidecar(&self, name: &str) -> Result<Option<SnapshotSidecar>, ArchonError> {
        let path = self.sidecar_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| ArchonError::io(format!("read snapshot sidecar {name}"), &e))?;
        let sidecar = serde_json::from_slice(&bytes).map_err(|e| {
            ArchonError::new(codes::SCHEMA_MIGRATION_FAILED, format!("malformed snapshot sidecar {name}: {e}"))
        })?;
        Ok(Some(sidecar))
    }

    fn write_sidecar(&self, sidecar: &SnapshotSidecar) -> Result<(), ArchonError> {
        let path = self.sidecar_path(&sidecar.name);
        archon_layout::atomic_write_with(&path, |file| serde_json::to_writer_pretty(file, sidecar).map_err(Into::into))
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
