//! Named, immutable project snapshots layered over version control: a
//! (commit, tag) pair with a JSON sidecar carrying the metadata a bare tag
//! can't express.

mod hooks;
mod manager;
mod types;
mod validate;

pub use hooks::{IndexRebuildHook, NoopIndexRebuildHook};
pub use manager::SnapshotManager;
pub use types::{SnapshotInfo, SnapshotSidecar};
pub use validate::validate_snapshot_name;

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use archon_core::path::AbsPathBuf;
    use archon_layout::ProjectLayout;
    use archon_vcs::{VcsAdapter, VcsBackend};
    use tempfile::tempdir;

    use super::*;

    fn new_project() -> (tempfile::TempDir, SnapshotManager) {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(AbsPathBuf::new(dir.path().to_path_buf()).unwrap());
        layout.create_skeleton().unwrap();

        let vcs = Arc::new(VcsAdapter::new(dir.path()));
        vcs.init().unwrap();
        fs::write(dir.path().join("project.json"), "{}").unwrap();

        std::process::Command::new("git")
            .args(["-C", &dir.path().to_string_lossy(), "config", "user.email", "test@example.com"])
            .status()
            .unwrap();
        std::process::Command::new("git")
            .args(["-C", &dir.path().to_string_lossy(), "config", "user.name", "Test"])
            .status()
            .unwrap();

        (dir, SnapshotManager::new(layout, vcs))
    }

    #[test]
    fn create_list_and_restore_round_trip() {
        let (_dir, manager) = new_project();
        let created = manager.create("v1", Some("first cut")).unwrap();
        assert_eq!(created.name, "v1");

        let snapshots = manager.list().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].has_sidecar);
        assert_eq!(snapshots[0].description.as_deref(), Some("first cut"));

        manager.restore("v1").unwrap();
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let (_dir, manager) = new_project();
        manager.create("v1", None).unwrap();
        let err = manager.create("v1", None).unwrap_err();
        assert_eq!(err.code(), archon_core::codes::VALIDATION_DUPLICATE_NAME);
    }

    #[test]
    fn delete_removes_sidecar_but_not_commit() {
        let (_dir, manager) = new_project();
        let created = manager.create("v1", None).unwrap();
        manager.delete("v1").unwrap();

        let snapshots = manager.list().unwrap();
        assert!(snapshots.is_empty());

        // The commit itself is still reachable through the VCS backend
        // directly, even though the snapshot's tag is gone.
        let _ = created.commit;
    }

    #[test]
    fn tag_without_sidecar_is_reported_with_inferred_metadata() {
        let (dir, manager) = new_project();
        manager.create("v1", None).unwrap();
        fs::remove_file(dir.path().join(".archon/snapshots/v1.json")).unwrap();

        let snapshots = manager.list().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(!snapshots[0].has_sidecar);
        assert!(snapshots[0].created_at.is_none());
    }
}
