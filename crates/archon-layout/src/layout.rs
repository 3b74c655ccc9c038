//! The on-disk directory contract:
//!
//! ```text
//! <root>/project.json
//! <root>/nodes/<shard>/<id>.json
//! <root>/attachments/<first2>/<next2>/<hash>
//! <root>/.archon/index/
//! <root>/.archon/snapshots/<name>.json
//! <root>/.archon/tmp/
//! <root>/.archon/secrets
//! <root>/backups/<ISO8601>/
//! ```

use std::fs;
use std::path::PathBuf;

use archon_core::path::AbsPathBuf;
use archon_core::{ArchonError, ArchonId};

#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: AbsPathBuf,
}

impl ProjectLayout {
    #[must_use]
    pub fn new(root: AbsPathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &AbsPathBuf {
        &self.root
    }

    #[must_use]
    pub fn project_json(&self) -> PathBuf {
        self.root.join("project.json").into_path_buf()
    }

    #[must_use]
    pub fn nodes_dir(&self) -> PathBuf {
        self.root.join("nodes").into_path_buf()
    }

    #[must_use]
    pub fn node_path(&self, id: ArchonId) -> PathBuf {
        self.nodes_dir()
            .join(id.shard_prefix())
            .join(format!("{}.json", id.to_hex()))
    }

    #[must_use]
    pub fn attachments_dir(&self) -> PathBuf {
        self.root.join("attachments").into_path_buf()
    }

    #[must_use]
    pub fn attachment_path(&self, hex_digest: &str) -> PathBuf {
        let (first2, next2, rest) = archon_core::path::two_two_shard(hex_digest);
        self.attachments_dir().join(first2).join(next2).join(rest)
    }

    #[must_use]
    pub fn archon_dir(&self) -> PathBuf {
        self.root.join(".archon").into_path_buf()
    }

    #[must_use]
    pub fn index_dir(&self) -> PathBuf {
        self.archon_dir().join("index")
    }

    #[must_use]
    pub fn snapshots_dir(&self) -> PathBuf {
        self.archon_dir().join("snapshots")
    }

    #[must_use]
    pub fn snapshot_sidecar_path(&self, name: &str) -> PathBuf {
        self.snapshots_dir().join(format!("{name}.json"))
    }

    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.archon_dir().join("tmp")
    }

    #[must_use]
    pub fn secrets_path(&self) -> PathBuf {
        self.archon_dir().join("secrets")
    }

    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups").into_path_buf()
    }

    /// Creates the directory skeleton for a brand-new project.
    pub fn create_skeleton(&self) -> Result<(), ArchonError> {
        for dir in [
            self.nodes_dir(),
            self.attachments_dir(),
            self.index_dir(),
            self.snapshots_dir(),
            self.tmp_dir(),
            self.backups_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|e| ArchonError::io("create project skeleton", &e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn node_path_shards_by_first_two_hex_chars() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(AbsPathBuf::new(dir.path().to_path_buf()).unwrap());
        let id = ArchonId::from_u128(0xABCDEF);
        let path = layout.node_path(id);
        assert_eq!(path.parent().unwrap().file_name().unwrap(), id.shard_prefix().as_str());
        assert_eq!(path.file_name().unwrap(), format!("{}.json", id.to_hex()).as_str());
    }

    #[test]
    fn attachment_path_uses_2_plus_2_sharding() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(AbsPathBuf::new(dir.path().to_path_buf()).unwrap());
        let path = layout.attachment_path("abcdef0123");
        let expected = layout.attachments_dir().join("ab").join("cd").join("ef0123");
        assert_eq!(path, expected);
    }
}
