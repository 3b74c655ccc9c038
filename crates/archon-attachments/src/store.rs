//! The content-addressed attachment store.

use std::collections::HashSet;
use std::fs;

use archon_core::{codes, ArchonError};
use archon_layout::ProjectLayout;
use archon_store::{Node, PropertyTypeHint};

use crate::hash::{bare, hex_digest, qualified};

const DEFAULT_THRESHOLD_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    /// Fully qualified `sha256:<hex>` form.
    pub hash: String,
    pub size: u64,
    pub offloaded: bool,
    /// Echoes the caller-supplied filename, for building an
    /// `AttachmentRef{hash, filename}` property value without a second call.
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GcReport {
    /// Bare hex digests with no surviving reference.
    pub candidates: Vec<String>,
    /// Populated only when the GC actually deleted files (`dry_run == false`).
    pub deleted: Vec<String>,
}

pub struct AttachmentStore {
    layout: ProjectLayout,
    threshold_bytes: u64,
}

impl AttachmentStore {
    #[must_use]
    pub fn new(layout: ProjectLayout, threshold_bytes: Option<u64>) -> Self {
        Self {
            layout,
            threshold_bytes: threshold_bytes.unwrap_or(DEFAULT_THRESHOLD_BYTES),
        }
    }

    /// Stores `bytes`, deduplicating on content hash: if the hash already
    /// exists, the existing entry is returned without rewriting the blob.
    /// `filename` is not stored by the blob layer (content addressing keys
    /// purely on bytes); it is echoed back on [`PutResult`] so the caller
    /// can build an `AttachmentRef{hash, filename}` property value.
    pub fn put(&self, bytes: &[u8], filename: Option<&str>) -> Result<PutResult, ArchonError> {
        let digest = hex_digest(bytes);
        let path = self.layout.attachment_path(&digest);
        let size = bytes.len() as u64;

        if !path.exists() {
            archon_layout::atomic_write(&path, bytes)?;
        }

        Ok(PutResult {
            hash: qualified(&digest),
            size,
            offloaded: size >= self.threshold_bytes,
            filename: filename.map(str::to_string),
        })
    }

    pub fn get(&self, hash: &str) -> Result<Vec<u8>, ArchonError> {
        let path = self.layout.attachment_path(bare(hash));
        fs::read(&path).map_err(|e| ArchonError::io(format!("read attachment {hash}"), &e))
    }

    /// Recomputes the hash of the stored blob and compares it against `hash`.
    pub fn verify(&self, hash: &str) -> Result<bool, ArchonError> {
        let bytes = self.get(hash)?;
        Ok(hex_digest(&bytes) == bare(hash))
    }

    /// Deletes the blob, but only if no node property currently references
    /// it.
    pub fn delete(&self, hash: &str) -> Result<(), ArchonError> {
        let digest = bare(hash).to_string();
        let referenced = self.collect_referenced_hashes()?;
        if referenced.contains(&digest) {
            return Err(ArchonError::new(
                codes::CONFLICT_INVARIANT,
                format!("attachment {hash} is still referenced by at least one node"),
            ));
        }
        archon_layout::atomic_remove(&self.layout.attachment_path(&digest))
    }

    /// Walks every node file, computes the referenced-hash set, and offers
    /// to delete unreferenced blobs. `dry_run` returns the candidate set
    /// without deleting anything.
    pub fn gc(&self, dry_run: bool) -> Result<GcReport, ArchonError> {
        let referenced = self.collect_referenced_hashes()?;
        let stored = self.walk_stored_hashes()?;

        let mut candidates: Vec<String> = stored.difference(&referenced).cloned().collect();
        candidates.sort();

        let mut deleted = Vec::new();
        if !dry_run {
            for digest in &candidates {
                archon_layout::atomic_remove(&self.layout.attachment_path(digest))?;
                deleted.push(digest.clone());
            }
        }

        Ok(GcReport { candidates, deleted })
    }

    fn collect_referenced_hashes(&self) -> Result<HashSet<String>, ArchonError> {
        let mut referenced = HashSet::new();
        let nodes_dir = self.layout.nodes_dir();
        if !nodes_dir.exists() {
            return Ok(referenced);
        }
        for shard_entry in fs::read_dir(&nodes_dir).map_err(|e| ArchonError::io("scan nodes directory", &e))? {
            let shard_entry = shard_entry.map_err(|e| ArchonError::io("read shard entry", &e))?;
            if !shard_entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            for file_entry in
                fs::read_dir(shard_entry.path()).map_err(|e| ArchonError::io("scan node shard", &e))?
            {
                let file_entry = file_entry.map_err(|e| ArchonError::io("read node file entry", &e))?;
                let bytes = fs::read(file_entry.path()).map_err(|e| ArchonError::io("read node file", &e))?;
                let node: Node = serde_json::from_slice(&bytes).map_err(|e| {
                    ArchonError::new(codes::IO_READ_FAILED, format!("malformed node file: {e}"))
                })?;
                for value in node.properties.values() {
                    if value.type_hint == PropertyTypeHint::Attachment {
                        if let Ok(attachment) = value.as_attachment_ref() {
                            referenced.insert(bare(&attachment.hash).to_string());
                        }
                    }
                }
            }
        }
        Ok(referenced)
    }

    fn walk_stored_hashes(&self) -> Result<HashSet<String>, ArchonError> {
        let mut hashes = HashSet::new();
        let root = self.layout.attachments_dir();
        if !root.exists() {
            return Ok(hashes);
        }
        for first2 in fs::read_dir(&root).map_err(|e| ArchonError::io("scan attachments directory", &e))? {
            let first2 = first2.map_err(|e| ArchonError::io("read attachment shard", &e))?;
            if !first2.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let first2_name = first2.file_name().to_string_lossy().to_string();
            for next2 in fs::read_dir(first2.path()).map_err(|e| ArchonError::io("scan attachment shard", &e))? {
                let next2 = next2.map_err(|e| ArchonError::io("read attachment subshard", &e))?;
                if !next2.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    continue;
                }
                let next2_name = next2.file_name().to_string_lossy().to_string();
                for blob in fs::read_dir(next2.path()).map_err(|e| ArchonError::io("scan attachment blobs", &e))? {
                    let blob = blob.map_err(|e| ArchonError::io("read attachment blob entry", &e))?;
                    let rest = blob.file_name().to_string_lossy().to_string();
                    hashes.insert(format!("{first2_name}{next2_name}{rest}"));
                }
            }
        }
        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_core::path::AbsPathBuf;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, AttachmentStore) {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(AbsPathBuf::new(dir.path().to_path_buf()).unwrap());
        layout.create_skeleton().unwrap();
        (dir, AttachmentStore::new(layout, None))
    }

    #[test]
    fn put_is_content_addressed_and_deduplicates() {
        let (_dir, store) = store();
        let a = store.put(b"hello", None).unwrap();
        let b = store.put(b"hello", None).unwrap();
        assert_eq!(a.hash, b.hash);

        let c = store.put(b"world", None).unwrap();
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn put_echoes_the_filename_without_storing_it_on_the_blob() {
        let (_dir, store) = store();
        let put = store.put(b"payload", Some("notes.txt")).unwrap();
        assert_eq!(put.filename.as_deref(), Some("notes.txt"));
        assert_eq!(store.get(&put.hash).unwrap(), b"payload");
    }

    #[test]
    fn get_returns_the_stored_bytes() {
        let (_dir, store) = store();
        let put = store.put(b"payload", None).unwrap();
        assert_eq!(store.get(&put.hash).unwrap(), b"payload");
    }

    #[test]
    fn verify_detects_corruption() {
        let (dir, store) = store();
        let put = store.put(b"payload", None).unwrap();
        assert!(store.verify(&put.hash).unwrap());

        let path = dir.path().join("attachments").join(&put.hash[7..9]).join(&put.hash[9..11]).join(&put.hash[11..]);
        fs::write(path, b"tampered").unwrap();
        assert!(!store.verify(&put.hash).unwrap());
    }

    #[test]
    fn large_blobs_are_flagged_offloaded() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(AbsPathBuf::new(dir.path().to_path_buf()).unwrap());
        layout.create_skeleton().unwrap();
        let store = AttachmentStore::new(layout, Some(4));

        let put = store.put(b"12345", None).unwrap();
        assert!(put.offloaded);
    }

    #[test]
    fn gc_dry_run_reports_without_deleting() {
        let (_dir, store) = store();
        let put = store.put(b"unreferenced", None).unwrap();
        let report = store.gc(true).unwrap();
        assert_eq!(report.candidates, vec![bare(&put.hash).to_string()]);
        assert!(report.deleted.is_empty());
        assert!(store.get(&put.hash).is_ok());
    }

    #[test]
    fn gc_deletes_unreferenced_blobs_when_not_dry_run() {
        let (_dir, store) = store();
        let put = store.put(b"unreferenced", None).unwrap();
        let report = store.gc(false).unwrap();
        assert_eq!(report.deleted, vec![bare(&put.hash).to_string()]);
        assert!(store.get(&put.hash).is_err());
    }
}
