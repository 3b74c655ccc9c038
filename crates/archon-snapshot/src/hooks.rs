//! Decouples the snapshot manager from the search index crate, mirroring
//! the autosave/index-sink hook pattern used by the node store: a restore
//! must rebuild the index, but `archon-snapshot` has no reason to depend on
//! `archon-index` directly.

use archon_core::ArchonError;

pub trait IndexRebuildHook: Send + Sync {
    fn rebuild_index(&self) -> Result<(), ArchonError>;
}

#[derive(Debug, Default)]
pub struct NoopIndexRebuildHook;

impl IndexRebuildHook for NoopIndexRebuildHook {
    fn rebuild_index(&self) -> Result<(), ArchonError> {
        Ok(())
    }
}
