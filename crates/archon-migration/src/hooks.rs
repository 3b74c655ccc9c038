//! The search index is never migrated, only rebuilt. This
//! mirrors the same decoupling used between the snapshot manager and the
//! index crate: migration has no reason to depend on `archon-index`
//! directly, just a signal that a rebuild is due.

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
