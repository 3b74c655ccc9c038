//! The node store's outbound edge to the search index. Kept as a trait
//! (rather than a direct dependency on `archon-index`) so the store can be
//! tested without a live index, and so an index write never blocks or fails
//! a node mutation: best-effort, index failure is logged but does not fail
//! the write.

use archon_core::ArchonId;

use crate::node::Node;

#[derive(Debug, Clone, PartialEq)]
pub enum IndexDelta {
    /// `parent_id` is `None` only for the root node, which has no parent.
    Upsert(Node, Option<ArchonId>),
    Delete(ArchonId),
}

pub trait IndexSink: Send + Sync {
    fn apply(&self, delta: IndexDelta);
}

/// Discards every delta. Used when the index is disabled (`ARCHON_DISABLE_INDEX`)
/// or in tests that don't care about index state.
#[derive(Debug, Default)]
pub struct NoopIndexSink;

impl IndexSink for NoopIndexSink {
    fn apply(&self, _delta: IndexDelta) {}
}
