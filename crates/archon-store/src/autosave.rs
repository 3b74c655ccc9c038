//! Decouples the node store's change counter from the snapshot manager,
//! which the store must not depend on directly (the snapshot manager
//! depends on the version-control adapter, which would otherwise cycle
//! back through the node store).

pub trait AutosaveHook: Send + Sync {
    /// Called once the change counter crosses `autoSnapshotEvery`.
    /// An explicit snapshot does not reset the counter (see the Open
    /// Question resolution in `DESIGN.md`): this fires purely from the
    /// running total of mutations.
    fn on_autosave_due(&self, change_count: u64);
}

#[derive(Debug, Default)]
pub struct NoopAutosaveHook;

impl AutosaveHook for NoopAutosaveHook {
    fn on_autosave_due(&self, _change_count: u64) {}
}
