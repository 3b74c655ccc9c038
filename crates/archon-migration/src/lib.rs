//! Schema migration for on-disk Archon projects: backup-then-migrate on
//! open, ordered idempotent steps, and a hook for the caller to trigger an
//! index rebuild afterward (the index itself is never migrated).

mod backup;
mod hooks;
mod runner;
mod steps;

pub use backup::backup_project;
pub use hooks::{IndexRebuildHook, NoopIndexRebuildHook};
pub use runner::{MigrationOutcome, MigrationRunner};
pub use steps::{ordered_steps, MigrationStep};
