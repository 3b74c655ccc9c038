//! The backup-then-migrate flow itself: on open, a project
//! older than the engine's schema is backed up, migrated step by step, and
//! has its search index marked for rebuild; a project newer than the engine
//! opens read-only.

use std::path::PathBuf;
use std::sync::Arc;

use archon_core::{codes, ArchonError};
use archon_layout::{ProjectLayout, SchemaOpenness};

use crate::backup::backup_project;
use crate::hooks::{IndexRebuildHook, NoopIndexRebuildHook};
use crate::steps::ordered_steps;

/// What happened on a call to [`MigrationRunner::run`]. `migrated` is
/// `false` when the on-disk project was already at the engine's schema
/// version — the no-op case re-running migration must produce.
#[derive(Debug, Clone, Default)]
pub struct MigrationOutcome {
    pub backup_path: Option<PathBuf>,
    pub applied_steps: Vec<&'static str>,
    pub migrated: bool,
}

pub struct MigrationRunner {
    index_hook: Arc<dyn IndexRebuildHook>,
}

impl Default for MigrationRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationRunner {
    #[must_use]
    pub fn new() -> Self {
        Self { index_hook: Arc::new(NoopIndexRebuildHook) }
    }

    #[must_use]
    pub fn with_index_hook(mut self, hook: Arc<dyn IndexRebuildHook>) -> Self {
        self.index_hook = hook;
        self
    }

    /// Runs the full flow against an already-opened project directory.
    /// Idempotent: calling this twice in a row performs the backup and
    /// steps only once, returning `migrated: false` the second time.
    pub fn run(&self, layout: &ProjectLayout) -> Result<MigrationOutcome, ArchonError> {
        let mut project = archon_layout::load_project_file(layout)?;

        if matches!(archon_layout::schema_openness(&project.schema_version), SchemaOpenness::ReadOnly) {
            return Err(ArchonError::new(
                codes::SCHEMA_NEWER,
                format!(
                    "project schema {} is newer than this engine's {}; opening read-only",
                    project.schema_version,
                    archon_layout::current_schema_version()
                ),
            ));
        }

        let engine_version = archon_layout::current_schema_version();
        if project.schema_version == engine_version {
            return Ok(MigrationOutcome::default());
        }

        let on_disk_version = project.schema_version.clone();
        let backup_path = backup_project(layout)?;
        tracing::warn!(
            target: "archon.migration",
            from = %on_disk_version,
            to = %engine_version,
            backup = %backup_path.display(),
            "migrating project to current schema version"
        );

        let mut applied = Vec::new();
        for step in ordered_steps() {
            if step.target_version() > on_disk_version && step.target_version() <= engine_version {
                step.apply(layout)?;
                applied.push(step.description());
            }
        }

        project.schema_version = engine_version;
        archon_layout::save_project_file(layout, &project)?;
        self.index_hook.rebuild_index()?;

        Ok(MigrationOutcome { backup_path: Some(backup_path), applied_steps: applied, migrated: true })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use archon_core::path::AbsPathBuf;
    use archon_core::ArchonId;
    use archon_layout::ProjectFile;
    use semver::Version;
    use tempfile::tempdir;

    use super::*;

    fn layout_with_version(version: Version) -> (tempfile::TempDir, ProjectLayout) {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(AbsPathBuf::new(dir.path().to_path_buf()).unwrap());
        layout.create_skeleton().unwrap();
        let mut project = ProjectFile::new(ArchonId::new());
        project.schema_version = version;
        archon_layout::save_project_file(&layout, &project).unwrap();
        (dir, layout)
    }

    #[test]
    fn up_to_date_project_is_a_no_op() {
        let (_dir, layout) = layout_with_version(archon_layout::current_schema_version());
        let outcome = MigrationRunner::new().run(&layout).unwrap();
        assert!(!outcome.migrated);
        assert!(outcome.backup_path.is_none());
    }

    #[test]
    fn newer_schema_opens_read_only() {
        let (_dir, layout) = layout_with_version(Version::new(99, 0, 0));
        let err = MigrationRunner::new().run(&layout).unwrap_err();
        assert_eq!(err.code(), codes::SCHEMA_NEWER);
    }

    #[test]
    fn older_schema_is_backed_up_and_migrated_then_idempotent() {
        let (_dir, layout) = layout_with_version(Version::new(0, 9, 0));

        struct CountingHook(Arc<AtomicUsize>);
        impl IndexRebuildHook for CountingHook {
            fn rebuild_index(&self) -> Result<(), ArchonError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        let rebuilds = Arc::new(AtomicUsize::new(0));
        let runner = MigrationRunner::new().with_index_hook(Arc::new(CountingHook(rebuilds.clone())));

        let first = runner.run(&layout).unwrap();
        assert!(first.migrated);
        assert!(first.backup_path.unwrap().exists());
        assert_eq!(rebuilds.load(Ordering::SeqCst), 1);

        let reloaded = archon_layout::load_project_file(&layout).unwrap();
        assert_eq!(reloaded.schema_version, archon_layout::current_schema_version());

        let second = runner.run(&layout).unwrap();
        assert!(!second.migrated);
        assert_eq!(rebuilds.load(Ordering::SeqCst), 1);
    }
}
