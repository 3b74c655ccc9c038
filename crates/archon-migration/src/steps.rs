//! Ordered, idempotent migration steps. Each step targets the schema
//! version it upgrades a project *to*; the runner applies every step whose
//! target is above the on-disk version and at or below the engine version,
//! in ascending order.

use semver::Version;

use archon_core::{codes, ArchonError};
use archon_layout::ProjectLayout;

pub trait MigrationStep: Send + Sync {
    /// The schema version a project is at once this step has run.
    fn target_version(&self) -> Version;
    fn description(&self) -> &'static str;
    /// Applies the step directly against the on-disk project tree. Must be
    /// safe to call on a tree that has already been migrated (re-running is
    /// a no-op), since the runner's own short-circuit on an up-to-date
    /// `schemaVersion` is not the only thing callers may rely on.
    fn apply(&self, layout: &ProjectLayout) -> Result<(), ArchonError>;
}

/// Backfills a `children` array onto node files written by schema versions
/// that didn't require the key to be present. Current node files always
/// carry it (`#[serde(default)]` on write), so this exists to demonstrate
/// the step mechanism and to cover any hand-edited or externally produced
/// node file that omits it.
pub struct BackfillNodeChildrenStep;

impl MigrationStep for BackfillNodeChildrenStep {
    fn target_version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn description(&self) -> &'static str {
        "backfill missing `children` arrays on node files"
    }

    fn apply(&self, layout: &ProjectLayout) -> Result<(), ArchonError> {
        let nodes_dir = layout.nodes_dir();
        if !nodes_dir.exists() {
            return Ok(());
        }
        for entry in walkdir::WalkDir::new(&nodes_dir).follow_links(false) {
            let entry = entry.map_err(|e| {
                ArchonError::new(codes::IO_READ_FAILED, format!("walking node files: {e}"))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            backfill_one(entry.path())?;
        }
        Ok(())
    }
}

fn backfill_one(path: &std::path::Path) -> Result<(), ArchonError> {
    let bytes = std::fs::read(path).map_err(|e| ArchonError::io("read node file for migration", &e))?;
    let mut value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
        ArchonError::new(codes::SCHEMA_MIGRATION_FAILED, format!("malformed node file {}: {e}", path.display()))
    })?;

    let Some(object) = value.as_object_mut() else {
        return Err(ArchonError::new(
            codes::SCHEMA_MIGRATION_FAILED,
            format!("node file {} is not a JSON object", path.display()),
        ));
    };
    if object.contains_key("children") {
        return Ok(());
    }
    object.insert("children".to_string(), serde_json::Value::Array(Vec::new()));

    let rewritten = serde_json::to_vec_pretty(&value)
        .map_err(|e| ArchonError::new(codes::IO_WRITE_FAILED, format!("failed to serialize migrated node: {e}")))?;
    archon_layout::atomic_write(path, &rewritten)
}

/// All registered steps, in ascending target-version order. A fresh
/// project's schema version already meets or exceeds every step here; the
/// list exists so future schema bumps have somewhere to land.
pub fn ordered_steps() -> Vec<Box<dyn MigrationStep>> {
    let mut steps: Vec<Box<dyn MigrationStep>> = vec![Box::new(BackfillNodeChildrenStep)];
    steps.sort_by_key(|step| step.target_version());
    steps
}

#[cfg(test)]
mod tests {
    use archon_core::path::AbsPathBuf;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn backfill_adds_missing_children_array() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(AbsPathBuf::new(dir.path().to_path_buf()).unwrap());
        layout.create_skeleton().unwrap();
        let node_path = layout.nodes_dir().join("ab").join("deadbeef.json");
        std::fs::create_dir_all(node_path.parent().unwrap()).unwrap();
        std::fs::write(&node_path, br#"{"id":"deadbeef","name":"root"}"#).unwrap();

        BackfillNodeChildrenStep.apply(&layout).unwrap();

        let rewritten: serde_json::Value = serde_json::from_slice(&std::fs::read(&node_path).unwrap()).unwrap();
        assert_eq!(rewritten["children"], serde_json::json!([]));
    }

    #[test]
    fn backfill_is_a_no_op_when_children_already_present() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(AbsPathBuf::new(dir.path().to_path_buf()).unwrap());
        layout.create_skeleton().unwrap();
        let node_path = layout.nodes_dir().join("ab").join("deadbeef.json");
        std::fs::create_dir_all(node_path.parent().unwrap()).unwrap();
        std::fs::write(&node_path, br#"{"id":"deadbeef","name":"root","children":["child1"]}"#).unwrap();

        BackfillNodeChildrenStep.apply(&layout).unwrap();
        BackfillNodeChildrenStep.apply(&layout).unwrap();

        let rewritten: serde_json::Value = serde_json::from_slice(&std::fs::read(&node_path).unwrap()).unwrap();
        assert_eq!(rewritten["children"], serde_json::json!(["child1"]));
    }
}
