//! Owns the on-disk project directory contract: where every file lives,
//! the crash-safe atomic write protocol used to write any of them, and the
//! `project.json` descriptor (settings plus schema version).

mod atomic;
mod layout;
mod project_file;
mod settings;

pub use atomic::{atomic_remove, atomic_write, atomic_write_with};
pub use layout::ProjectLayout;
pub use project_file::{current_schema_version, schema_openness, ProjectFile, SchemaOpenness};
pub use settings::{ProjectSettings, ProxyPolicy, SecretsPolicy};

use std::fs;

use archon_core::{codes, ArchonError};

/// Loads and parses `project.json`. Unknown keys are logged (not rejected),
/// so a project written by a newer engine still opens read-only under I7
/// rather than failing outright on unfamiliar settings.
pub fn load_project_file(layout: &ProjectLayout) -> Result<ProjectFile, ArchonError> {
    let path = layout.project_json();
    let bytes = fs::read(&path).map_err(|e| ArchonError::io("read project.json", &e))?;
    let deserializer = &mut serde_json::Deserializer::from_slice(&bytes);
    let mut unknown_keys = Vec::new();
    let project: ProjectFile = serde_ignored::deserialize(deserializer, |path| {
        unknown_keys.push(path.to_string());
    })
    .map_err(|e| {
        ArchonError::new(codes::SCHEMA_MIGRATION_FAILED, format!("malformed project.json: {e}"))
    })?;

    for key in &unknown_keys {
        tracing::warn!(target: "archon.layout", key = %key, "ignoring unrecognized project.json key");
    }

    Ok(project)
}

/// Serializes and atomically writes `project.json`.
pub fn save_project_file(layout: &ProjectLayout, project: &ProjectFile) -> Result<(), ArchonError> {
    atomic_write_with(&layout.project_json(), |file| {
        serde_json::to_writer_pretty(file, project).map_err(std::io::Error::other)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_core::path::AbsPathBuf;
    use archon_core::ArchonId;
    use tempfile::tempdir;

    #[test]
    fn round_trips_project_file_through_disk() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(AbsPathBuf::new(dir.path().to_path_buf()).unwrap());
        layout.create_skeleton().unwrap();

        let project = ProjectFile::new(ArchonId::new());
        save_project_file(&layout, &project).unwrap();

        let loaded = load_project_file(&layout).unwrap();
        assert_eq!(loaded, project);
    }

    #[test]
    fn unrecognized_settings_keys_are_tolerated() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(AbsPathBuf::new(dir.path().to_path_buf()).unwrap());
        layout.create_skeleton().unwrap();

        let id = ArchonId::new();
        let raw = format!(
            r#"{{"rootId":"{id}","schemaVersion":"1.0.0","settings":{{"fromTheFuture":true}}}}"#,
        );
        fs::write(layout.project_json(), raw).unwrap();

        let loaded = load_project_file(&layout).unwrap();
        assert_eq!(loaded.root_id, id);
    }
}
