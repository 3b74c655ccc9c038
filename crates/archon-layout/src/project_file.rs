//! `project.json`: the top-level project descriptor.

use archon_core::ArchonId;
use schemars::JsonSchema;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::settings::ProjectSettings;

/// The schema version this build of the engine understands. On-disk
/// projects with a newer `schemaVersion` open read-only.
pub fn current_schema_version() -> Version {
    Version::new(1, 0, 0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub root_id: ArchonId,
    #[schemars(with = "String")]
    pub schema_version: Version,
    #[serde(default)]
    pub settings: ProjectSettings,
}

impl ProjectFile {
    #[must_use]
    pub fn new(root_id: ArchonId) -> Self {
        Self {
            root_id,
            schema_version: current_schema_version(),
            settings: ProjectSettings::default(),
        }
    }
}

/// Whether an on-disk project's schema version permits mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOpenness {
    /// `on_disk <= engine`: the project may be migrated (if older) and mutated.
    ReadWrite,
    /// `on_disk > engine`: open read-only, all mutations fail `E_SCHEMA_NEWER`.
    ReadOnly,
}

#[must_use]
pub fn schema_openness(on_disk: &Version) -> SchemaOpenness {
    if *on_disk > current_schema_version() {
        SchemaOpenness::ReadOnly
    } else {
        SchemaOpenness::ReadWrite
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_on_disk_schema_is_read_only() {
        let newer = Version::new(99, 0, 0);
        assert_eq!(schema_openness(&newer), SchemaOpenness::ReadOnly);
    }

    #[test]
    fn older_or_equal_on_disk_schema_is_read_write() {
        assert_eq!(
            schema_openness(&current_schema_version()),
            SchemaOpenness::ReadWrite
        );
        assert_eq!(
            schema_openness(&Version::new(0, 1, 0)),
            SchemaOpenness::ReadWrite
        );
    }
}
