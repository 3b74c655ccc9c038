//! The snapshot sidecar record.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use archon_vcs::CommitRef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSidecar {
    pub name: String,
    pub commit_ref: String,
    /// RFC 3339 timestamp.
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A snapshot as presented to callers: the sidecar metadata (inferred when
/// absent) joined with the tag it's built on.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotInfo {
    pub name: String,
    pub commit: CommitRef,
    pub created_at: Option<String>,
    pub description: Option<String>,
    pub labels: Vec<String>,
    /// `false` when the tag exists but its sidecar file does not; metadata
    /// is then inferred from the tag and commit alone.
    pub has_sidecar: bool,
}
