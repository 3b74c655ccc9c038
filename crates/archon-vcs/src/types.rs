//! Value types shared between the porcelain executor and the in-process
//! reader.

use std::fmt;

/// A resolved commit identifier (the full hex object id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitRef(pub String);

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub name: String,
    pub commit: CommitRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatusKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Untracked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub path: String,
    pub kind: FileStatusKind,
}
