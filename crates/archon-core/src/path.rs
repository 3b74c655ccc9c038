//! Small path utilities shared across the storage crates.

use std::ops::Deref;
use std::path::{Path, PathBuf};

/// An absolute filesystem path. Kept as a distinct type so APIs that require
/// an already-rooted path (project roots, attachment directories) can't
/// accidentally be handed something relative.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct AbsPathBuf(PathBuf);

#[derive(Debug, thiserror::Error)]
#[error("path {0} is not absolute")]
pub struct NotAbsoluteError(PathBuf);

impl AbsPathBuf {
    pub fn new(path: PathBuf) -> Result<Self, NotAbsoluteError> {
        if path.is_absolute() {
            Ok(Self(path))
        } else {
            Err(NotAbsoluteError(path))
        }
    }

    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    #[must_use]
    pub fn join(&self, segment: impl AsRef<Path>) -> Self {
        Self(self.0.join(segment))
    }

    #[must_use]
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl Deref for AbsPathBuf {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<PathBuf> for AbsPathBuf {
    type Error = NotAbsoluteError;

    fn try_from(value: PathBuf) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Splits a lowercase hex digest into the `first2/next2/rest` shard segments
/// used by both the node store and the attachment store, bounding per-directory
/// fan-out.
#[must_use]
pub fn two_two_shard(hex: &str) -> (String, String, String) {
    let bytes: Vec<char> = hex.chars().collect();
    let first2: String = bytes.iter().take(2).collect();
    let next2: String = bytes.iter().skip(2).take(2).collect();
    let rest: String = bytes.iter().skip(4).collect();
    (first2, next2, rest)
}

/// Splits a key into a single two-character shard prefix, used by the node
/// store (`nodes/<shard>/<id>.json`).
#[must_use]
pub fn two_char_shard(key: &str) -> (String, String) {
    let prefix: String = key.chars().take(2).collect();
    let rest: String = key.to_string();
    (prefix, rest)
}
