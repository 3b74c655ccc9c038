//! The error envelope that crosses every component and process boundary.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stable `{code, message, details}` value. Every fallible operation in
/// Archon that crosses a component boundary returns this type (or a
/// `Result<T, ArchonError>`), never a component-local error type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchonError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ArchonError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for ArchonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ArchonError {}

/// Namespaced, stable error codes. New codes should extend these modules
/// rather than invent ad hoc strings at call sites.
pub mod codes {
    pub const IO_READ_FAILED: &str = "E_IO_READ_FAILED";
    pub const IO_WRITE_FAILED: &str = "E_IO_WRITE_FAILED";
    pub const IO_NOT_FOUND: &str = "E_IO_NOT_FOUND";

    pub const VALIDATION_NAME_REQUIRED: &str = "E_VALIDATION_NAME_REQUIRED";
    pub const VALIDATION_DUPLICATE_NAME: &str = "E_VALIDATION_DUPLICATE_NAME";
    pub const VALIDATION_MISMATCHED_SET: &str = "E_VALIDATION_MISMATCHED_SET";
    pub const VALIDATION_CANNOT_DELETE_ROOT: &str = "E_VALIDATION_CANNOT_DELETE_ROOT";

    pub const NOT_FOUND: &str = "E_NOT_FOUND";

    pub const CONFLICT_CYCLE: &str = "E_CONFLICT_CYCLE";
    pub const CONFLICT_INVARIANT: &str = "E_CONFLICT_INVARIANT";

    pub const GIT_MISSING: &str = "E_GIT_MISSING";
    pub const GIT_COMMAND_FAILED: &str = "E_GIT_COMMAND_FAILED";
    pub const GIT_TAG_EXISTS: &str = "E_GIT_TAG_EXISTS";

    pub const INDEX_UNAVAILABLE: &str = "E_INDEX_UNAVAILABLE";
    pub const INDEX_REBUILD_FAILED: &str = "E_INDEX_REBUILD_FAILED";

    pub const SCHEMA_NEWER: &str = "E_SCHEMA_NEWER";
    pub const SCHEMA_MIGRATION_FAILED: &str = "E_SCHEMA_MIGRATION_FAILED";

    pub const PLUGIN_RESOURCE: &str = "E_PLUGIN_RESOURCE";
    pub const PLUGIN_PERMISSION_DENIED: &str = "E_PLUGIN_PERMISSION_DENIED";
    pub const PLUGIN_VETO: &str = "E_PLUGIN_VETO";
    pub const PLUGIN_MANIFEST_INVALID: &str = "E_PLUGIN_MANIFEST_INVALID";
    pub const PLUGIN_LOAD_FAILED: &str = "E_PLUGIN_LOAD_FAILED";

    pub const AUTH_CREDENTIALS_UNAVAILABLE: &str = "E_AUTH_CREDENTIALS_UNAVAILABLE";

    pub const CANCELLED: &str = "E_CANCELLED";
    pub const TIMEOUT: &str = "E_TIMEOUT";

    pub const POLICY_HOST: &str = "E_POLICY_HOST";
    pub const POLICY_METHOD: &str = "E_POLICY_METHOD";
    pub const POLICY_NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";
}

/// Shorthand constructors for the most frequently raised envelopes.
impl ArchonError {
    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::new(codes::NOT_FOUND, format!("{what} was not found"))
    }

    pub fn duplicate_name(name: &str) -> Self {
        Self::new(
            codes::VALIDATION_DUPLICATE_NAME,
            format!("a sibling named {name:?} already exists"),
        )
    }

    pub fn name_required() -> Self {
        Self::new(codes::VALIDATION_NAME_REQUIRED, "name must not be empty")
    }

    pub fn io(context: impl fmt::Display, source: &std::io::Error) -> Self {
        let code = if source.kind() == std::io::ErrorKind::NotFound {
            codes::IO_NOT_FOUND
        } else {
            codes::IO_WRITE_FAILED
        };
        Self::new(code, format!("{context}: {source}"))
    }
}
