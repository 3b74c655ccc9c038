//! The node type and its typed property values.

use std::collections::BTreeMap;

use archon_core::{codes, ArchonError, ArchonId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: ArchonId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    #[serde(default)]
    pub children: Vec<ArchonId>,
}

impl Node {
    #[must_use]
    pub fn new(id: ArchonId, name: String) -> Self {
        Self {
            id,
            name,
            description: None,
            properties: BTreeMap::new(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum PropertyTypeHint {
    String,
    Number,
    Boolean,
    Date,
    Attachment,
}

/// An attachment-typed property value's payload. `hash` is the fully
/// qualified `sha256:<hex>` form used on the wire; the attachment
/// store itself works in bare hex and strips the scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub hash: String,
    pub filename: String,
}

impl AttachmentRef {
    #[must_use]
    pub fn new(hash: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            kind: "attachment".to_string(),
            hash: hash.into(),
            filename: filename.into(),
        }
    }

    /// The bare hex digest, with the `sha256:` scheme prefix stripped.
    #[must_use]
    pub fn hex_digest(&self) -> &str {
        self.hash.strip_prefix("sha256:").unwrap_or(&self.hash)
    }
}

/// A property's value, stored as raw JSON rather than a Rust-level tagged
/// union. `type_hint` is the authoritative discriminant; keeping
/// the value itself untyped on the wire means a `date` and a `string` value
/// — both JSON strings — never collide under serde's untagged-enum
/// matching, which always prefers the first structurally-compatible variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PropertyValue {
    pub value: serde_json::Value,
    pub type_hint: PropertyTypeHint,
}

impl PropertyValue {
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            value: serde_json::Value::String(value.into()),
            type_hint: PropertyTypeHint::String,
        }
    }

    #[must_use]
    pub fn number(value: f64) -> Self {
        Self {
            value: serde_json::json!(value),
            type_hint: PropertyTypeHint::Number,
        }
    }

    #[must_use]
    pub fn boolean(value: bool) -> Self {
        Self {
            value: serde_json::Value::Bool(value),
            type_hint: PropertyTypeHint::Boolean,
        }
    }

    /// `value` is an RFC 3339 date-time string.
    #[must_use]
    pub fn date(value: impl Into<String>) -> Self {
        Self {
            value: serde_json::Value::String(value.into()),
            type_hint: PropertyTypeHint::Date,
        }
    }

    #[must_use]
    pub fn attachment(hash: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            value: serde_json::to_value(AttachmentRef::new(hash, filename))
                .expect("AttachmentRef always serializes"),
            type_hint: PropertyTypeHint::Attachment,
        }
    }

    /// Interprets this value as an [`AttachmentRef`]: every attachment-typed
    /// property references a blob in the attachment store.
    pub fn as_attachment_ref(&self) -> Result<AttachmentRef, ArchonError> {
        if self.type_hint != PropertyTypeHint::Attachment {
            return Err(ArchonError::new(
                codes::VALIDATION_MISMATCHED_SET,
                "property value is not attachment-typed",
            ));
        }
        serde_json::from_value(self.value.clone()).map_err(|e| {
            ArchonError::new(
                codes::VALIDATION_MISMATCHED_SET,
                format!("malformed attachment reference: {e}"),
            )
        })
    }
}
