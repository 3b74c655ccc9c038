use std::time::SystemTime;

use archon_core::{codes, ArchonError};
use semver::{Version, VersionReq};
use serde::Deserialize;

/// The typed role a plugin declares in its manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PluginRole {
    Importer,
    Exporter,
    Transformer,
    Validator,
    Provider,
    AttachmentProcessor,
    ConflictResolver,
    SearchIndexer,
    UiContribution,
    Panel,
}

/// A single granted (or grantable) permission. `Secrets` carries the glob
/// pattern the plugin is scoped to, matched with
/// [`archon_core::sanitize::glob_suffix_match`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Permission {
    ReadRepo,
    WriteRepo,
    Attachments,
    Net,
    IndexWrite,
    Ui,
    Secrets(String),
}

impl Permission {
    pub fn as_declared(&self) -> String {
        match self {
            Permission::ReadRepo => "readRepo".to_string(),
            Permission::WriteRepo => "writeRepo".to_string(),
            Permission::Attachments => "attachments".to_string(),
            Permission::Net => "net".to_string(),
            Permission::IndexWrite => "indexWrite".to_string(),
            Permission::Ui => "ui".to_string(),
            Permission::Secrets(pattern) => format!("secrets:{pattern}"),
        }
    }
}

impl std::str::FromStr for Permission {
    type Err = ArchonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "readRepo" => Ok(Permission::ReadRepo),
            "writeRepo" => Ok(Permission::WriteRepo),
            "attachments" => Ok(Permission::Attachments),
            "net" => Ok(Permission::Net),
            "indexWrite" => Ok(Permission::IndexWrite),
            "ui" => Ok(Permission::Ui),
            other => match other.strip_prefix("secrets:") {
                Some(pattern) if !pattern.is_empty() => Ok(Permission::Secrets(pattern.to_string())),
                _ => Err(ArchonError::new(
                    codes::PLUGIN_MANIFEST_INVALID,
                    format!("unknown permission {other:?}"),
                )),
            },
        }
    }
}

impl TryFrom<String> for Permission {
    type Error = ArchonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub integrity_hash: Option<String>,
}

/// A plugin's declared manifest, deserialized from its `plugin.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    #[serde(deserialize_with = "deserialize_semver")]
    pub version: Version,
    #[serde(rename = "type")]
    pub role: PluginRole,
    pub entry_point: String,
    #[serde(deserialize_with = "deserialize_semver_req")]
    pub archon_version: VersionReq,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub metadata: PluginMetadata,
}

impl PluginManifest {
    pub fn parse_toml(src: &str) -> Result<Self, ArchonError> {
        let manifest: PluginManifest = toml::from_str(src)
            .map_err(|e| ArchonError::new(codes::PLUGIN_MANIFEST_INVALID, format!("invalid plugin manifest: {e}")))?;
        validate_plugin_id(&manifest.id)?;
        Ok(manifest)
    }

    /// Whether this manifest is compatible with the running engine version.
    pub fn compatible_with(&self, engine_version: &Version) -> bool {
        self.archon_version.matches(engine_version)
    }
}

fn deserialize_semver<'de, D>(deserializer: D) -> Result<Version, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Version::parse(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_semver_req<'de, D>(deserializer: D) -> Result<VersionReq, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    VersionReq::parse(&raw).map_err(serde::de::Error::custom)
}

/// Validates the reverse-domain plugin id: lowercase `[a-z0-9.-]`, must
/// contain a dot, and may not start, end, or double up on dots.
pub fn validate_plugin_id(id: &str) -> Result<(), ArchonError> {
    let invalid = || ArchonError::new(codes::PLUGIN_MANIFEST_INVALID, format!("invalid plugin id {id:?}"));

    if id.is_empty() || !id.contains('.') {
        return Err(invalid());
    }
    if id.starts_with('.') || id.ends_with('.') || id.contains("..") {
        return Err(invalid());
    }
    if !id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-') {
        return Err(invalid());
    }
    Ok(())
}

/// A permission grant with an optional expiry; the host re-checks expiry on
/// every use rather than once at install time.
#[derive(Debug, Clone)]
pub struct PermissionGrant {
    pub permission: Permission,
    pub expires_at: Option<SystemTime>,
}

impl PermissionGrant {
    pub fn permanent(permission: Permission) -> Self {
        Self { permission, expires_at: None }
    }

    pub fn until(permission: Permission, expires_at: SystemTime) -> Self {
        Self { permission, expires_at: Some(expires_at) }
    }

    pub fn is_live(&self, now: SystemTime) -> bool {
        match self.expires_at {
            Some(expiry) => now <= expiry,
            None => true,
        }
    }
}
