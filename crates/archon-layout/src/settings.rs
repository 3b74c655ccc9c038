//! Recognized `project.json` settings. Unknown keys are preserved
//! (round-tripped) rather than rejected, so older settings survive a newer
//! engine that doesn't yet recognize them; `serde_ignored` is used when
//! loading so unrecognized keys are logged rather than silently dropped.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_attachment_threshold_bytes() -> u64 {
    1024 * 1024
}

fn default_returns_values() -> bool {
    false
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectSettings {
    /// Large-file offload cutoff, in bytes.
    #[serde(default = "default_attachment_threshold_bytes")]
    pub attachment_threshold_bytes: u64,
    /// Force-disables the search index regardless of environment.
    pub index_disabled: bool,
    /// Change-count threshold for implicit autosave snapshots. `None` disables autosave.
    pub auto_snapshot_every: Option<u32>,
    /// Network proxy policy for plugin `net_request` calls. `None` disables the proxy entirely.
    pub proxy_policy: Option<ProxyPolicy>,
    /// Secrets-access policy for the plugin host.
    pub secrets_policy: SecretsPolicy,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            attachment_threshold_bytes: default_attachment_threshold_bytes(),
            index_disabled: false,
            auto_snapshot_every: None,
            proxy_policy: None,
            secrets_policy: SecretsPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ProxyPolicy {
    pub allowed_methods: Vec<String>,
    pub allow_host_suffixes: Vec<String>,
    pub deny_host_suffixes: Vec<String>,
    pub redact_response_headers: Vec<String>,
}

impl Default for ProxyPolicy {
    fn default() -> Self {
        Self {
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD"]
                .into_iter()
                .map(String::from)
                .collect(),
            allow_host_suffixes: Vec::new(),
            deny_host_suffixes: Vec::new(),
            redact_response_headers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct SecretsPolicy {
    #[serde(default = "default_returns_values")]
    pub return_values: bool,
}

impl Default for SecretsPolicy {
    fn default() -> Self {
        Self {
            return_values: default_returns_values(),
        }
    }
}
