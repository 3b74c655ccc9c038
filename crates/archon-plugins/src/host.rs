//! The host API surface plugins call into. This crate only defines the
//! surface and its permission gating; the concrete repository, index, and
//! VCS operations behind it are wired in by whatever embeds the sandbox, via
//! the [`RepoAccess`] and [`UiHost`] traits. This mirrors the
//! `IndexSink`/`AutosaveHook` decoupling used elsewhere: the plugin host
//! never depends on the node store, index, or VCS crates directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use archon_core::{codes, ArchonError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::manifest::Permission;
use crate::network::{NetworkProxyPolicy, NetworkRequest, NetworkResponse};
use crate::permission::PermissionSet;
use crate::secrets::{SecretDescriptor, SecretsStore};

/// A node as seen across the plugin boundary: ids are opaque hex strings
/// rather than `ArchonId`, since plugins never link against `archon-core`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeView {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
    #[serde(default)]
    pub children: Vec<String>,
}

/// A single mutation a plugin wants applied, tagged the way the wire format
/// requires so an untyped JSON payload from wasm still round-trips cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Mutation {
    Create {
        parent_id: String,
        name: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        position: Option<usize>,
    },
    Update {
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<Option<String>>,
        #[serde(default)]
        properties: HashMap<String, Value>,
    },
    Delete {
        id: String,
    },
    Move {
        id: String,
        new_parent_id: String,
        #[serde(default)]
        position: Option<usize>,
    },
    Reorder {
        parent_id: String,
        ordered_child_ids: Vec<String>,
    },
}

/// The repository-facing half of the host API. Implemented by the crate
/// that owns a live `NodeStore`/`SearchIndex`/VCS handle for the open
/// project; every method here corresponds 1:1 to a permissioned host call.
pub trait RepoAccess: Send + Sync {
    fn get_node(&self, id: &str) -> Result<Option<NodeView>, ArchonError>;
    fn list_children(&self, id: &str) -> Result<Vec<String>, ArchonError>;
    fn query(&self, selector: &str, limit: usize) -> Result<Vec<NodeView>, ArchonError>;
    fn apply_mutations(&self, mutations: Vec<Mutation>) -> Result<(), ArchonError>;
    fn commit(&self, message: &str) -> Result<(), ArchonError>;
    fn snapshot(&self, message: &str) -> Result<(), ArchonError>;
    fn index_put(&self, node_id: &str, content: &str) -> Result<(), ArchonError>;
}

/// The UI-facing half of the host API, behind the `ui` permission. The UI
/// shell itself is out of scope here; this is the seam a front end hooks
/// into.
pub trait UiHost: Send + Sync {
    fn register_command(&self, plugin_id: &str, command_id: &str, title: &str) -> Result<(), ArchonError>;
    fn show_panel(&self, plugin_id: &str, panel_id: &str, title: &str) -> Result<(), ArchonError>;
    fn show_modal(&self, plugin_id: &str, title: &str, body: &str) -> Result<(), ArchonError>;
    fn notify(&self, plugin_id: &str, message: &str) -> Result<(), ArchonError>;
}

/// A `UiHost` for headless embeddings (tests, batch tooling) that accepts
/// every call without surfacing anything.
#[derive(Debug, Default)]
pub struct NoopUiHost;

impl UiHost for NoopUiHost {
    fn register_command(&self, _plugin_id: &str, _command_id: &str, _title: &str) -> Result<(), ArchonError> {
        Ok(())
    }
    fn show_panel(&self, _plugin_id: &str, _panel_id: &str, _title: &str) -> Result<(), ArchonError> {
        Ok(())
    }
    fn show_modal(&self, _plugin_id: &str, _title: &str, _body: &str) -> Result<(), ArchonError> {
        Ok(())
    }
    fn notify(&self, _plugin_id: &str, _message: &str) -> Result<(), ArchonError> {
        Ok(())
    }
}

/// Permission-gated dispatcher for one plugin's calls. Every entry point
/// checks the plugin's live grant before touching `repo`/`ui`/`secrets`/
/// `net`, so a revoked or expired permission fails the call rather than the
/// caller having to remember to check.
pub struct HostApi {
    plugin_id: String,
    permissions: PermissionSet,
    repo: Arc<dyn RepoAccess>,
    ui: Arc<dyn UiHost>,
    secrets: Option<Arc<SecretsStore>>,
    net_policy: Option<NetworkProxyPolicy>,
}

impl HostApi {
    pub fn new(
        plugin_id: impl Into<String>,
        permissions: PermissionSet,
        repo: Arc<dyn RepoAccess>,
        ui: Arc<dyn UiHost>,
    ) -> Self {
        Self { plugin_id: plugin_id.into(), permissions, repo, ui, secrets: None, net_policy: None }
    }

    #[must_use]
    pub fn with_secrets(mut self, secrets: Arc<SecretsStore>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    #[must_use]
    pub fn with_network_policy(mut self, policy: NetworkProxyPolicy) -> Self {
        self.net_policy = Some(policy);
        self
    }

    fn require(&self, permission: Permission) -> Result<(), ArchonError> {
        if self.permissions.allows(&permission, SystemTime::now()) {
            Ok(())
        } else {
            Err(ArchonError::new(
                codes::PLUGIN_PERMISSION_DENIED,
                format!("plugin {} lacks permission {}", self.plugin_id, permission.as_declared()),
            ))
        }
    }

    pub fn get_node(&self, id: &str) -> Result<Option<NodeView>, ArchonError> {
        self.require(Permission::ReadRepo)?;
        self.repo.get_node(id)
    }

    pub fn list_children(&self, id: &str) -> Result<Vec<String>, ArchonError> {
        self.require(Permission::ReadRepo)?;
        self.repo.list_children(id)
    }

    pub fn query(&self, selector: &str, limit: usize) -> Result<Vec<NodeView>, ArchonError> {
        self.require(Permission::ReadRepo)?;
        self.repo.query(selector, limit)
    }

    pub fn apply_mutations(&self, mutations: Vec<Mutation>) -> Result<(), ArchonError> {
        self.require(Permission::WriteRepo)?;
        self.repo.apply_mutations(mutations)
    }

    pub fn commit(&self, message: &str) -> Result<(), ArchonError> {
        self.require(Permission::WriteRepo)?;
        self.repo.commit(message)
    }

    pub fn snapshot(&self, message: &str) -> Result<(), ArchonError> {
        self.require(Permission::WriteRepo)?;
        self.repo.snapshot(message)
    }

    pub fn index_put(&self, node_id: &str, content: &str) -> Result<(), ArchonError> {
        self.require(Permission::IndexWrite)?;
        self.repo.index_put(node_id, content)
    }

    pub fn net_request(&self, request: NetworkRequest) -> Result<NetworkResponse, ArchonError> {
        self.require(Permission::Net)?;
        let Some(policy) = &self.net_policy else {
            return Err(ArchonError::new(codes::POLICY_NOT_IMPLEMENTED, "no network proxy policy configured"));
        };
        policy.execute(request)
    }

    pub fn secrets_get(&self, name: &str) -> Result<SecretDescriptor, ArchonError> {
        if !self.permissions.allows_secret(name, SystemTime::now()) {
            return Err(ArchonError::new(
                codes::PLUGIN_PERMISSION_DENIED,
                format!("plugin {} is not scoped to secret {name:?}", self.plugin_id),
            ));
        }
        let Some(secrets) = &self.secrets else {
            return Err(ArchonError::new(codes::AUTH_CREDENTIALS_UNAVAILABLE, "no secrets store configured"));
        };
        secrets.get(name)
    }

    pub fn secrets_list(&self, prefix: &str) -> Result<Vec<String>, ArchonError> {
        let Some(secrets) = &self.secrets else {
            return Err(ArchonError::new(codes::AUTH_CREDENTIALS_UNAVAILABLE, "no secrets store configured"));
        };
        let now = SystemTime::now();
        Ok(secrets
            .list(prefix)?
            .into_iter()
            .filter(|name| self.permissions.allows_secret(name, now))
            .collect())
    }

    pub fn register_command(&self, command_id: &str, title: &str) -> Result<(), ArchonError> {
        self.require(Permission::Ui)?;
        self.ui.register_command(&self.plugin_id, command_id, title)
    }

    pub fn show_panel(&self, panel_id: &str, title: &str) -> Result<(), ArchonError> {
        self.require(Permission::Ui)?;
        self.ui.show_panel(&self.plugin_id, panel_id, title)
    }

    pub fn show_modal(&self, title: &str, body: &str) -> Result<(), ArchonError> {
        self.require(Permission::Ui)?;
        self.ui.show_modal(&self.plugin_id, title, body)
    }

    pub fn notify(&self, message: &str) -> Result<(), ArchonError> {
        self.require(Permission::Ui)?;
        self.ui.notify(&self.plugin_id, message)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::manifest::PermissionGrant;

    #[derive(Default)]
    struct FakeRepo {
        nodes: Mutex<HashMap<String, NodeView>>,
    }

    impl RepoAccess for FakeRepo {
        fn get_node(&self, id: &str) -> Result<Option<NodeView>, ArchonError> {
            Ok(self.nodes.lock().unwrap().get(id).cloned())
        }
        fn list_children(&self, id: &str) -> Result<Vec<String>, ArchonError> {
            Ok(self.nodes.lock().unwrap().get(id).map(|n| n.children.clone()).unwrap_or_default())
        }
        fn query(&self, _selector: &str, _limit: usize) -> Result<Vec<NodeView>, ArchonError> {
            Ok(Vec::new())
        }
        fn apply_mutations(&self, _mutations: Vec<Mutation>) -> Result<(), ArchonError> {
            Ok(())
        }
        fn commit(&self, _message: &str) -> Result<(), ArchonError> {
            Ok(())
        }
        fn snapshot(&self, _message: &str) -> Result<(), ArchonError> {
            Ok(())
        }
        fn index_put(&self, _node_id: &str, _content: &str) -> Result<(), ArchonError> {
            Ok(())
        }
    }

    fn api(permissions: Vec<Permission>) -> HostApi {
        let grants = permissions.into_iter().map(PermissionGrant::permanent).collect();
        HostApi::new("com.example.test", PermissionSet::new(grants), Arc::new(FakeRepo::default()), Arc::new(NoopUiHost))
    }

    #[test]
    fn read_without_permission_is_denied() {
        let host = api(vec![]);
        let err = host.get_node("abc").unwrap_err();
        assert_eq!(err.code(), codes::PLUGIN_PERMISSION_DENIED);
    }

    #[test]
    fn read_with_permission_succeeds() {
        let host = api(vec![Permission::ReadRepo]);
        assert!(host.get_node("abc").unwrap().is_none());
    }

    #[test]
    fn write_requires_write_repo_not_read_repo() {
        let host = api(vec![Permission::ReadRepo]);
        let err = host.apply_mutations(Vec::new()).unwrap_err();
        assert_eq!(err.code(), codes::PLUGIN_PERMISSION_DENIED);
    }

    #[test]
    fn net_without_policy_is_not_implemented() {
        let host = api(vec![Permission::Net]);
        let err = host
            .net_request(NetworkRequest {
                method: "GET".to_string(),
                url: "https://example.com".to_string(),
                headers: HashMap::new(),
                body: None,
                timeout_ms: None,
            })
            .unwrap_err();
        assert_eq!(err.code(), codes::POLICY_NOT_IMPLEMENTED);
    }
}
