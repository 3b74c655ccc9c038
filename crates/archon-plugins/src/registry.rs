//! Ties manifest parsing, permission grants, sandbox compilation, and
//! lifecycle subscription together into the entry point an embedder uses to
//! load a plugin directory.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use archon_core::{codes, ArchonError};
use semver::Version;

use crate::host::{HostApi, RepoAccess, UiHost};
use crate::lifecycle::{LifecycleBus, LifecycleDecision, LifecycleEvent, LifecycleContext, LifecycleSubscriber};
use crate::manifest::{PermissionGrant, PluginManifest};
use crate::network::NetworkProxyPolicy;
use crate::permission::PermissionSet;
use crate::sandbox::{PluginModule, SandboxConfig};
use crate::secrets::SecretsStore;

const MANIFEST_FILE_NAME: &str = "plugin.toml";

/// A plugin that has been validated, sandboxed, and wired to a live host API.
/// Holds everything needed to invoke it and to route lifecycle events to it.
pub struct LoadedPlugin {
    manifest: PluginManifest,
    module: Arc<PluginModule>,
    host: Arc<HostApi>,
}

impl LoadedPlugin {
    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn module(&self) -> &PluginModule {
        &self.module
    }

    pub fn host(&self) -> &Arc<HostApi> {
        &self.host
    }

    pub fn invoke<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        request: &Req,
    ) -> Result<Resp, ArchonError> {
        self.module.invoke(&self.host, request)
    }
}

/// Invoked once per loaded plugin to let the embedder turn its declared
/// permissions into live grants (e.g. by consulting whatever the user
/// approved at install time). Declining a requested permission simply
/// omits it from the returned grants; the manifest's declared set is the
/// ceiling, not a guarantee.
pub trait PermissionGrantor {
    fn grants_for(&self, manifest: &PluginManifest) -> Vec<PermissionGrant>;
}

/// Grants every permission the manifest declares, with no expiry. Useful for
/// tests and for trusted first-party plugins; a real UI-backed grantor would
/// prompt the user and likely time-box some grants.
#[derive(Debug, Default)]
pub struct GrantAllDeclared;

impl PermissionGrantor for GrantAllDeclared {
    fn grants_for(&self, manifest: &PluginManifest) -> Vec<PermissionGrant> {
        manifest.permissions.iter().cloned().map(PermissionGrant::permanent).collect()
    }
}

/// A subscriber that delegates lifecycle events back into the plugin's own
/// wasm module via the same invoke ABI used for everything else, so a
/// plugin's `beforeCommit`/`beforeSnapshot` hook looks like any other call
/// from the guest's point of view.
struct PluginLifecycleSubscriber {
    plugin_id: String,
    module: Arc<PluginModule>,
    host: Arc<HostApi>,
}

#[derive(serde::Serialize)]
struct LifecycleInvokeRequest<'a> {
    event: &'static str,
    message: Option<&'a str>,
}

#[derive(serde::Deserialize)]
#[serde(tag = "decision", rename_all = "camelCase")]
enum LifecycleInvokeResponse {
    Proceed,
    Veto { reason: String },
}

impl LifecycleSubscriber for PluginLifecycleSubscriber {
    fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    fn on_event(&self, event: LifecycleEvent, ctx: &LifecycleContext) -> LifecycleDecision {
        let request = LifecycleInvokeRequest { event: lifecycle_event_name(event), message: ctx.message.as_deref() };
        match self.module.invoke::<_, LifecycleInvokeResponse>(&self.host, &request) {
            Ok(LifecycleInvokeResponse::Proceed) => LifecycleDecision::Proceed,
            Ok(LifecycleInvokeResponse::Veto { reason }) => LifecycleDecision::Veto { reason },
            Err(err) => {
                tracing::warn!(plugin_id = %self.plugin_id, error = %err, "plugin lifecycle invoke failed; treating as proceed");
                LifecycleDecision::Proceed
            }
        }
    }
}

fn lifecycle_event_name(event: LifecycleEvent) -> &'static str {
    match event {
        LifecycleEvent::BeforeCommit => "beforeCommit",
        LifecycleEvent::AfterCommit => "afterCommit",
        LifecycleEvent::BeforeSnapshot => "beforeSnapshot",
        LifecycleEvent::AfterSnapshot => "afterSnapshot",
        LifecycleEvent::OnPull => "onPull",
        LifecycleEvent::MergeStart => "mergeStart",
        LifecycleEvent::MergeEnd => "mergeEnd",
    }
}

/// Shared host-side wiring passed to every plugin a registry loads: the
/// repository/UI seams, the optional secrets store and network policy, and
/// the engine version manifests are checked against.
pub struct RegistryContext {
    pub engine_version: Version,
    pub repo: Arc<dyn RepoAccess>,
    pub ui: Arc<dyn UiHost>,
    pub secrets: Option<Arc<SecretsStore>>,
    pub net_policy: Option<NetworkProxyPolicy>,
    pub sandbox_config: SandboxConfig,
}

/// Loads plugin directories (each holding a `plugin.toml` and its wasm entry
/// point), validates and sandboxes them, and subscribes any that want
/// lifecycle events onto a shared bus.
pub struct PluginRegistry {
    ctx: RegistryContext,
    grantor: Box<dyn PermissionGrantor>,
    lifecycle: LifecycleBus,
    loaded: Vec<Arc<LoadedPlugin>>,
}

impl PluginRegistry {
    pub fn new(ctx: RegistryContext, grantor: Box<dyn PermissionGrantor>) -> Self {
        Self { ctx, grantor, lifecycle: LifecycleBus::new(), loaded: Vec::new() }
    }

    pub fn lifecycle(&self) -> &LifecycleBus {
        &self.lifecycle
    }

    pub fn loaded_plugins(&self) -> &[Arc<LoadedPlugin>] {
        &self.loaded
    }

    /// Loads a single plugin from a directory containing `plugin.toml` and
    /// the wasm module named by its `entryPoint`.
    pub fn load_plugin_dir(&mut self, dir: &Path) -> Result<Arc<LoadedPlugin>, ArchonError> {
        let manifest_path = dir.join(MANIFEST_FILE_NAME);
        let manifest_src = std::fs::read_to_string(&manifest_path)
            .map_err(|e| ArchonError::io(format!("read {}", manifest_path.display()), &e))?;
        let manifest = PluginManifest::parse_toml(&manifest_src)?;

        if !manifest.compatible_with(&self.ctx.engine_version) {
            return Err(ArchonError::new(
                codes::PLUGIN_MANIFEST_INVALID,
                format!(
                    "plugin {} requires archonVersion {} but engine is {}",
                    manifest.id, manifest.archon_version, self.ctx.engine_version
                ),
            ));
        }

        let entry_path = resolve_entry_point(dir, &manifest.entry_point)?;
        let wasm_bytes = std::fs::read(&entry_path)
            .map_err(|e| ArchonError::io(format!("read {}", entry_path.display()), &e))?;
        let module = PluginModule::compile(manifest.id.clone(), &wasm_bytes, self.ctx.sandbox_config.clone())?;

        let grants = self.grantor.grants_for(&manifest);
        let permissions = PermissionSet::new(grants);

        let mut host = HostApi::new(manifest.id.clone(), permissions, Arc::clone(&self.ctx.repo), Arc::clone(&self.ctx.ui));
        if let Some(secrets) = &self.ctx.secrets {
            host = host.with_secrets(Arc::clone(secrets));
        }
        if let Some(policy) = &self.ctx.net_policy {
            host = host.with_network_policy(policy.clone());
        }
        let host = Arc::new(host);
        let module = Arc::new(module);

        self.lifecycle.subscribe(Arc::new(PluginLifecycleSubscriber {
            plugin_id: manifest.id.clone(),
            module: Arc::clone(&module),
            host: Arc::clone(&host),
        }));

        let loaded = Arc::new(LoadedPlugin { manifest, module, host });
        self.loaded.push(Arc::clone(&loaded));

        Ok(loaded)
    }
}

/// Rejects an `entryPoint` containing `..` or absolute-path components
/// before joining it, since `Path::join`/`starts_with` don't normalize and
/// so can't be trusted to catch traversal after the fact.
fn resolve_entry_point(dir: &Path, entry_point: &str) -> Result<PathBuf, ArchonError> {
    let entry = Path::new(entry_point);
    let escapes = entry
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(ArchonError::new(codes::PLUGIN_MANIFEST_INVALID, "entryPoint escapes the plugin directory"));
    }
    Ok(dir.join(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NoopUiHost;
    use tempfile::tempdir;

    #[derive(Default)]
    struct EmptyRepo;
    impl RepoAccess for EmptyRepo {
        fn get_node(&self, _id: &str) -> Result<Option<crate::host::NodeView>, ArchonError> {
            Ok(None)
        }
        fn list_children(&self, _id: &str) -> Result<Vec<String>, ArchonError> {
            Ok(Vec::new())
        }
        fn query(&self, _selector: &str, _limit: usize) -> Result<Vec<crate::host::NodeView>, ArchonError> {
            Ok(Vec::new())
        }
        fn apply_mutations(&self, _mutations: Vec<crate::host::Mutation>) -> Result<(), ArchonError> {
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

    fn ctx() -> RegistryContext {
        RegistryContext {
            engine_version: Version::new(0, 1, 0),
            repo: Arc::new(EmptyRepo::default()),
            ui: Arc::new(NoopUiHost),
            secrets: None,
            net_policy: None,
            sandbox_config: SandboxConfig::default(),
        }
    }

    #[test]
    fn rejects_incompatible_engine_version() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("plugin.toml"),
            r#"
                id = "com.example.incompatible"
                name = "Incompatible"
                version = "1.0.0"
                type = "importer"
                entryPoint = "plugin.wasm"
                archonVersion = "^99"
            "#,
        )
        .unwrap();
        std::fs::write(dir.path().join("plugin.wasm"), b"not-real-wasm").unwrap();

        let mut registry = PluginRegistry::new(ctx(), Box::new(GrantAllDeclared));
        let err = registry.load_plugin_dir(dir.path()).unwrap_err();
        assert_eq!(err.code(), codes::PLUGIN_MANIFEST_INVALID);
    }

    #[test]
    fn rejects_entry_point_paths_that_escape_the_plugin_directory() {
        let dir = tempdir().unwrap();
        let err = resolve_entry_point(dir.path(), "../../etc/passwd").unwrap_err();
        assert_eq!(err.code(), codes::PLUGIN_MANIFEST_INVALID);
    }
}
