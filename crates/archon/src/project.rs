//! The `Project` handle: a process-wide "current project" global is
//! replaced by an explicit value every service call takes by parameter,
//! never an ambient global. `Project::open` bootstraps or loads a project
//! directory, runs migration, replays the crash-recovery journal, and
//! wires every component crate behind accessor methods gated by the
//! on-disk schema's read/write posture.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use archon_attachments::{AttachmentStore, GcReport, PutResult};
use archon_core::path::AbsPathBuf;
use archon_core::{codes, ArchonError, ArchonId};
use archon_diff::{Change, Tree};
use archon_index::{SearchHit, SearchIndex, SearchQuery};
use archon_layout::{current_schema_version, schema_openness, ProjectFile, ProjectLayout, SchemaOpenness};
use archon_merge::Conflict;
use archon_migration::{MigrationOutcome, MigrationRunner};
use archon_plugins::{
    GrantAllDeclared, LoadedPlugin, NetworkProxyPolicy, PluginRegistry, RegistryContext, SandboxConfig, SecretsStore,
};
use archon_snapshot::{IndexRebuildHook, SnapshotInfo, SnapshotManager};
use archon_store::{Node, NodeStore, NodeStoreBuilder, PropertyValue};
use archon_vcs::{CommitRef, StatusEntry, VcsAdapter, VcsBackend};
use parking_lot::Mutex;

use crate::recovery;
use crate::repo_access::{LoggingUiHost, ProjectRepoAccess};

/// What happened while opening a project: the migration outcome (empty when
/// already current) and the names of any in-flight multi-file operations
/// the crash-recovery journal completed or discarded.
#[derive(Debug, Clone, Default)]
pub struct OpenOutcome {
    pub migration: MigrationOutcome,
    pub recovered_operations: Vec<String>,
}

struct RebuildIndexHook {
    node_store: Arc<NodeStore>,
    search_index: Arc<SearchIndex>,
}

impl IndexRebuildHook for RebuildIndexHook {
    fn rebuild_index(&self) -> Result<(), ArchonError> {
        self.node_store.reload()?;
        let all = self.node_store.iter_all()?;
        self.search_index.rebuild(&all, |_done, _total| {})
    }
}

fn to_plugin_secrets_policy(policy: archon_layout::SecretsPolicy) -> archon_plugins::SecretsPolicy {
    archon_plugins::SecretsPolicy { return_values: policy.return_values }
}

fn to_plugin_network_policy(policy: &archon_layout::ProxyPolicy) -> NetworkProxyPolicy {
    NetworkProxyPolicy {
        allowed_methods: Some(policy.allowed_methods.clone()),
        allowed_host_suffixes: policy.allow_host_suffixes.clone(),
        denied_host_suffixes: policy.deny_host_suffixes.clone(),
        redact_response_headers: policy.redact_response_headers.clone(),
    }
}

pub struct Project {
    layout: ProjectLayout,
    root_id: ArchonId,
    openness: SchemaOpenness,
    node_store: Arc<NodeStore>,
    search_index: Arc<SearchIndex>,
    attachments: Arc<AttachmentStore>,
    vcs: Arc<dyn VcsBackend>,
    snapshots: Arc<SnapshotManager>,
    plugins: Mutex<PluginRegistry>,
}

impl Project {
    /// Opens the project directory at `root`, bootstrapping a fresh
    /// `project.json` and skeleton if none exists. Runs, in order: journal
    /// replay, schema migration (or a read-only fallback on `E_SCHEMA_NEWER`
    /// rather than failing open outright), and index construction — with an
    /// explicit index rebuild only when migration actually touched the tree.
    pub fn open(root: AbsPathBuf) -> Result<(Self, OpenOutcome), ArchonError> {
        crate::logging::init_tracing();
        let layout = ProjectLayout::new(root);

        if !layout.project_json().exists() {
            layout.create_skeleton()?;
            let project_file = ProjectFile::new(ArchonId::new());
            archon_layout::save_project_file(&layout, &project_file)?;
            let vcs = VcsAdapter::new(layout.root().as_path().to_path_buf());
            vcs.init()?;
        }

        let recovered_operations = recovery::replay(&layout)?;

        let migration = match MigrationRunner::new().run(&layout) {
            Ok(outcome) => outcome,
            Err(err) if err.code() == codes::SCHEMA_NEWER => {
                tracing::warn!(target: "archon.project", error = %err, "opening read-only: on-disk schema is newer than this engine");
                MigrationOutcome::default()
            }
            Err(err) => return Err(err),
        };

        let project_file = archon_layout::load_project_file(&layout)?;
        let openness = schema_openness(&project_file.schema_version);

        let (search_index, index_sink) =
            SearchIndex::open(&layout.index_dir(), project_file.settings.index_disabled)?;
        let search_index = Arc::new(search_index);

        let node_store = Arc::new(NodeStoreBuilder::default().index_sink(Arc::clone(&index_sink)).open(
            layout.clone(),
            project_file.root_id,
            project_file.settings.auto_snapshot_every,
        )?);

        if migration.migrated {
            node_store.reload()?;
            let all = node_store.iter_all()?;
            search_index.rebuild(&all, |_done, _total| {})?;
        }

        let attachments = Arc::new(AttachmentStore::new(
            layout.clone(),
            Some(project_file.settings.attachment_threshold_bytes),
        ));

        let vcs: Arc<dyn VcsBackend> = Arc::new(VcsAdapter::new(layout.root().as_path().to_path_buf()));

        let snapshots = Arc::new(SnapshotManager::new(layout.clone(), Arc::clone(&vcs)).with_index_hook(Arc::new(
            RebuildIndexHook { node_store: Arc::clone(&node_store), search_index: Arc::clone(&search_index) },
        )));

        let secrets = SecretsStore::open(layout.secrets_path(), to_plugin_secrets_policy(project_file.settings.secrets_policy))
            .map(Arc::new)
            .ok();

        let repo_access: Arc<dyn archon_plugins::RepoAccess> = Arc::new(ProjectRepoAccess::new(
            Arc::clone(&node_store),
            Arc::clone(&search_index),
            Arc::clone(&index_sink),
            Arc::clone(&vcs),
            Arc::clone(&snapshots),
            layout.root().as_path().to_path_buf(),
        ));

        let registry_ctx = RegistryContext {
            engine_version: current_schema_version(),
            repo: repo_access,
            ui: Arc::new(LoggingUiHost),
            secrets,
            net_policy: project_file.settings.proxy_policy.as_ref().map(to_plugin_network_policy),
            sandbox_config: SandboxConfig::default(),
        };
        let plugins = Mutex::new(PluginRegistry::new(registry_ctx, Box::new(GrantAllDeclared)));

        let project = Self {
            layout,
            root_id: project_file.root_id,
            openness,
            node_store,
            search_index,
            attachments,
            vcs,
            snapshots,
            plugins,
        };

        Ok((project, OpenOutcome { migration, recovered_operations }))
    }

    /// Ends this project's lifecycle. Every handle this struct owns drops
    /// here rather than at some later, implicit point — making the
    /// lifecycle's end visible at the call site instead of leaving it to
    /// whenever the last `Arc` happens to go out of scope.
    pub fn close(self) {
        tracing::info!(target: "archon.project", root_id = %self.root_id, "project closed");
    }

    #[must_use]
    pub fn root_id(&self) -> ArchonId {
        self.root_id
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.openness == SchemaOpenness::ReadOnly
    }

    #[must_use]
    pub fn root_path(&self) -> PathBuf {
        self.layout.root().as_path().to_path_buf()
    }

    fn require_read_write(&self) -> Result<(), ArchonError> {
        if self.openness == SchemaOpenness::ReadOnly {
            return Err(ArchonError::new(
                codes::SCHEMA_NEWER,
                "project is open read-only: the on-disk schema is newer than this engine",
            ));
        }
        Ok(())
    }

    // -- nodes ---------------------------------------------------

    pub fn get_node(&self, id: ArchonId) -> Result<Option<Node>, ArchonError> {
        self.node_store.get(id)
    }

    pub fn list_children(&self, id: ArchonId) -> Result<Vec<ArchonId>, ArchonError> {
        self.node_store.list_children(id)
    }

    pub fn create_node(
        &self,
        parent_id: ArchonId,
        name: &str,
        description: Option<String>,
        properties: Option<HashMap<String, PropertyValue>>,
    ) -> Result<Node, ArchonError> {
        self.require_read_write()?;
        self.node_store.create(parent_id, name, description, properties)
    }

    pub fn update_node(
        &self,
        id: ArchonId,
        name: Option<&str>,
        description: Option<Option<String>>,
        properties: Option<HashMap<String, PropertyValue>>,
    ) -> Result<Node, ArchonError> {
        self.require_read_write()?;
        self.node_store.update(id, name, description, properties)
    }

    pub fn delete_node(&self, id: ArchonId) -> Result<(), ArchonError> {
        self.require_read_write()?;
        self.node_store.delete(id)
    }

    pub fn move_node(&self, id: ArchonId, new_parent_id: ArchonId, position: Option<usize>) -> Result<Node, ArchonError> {
        self.require_read_write()?;
        self.node_store.move_node(id, new_parent_id, position)
    }

    pub fn reorder_children(&self, parent_id: ArchonId, ordered_child_ids: Vec<ArchonId>) -> Result<(), ArchonError> {
        self.require_read_write()?;
        self.node_store.reorder(parent_id, ordered_child_ids)
    }

    pub fn set_property(&self, id: ArchonId, key: &str, value: PropertyValue) -> Result<Node, ArchonError> {
        self.require_read_write()?;
        self.node_store.set_property(id, key, value)
    }

    pub fn delete_property(&self, id: ArchonId, key: &str) -> Result<Node, ArchonError> {
        self.require_read_write()?;
        self.node_store.delete_property(id, key)
    }

    // -- search ----------------------------------------------------

    pub fn search(&self, query: &SearchQuery, limit: usize) -> Result<Vec<SearchHit>, ArchonError> {
        self.search_index.search(query, limit)
    }

    pub fn rebuild_index(&self) -> Result<(), ArchonError> {
        let all = self.node_store.iter_all()?;
        self.search_index.rebuild(&all, |_done, _total| {})
    }

    // -- attachments -------------------------------------------------

    pub fn put_attachment(&self, bytes: &[u8], filename: Option<&str>) -> Result<PutResult, ArchonError> {
        self.require_read_write()?;
        self.attachments.put(bytes, filename)
    }

    pub fn get_attachment(&self, hash: &str) -> Result<Vec<u8>, ArchonError> {
        self.attachments.get(hash)
    }

    pub fn verify_attachment(&self, hash: &str) -> Result<bool, ArchonError> {
        self.attachments.verify(hash)
    }

    pub fn delete_attachment(&self, hash: &str) -> Result<(), ArchonError> {
        self.require_read_write()?;
        self.attachments.delete(hash)
    }

    pub fn gc_attachments(&self, dry_run: bool) -> Result<GcReport, ArchonError> {
        self.require_read_write()?;
        self.attachments.gc(dry_run)
    }

    // -- version control --------------------------------------------

    pub fn vcs_status(&self) -> Result<Vec<StatusEntry>, ArchonError> {
        self.vcs.status()
    }

    pub fn commit(&self, message: &str) -> Result<CommitRef, ArchonError> {
        self.require_read_write()?;
        self.vcs.add(&[self.root_path()])?;
        self.vcs.commit(message)
    }

    // -- snapshots ---------------------------------------------------

    pub fn create_snapshot(&self, name: &str, description: Option<&str>) -> Result<SnapshotInfo, ArchonError> {
        self.require_read_write()?;
        self.snapshots.create(name, description)
    }

    pub fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, ArchonError> {
        self.snapshots.list()
    }

    pub fn restore_snapshot(&self, name: &str) -> Result<(), ArchonError> {
        self.require_read_write()?;
        self.snapshots.restore(name)
    }

    pub fn delete_snapshot(&self, name: &str) -> Result<(), ArchonError> {
        self.require_read_write()?;
        self.snapshots.delete(name)
    }

    // -- diff/merge across named history points -------------------

    /// Materializes the node tree as it stood at `commit`, by reading every
    /// blob under the node shard prefix directly from history rather than
    /// checking the commit out into the working copy.
    fn tree_at(&self, commit: &CommitRef) -> Result<Tree, ArchonError> {
        let reader = archon_vcs::InProcessReader::new(self.root_path());
        let blobs = reader.read_blobs_under(commit, "nodes")?;
        let mut nodes = Vec::with_capacity(blobs.len());
        for (path, bytes) in blobs {
            if !path.ends_with(".json") {
                continue;
            }
            let node: Node = serde_json::from_slice(&bytes).map_err(|e| {
                ArchonError::new(codes::IO_READ_FAILED, format!("malformed historical node file {path}: {e}"))
            })?;
            nodes.push(node);
        }
        Ok(Tree::build(nodes))
    }

    pub fn diff_commits(&self, from: &CommitRef, to: &CommitRef) -> Result<Vec<Change>, ArchonError> {
        let a = self.tree_at(from)?;
        let b = self.tree_at(to)?;
        Ok(archon_diff::diff(&a, &b))
    }

    pub fn merge_commits(&self, base: &CommitRef, ours: &CommitRef, theirs: &CommitRef) -> Result<(Tree, Vec<Conflict>), ArchonError> {
        let o = self.tree_at(base)?;
        let a = self.tree_at(ours)?;
        let b = self.tree_at(theirs)?;
        Ok(archon_merge::merge(&o, &a, &b))
    }

    // -- plugins ----------------------------------------------------

    pub fn load_plugin(&self, dir: &std::path::Path) -> Result<Arc<LoadedPlugin>, ArchonError> {
        self.require_read_write()?;
        self.plugins.lock().load_plugin_dir(dir)
    }
}
