//! The authoritative in-process node store: CRUD, move,
//! reorder, and property edits over the sharded on-disk node files owned by
//! `archon-layout`.

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use archon_core::{codes, ArchonError, ArchonId};
use archon_layout::ProjectLayout;
use parking_lot::{Mutex, RwLock};

use crate::autosave::{AutosaveHook, NoopAutosaveHook};
use crate::index_sink::{IndexDelta, IndexSink, NoopIndexSink};
use crate::metrics::{ArchonMetricsSink, NoopMetricsSink};
use crate::node::{Node, PropertyValue};

/// Serializes every mutation behind a project-wide write lock. Reads
/// bypass this lock entirely — they read whatever atomically-renamed file
/// state currently exists on disk, which is always internally consistent,
/// never partial.
pub struct NodeStore {
    layout: ProjectLayout,
    root_id: ArchonId,
    write_lock: Mutex<()>,
    parent_index: RwLock<HashMap<ArchonId, ArchonId>>,
    change_counter: AtomicU64,
    autosave_every: Option<u32>,
    index_sink: Arc<dyn IndexSink>,
    metrics: Arc<dyn ArchonMetricsSink>,
    autosave_hook: Arc<dyn AutosaveHook>,
}

pub struct NodeStoreBuilder {
    index_sink: Arc<dyn IndexSink>,
    metrics: Arc<dyn ArchonMetricsSink>,
    autosave_hook: Arc<dyn AutosaveHook>,
}

impl Default for NodeStoreBuilder {
    fn default() -> Self {
        Self {
            index_sink: Arc::new(NoopIndexSink),
            metrics: Arc::new(NoopMetricsSink),
            autosave_hook: Arc::new(NoopAutosaveHook),
        }
    }
}

impl NodeStoreBuilder {
    #[must_use]
    pub fn index_sink(mut self, sink: Arc<dyn IndexSink>) -> Self {
        self.index_sink = sink;
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn ArchonMetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn autosave_hook(mut self, hook: Arc<dyn AutosaveHook>) -> Self {
        self.autosave_hook = hook;
        self
    }

    /// Opens the store, rebuilding the in-memory parent index by scanning
    /// every node file once (I2's reverse edge is always derived, never
    /// stored).
    pub fn open(
        self,
        layout: ProjectLayout,
        root_id: ArchonId,
        autosave_every: Option<u32>,
    ) -> Result<NodeStore, ArchonError> {
        let parent_index = build_parent_index(&layout)?;
        Ok(NodeStore {
            layout,
            root_id,
            write_lock: Mutex::new(()),
            parent_index: RwLock::new(parent_index),
            change_counter: AtomicU64::new(0),
            autosave_every,
            index_sink: self.index_sink,
            metrics: self.metrics,
            autosave_hook: self.autosave_hook,
        })
    }
}

fn build_parent_index(layout: &ProjectLayout) -> Result<HashMap<ArchonId, ArchonId>, ArchonError> {
    let mut index = HashMap::new();
    let nodes_dir = layout.nodes_dir();
    if !nodes_dir.exists() {
        return Ok(index);
    }
    let shard_dirs = fs::read_dir(&nodes_dir).map_err(|e| ArchonError::io("scan nodes directory", &e))?;
    for shard_entry in shard_dirs {
        let shard_entry = shard_entry.map_err(|e| ArchonError::io("read shard entry", &e))?;
        if !shard_entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let files = fs::read_dir(shard_entry.path())
            .map_err(|e| ArchonError::io("scan node shard", &e))?;
        for file_entry in files {
            let file_entry = file_entry.map_err(|e| ArchonError::io("read node file entry", &e))?;
            let bytes = fs::read(file_entry.path())
                .map_err(|e| ArchonError::io("read node file", &e))?;
            let node: Node = serde_json::from_slice(&bytes).map_err(|e| {
                ArchonError::new(
                    codes::IO_READ_FAILED,
                    format!("malformed node file {}: {e}", file_entry.path().display()),
                )
            })?;
            for child in &node.children {
                index.insert(*child, node.id);
            }
        }
    }
    Ok(index)
}

impl NodeStore {
    #[must_use]
    pub fn root_id(&self) -> ArchonId {
        self.root_id
    }

    /// Rebuilds the in-memory parent index from disk, exactly as `open`
    /// does. Needed after something outside this store's own writes changed
    /// the working tree wholesale — a snapshot restore's checkout, or a
    /// migration step that rewrites node files directly.
    pub fn reload(&self) -> Result<(), ArchonError> {
        *self.parent_index.write() = build_parent_index(&self.layout)?;
        Ok(())
    }

    pub fn get(&self, id: ArchonId) -> Result<Option<Node>, ArchonError> {
        self.read_node_opt(id)
    }

    pub fn list_children(&self, id: ArchonId) -> Result<Vec<ArchonId>, ArchonError> {
        Ok(self.require_node(id)?.children)
    }

    pub fn create(
        &self,
        parent_id: ArchonId,
        name: &str,
        description: Option<String>,
        properties: Option<HashMap<String, PropertyValue>>,
    ) -> Result<Node, ArchonError> {
        let _guard = self.write_lock.lock();
        let mut parent = self.require_node(parent_id)?;

        let sibling_names = self.child_names(&parent.children)?;
        let validated_name =
            archon_core::validate_sibling_name(name, sibling_names.iter().map(String::as_str));
        let validated_name = self.record_result("create", validated_name)?;

        let id = ArchonId::new();
        let mut node = Node::new(id, validated_name);
        node.description = description;
        node.properties = properties.unwrap_or_default().into_iter().collect();

        self.write_node(&node)?;
        parent.children.push(id);
        self.write_node(&parent)?;

        self.parent_index.write().insert(id, parent_id);
        self.index_sink.apply(IndexDelta::Upsert(node.clone(), Some(parent_id)));
        self.bump_change_counter();
        Ok(node)
    }

    pub fn update(
        &self,
        id: ArchonId,
        name: Option<&str>,
        description: Option<Option<String>>,
        properties: Option<HashMap<String, PropertyValue>>,
    ) -> Result<Node, ArchonError> {
        let _guard = self.write_lock.lock();
        let mut node = self.require_node(id)?;

        if let Some(name) = name {
            if let Some(parent_id) = self.parent_index.read().get(&id).copied() {
                let parent = self.require_node(parent_id)?;
                let sibling_names = self.child_names_excluding(&parent.children, id)?;
                let validated = archon_core::validate_sibling_name(
                    name,
                    sibling_names.iter().map(String::as_str),
                );
                node.name = self.record_result("update", validated)?;
            } else {
                // Root has no parent and thus no sibling set to validate against.
                node.name = name.to_string();
            }
        }
        if let Some(description) = description {
            node.description = description;
        }
        if let Some(properties) = properties {
            node.properties = properties.into_iter().collect();
        }

        self.write_node(&node)?;
        let parent_id = self.parent_index.read().get(&id).copied();
        self.index_sink.apply(IndexDelta::Upsert(node.clone(), parent_id));
        self.bump_change_counter();
        Ok(node)
    }

    pub fn delete(&self, id: ArchonId) -> Result<(), ArchonError> {
        let _guard = self.write_lock.lock();
        if id == self.root_id {
            let err = ArchonError::new(codes::VALIDATION_CANNOT_DELETE_ROOT, "the root node cannot be deleted");
            self.metrics.record_mutation_error("delete", err.code());
            return Err(err);
        }
        self.require_node(id)?;

        let parent_id = self
            .parent_index
            .read()
            .get(&id)
            .copied()
            .ok_or_else(|| ArchonError::not_found(format!("parent of node {id}")))?;

        let mut subtree = Vec::new();
        self.collect_subtree_depth_first(id, &mut subtree)?;

        // Write the parent with `id` already unlinked before touching any
        // subtree file: a crash here leaves `parent.children` referencing
        // only node files that still exist. Deleting the subtree files
        // first (then the parent) would risk a crash window where the
        // parent's children list points at files that are already gone.
        let mut parent = self.require_node(parent_id)?;
        parent.children.retain(|child| *child != id);
        self.write_node(&parent)?;

        for descendant in &subtree {
            self.delete_node_file(*descendant)?;
            self.parent_index.write().remove(descendant);
            self.index_sink.apply(IndexDelta::Delete(*descendant));
        }

        self.bump_change_counter();
        Ok(())
    }

    pub fn move_node(
        &self,
        id: ArchonId,
        new_parent_id: ArchonId,
        position: Option<usize>,
    ) -> Result<Node, ArchonError> {
        let _guard = self.write_lock.lock();
        let node = self.require_node(id)?;
        self.require_node(new_parent_id)?;

        if new_parent_id == id || self.is_descendant_of(new_parent_id, id)? {
            let err = ArchonError::new(codes::CONFLICT_CYCLE, "cannot move a node under itself or a descendant");
            self.metrics.record_mutation_error("move", err.code());
            return Err(err);
        }

        let old_parent_id = self
            .parent_index
            .read()
            .get(&id)
            .copied()
            .ok_or_else(|| ArchonError::not_found(format!("parent of node {id}")))?;

        let mut new_parent = self.require_node(new_parent_id)?;
        let sibling_names = self.child_names_excluding(&new_parent.children, id)?;
        let validated = archon_core::validate_sibling_name(&node.name, sibling_names.iter().map(String::as_str));
        self.record_result("move", validated)?;

        if new_parent_id == old_parent_id {
            // Repositioning within the same parent: a single read-modify-write,
            // since new_parent and the old parent are the same file.
            new_parent.children.retain(|child| *child != id);
            let clamped = position.unwrap_or(new_parent.children.len()).min(new_parent.children.len());
            new_parent.children.insert(clamped, id);
            self.write_node(&new_parent)?;
        } else {
            let clamped = position.unwrap_or(new_parent.children.len()).min(new_parent.children.len());
            new_parent.children.insert(clamped, id);
            self.write_node(&new_parent)?;

            let mut old_parent = self.require_node(old_parent_id)?;
            old_parent.children.retain(|child| *child != id);
            self.write_node(&old_parent)?;
        }

        self.parent_index.write().insert(id, new_parent_id);
        self.index_sink.apply(IndexDelta::Upsert(node.clone(), Some(new_parent_id)));
        self.bump_change_counter();
        Ok(node)
    }

    pub fn reorder(&self, parent_id: ArchonId, ordered_child_ids: Vec<ArchonId>) -> Result<(), ArchonError> {
        let _guard = self.write_lock.lock();
        let mut parent = self.require_node(parent_id)?;

        let mut current: Vec<ArchonId> = parent.children.clone();
        current.sort();
        let mut proposed = ordered_child_ids.clone();
        proposed.sort();
        if current != proposed {
            let err = ArchonError::new(
                codes::VALIDATION_MISMATCHED_SET,
                "reorder must be a permutation of the existing children",
            );
            self.metrics.record_mutation_error("reorder", err.code());
            return Err(err);
        }

        parent.children = ordered_child_ids;
        self.write_node(&parent)?;
        self.bump_change_counter();
        Ok(())
    }

    pub fn set_property(&self, id: ArchonId, key: &str, value: PropertyValue) -> Result<Node, ArchonError> {
        let _guard = self.write_lock.lock();
        let mut node = self.require_node(id)?;
        node.properties.insert(key.to_string(), value);
        self.write_node(&node)?;
        let parent_id = self.parent_index.read().get(&id).copied();
        self.index_sink.apply(IndexDelta::Upsert(node.clone(), parent_id));
        self.bump_change_counter();
        Ok(node)
    }

    pub fn delete_property(&self, id: ArchonId, key: &str) -> Result<Node, ArchonError> {
        let _guard = self.write_lock.lock();
        let mut node = self.require_node(id)?;
        node.properties.remove(key);
        self.write_node(&node)?;
        let parent_id = self.parent_index.read().get(&id).copied();
        self.index_sink.apply(IndexDelta::Upsert(node.clone(), parent_id));
        self.bump_change_counter();
        Ok(node)
    }

    fn collect_subtree_depth_first(&self, id: ArchonId, out: &mut Vec<ArchonId>) -> Result<(), ArchonError> {
        let node = self.require_node(id)?;
        for child in node.children.clone() {
            self.collect_subtree_depth_first(child, out)?;
        }
        out.push(id);
        Ok(())
    }

    fn is_descendant_of(&self, candidate: ArchonId, ancestor: ArchonId) -> Result<bool, ArchonError> {
        let mut current = candidate;
        loop {
            match self.parent_index.read().get(&current).copied() {
                Some(parent) if parent == ancestor => return Ok(true),
                Some(parent) => current = parent,
                None => return Ok(false),
            }
        }
    }

    fn child_names(&self, children: &[ArchonId]) -> Result<Vec<String>, ArchonError> {
        children.iter().map(|id| Ok(self.require_node(*id)?.name)).collect()
    }

    fn child_names_excluding(&self, children: &[ArchonId], excluded: ArchonId) -> Result<Vec<String>, ArchonError> {
        children
            .iter()
            .filter(|id| **id != excluded)
            .map(|id| Ok(self.require_node(*id)?.name))
            .collect()
    }

    fn require_node(&self, id: ArchonId) -> Result<Node, ArchonError> {
        self.read_node_opt(id)?
            .ok_or_else(|| ArchonError::not_found(format!("node {id}")))
    }

    fn read_node_opt(&self, id: ArchonId) -> Result<Option<Node>, ArchonError> {
        let path = self.layout.node_path(id);
        match fs::read(&path) {
            Ok(bytes) => {
                let node = serde_json::from_slice(&bytes).map_err(|e| {
                    ArchonError::new(codes::IO_READ_FAILED, format!("malformed node file {id}: {e}"))
                })?;
                Ok(Some(node))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ArchonError::io(format!("read node {id}"), &err)),
        }
    }

    fn write_node(&self, node: &Node) -> Result<(), ArchonError> {
        archon_layout::atomic_write_with(&self.layout.node_path(node.id), |file| {
            serde_json::to_writer_pretty(file, node).map_err(std::io::Error::other)
        })
    }

    fn delete_node_file(&self, id: ArchonId) -> Result<(), ArchonError> {
        archon_layout::atomic_remove(&self.layout.node_path(id))
    }

    fn bump_change_counter(&self) {
        self.metrics.record_mutation("mutate");
        let count = self.change_counter.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(every) = self.autosave_every {
            if every > 0 && count % u64::from(every) == 0 {
                self.autosave_hook.on_autosave_due(count);
            }
        }
    }

    /// Records a metrics error for `operation` when `result` is `Err`, then returns it.
    fn record_result<T>(&self, operation: &str, result: Result<T, ArchonError>) -> Result<T, ArchonError> {
        if let Err(ref err) = result {
            self.metrics.record_mutation_error(operation, err.code());
        }
        result
    }

    /// The id of `id`'s parent, or `None` if `id` is the root or unknown.
    /// Derived from the same live parent index `iter_all` snapshots.
    #[must_use]
    pub fn parent_of(&self, id: ArchonId) -> Option<ArchonId> {
        self.parent_index.read().get(&id).copied()
    }

    /// Every node paired with its parent (`None` only for the root),
    /// snapshotted from the live parent index rather than re-walked from
    /// disk. Used to feed a full index rebuild after a restore or schema
    /// migration.
    pub fn iter_all(&self) -> Result<Vec<(Node, Option<ArchonId>)>, ArchonError> {
        let parent_index = self.parent_index.read().clone();
        let mut ids: Vec<ArchonId> = parent_index.keys().copied().collect();
        ids.push(self.root_id);
        ids.sort();
        ids.dedup();

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(node) = self.read_node_opt(id)? {
                out.push((node, parent_index.get(&id).copied()));
            }
        }
        Ok(out)
    }
}
