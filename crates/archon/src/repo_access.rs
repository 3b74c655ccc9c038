//! Concrete `RepoAccess`/`UiHost` implementations wiring the plugin host's
//! decoupled seams to a live `NodeStore`, `SearchIndex`, and VCS backend —
//! the embedding point those traits were built for.

use std::path::PathBuf;
use std::sync::Arc;

use archon_core::{codes, ArchonError, ArchonId};
use archon_index::{SearchIndex, SearchQuery};
use archon_plugins::{Mutation, NodeView, RepoAccess, UiHost};
use archon_snapshot::SnapshotManager;
use archon_store::{IndexDelta, IndexSink, Node, NodeStore, PropertyValue};
use archon_vcs::VcsBackend;

fn parse_id(raw: &str) -> Result<ArchonId, ArchonError> {
    raw.parse()
        .map_err(|_| ArchonError::new(codes::VALIDATION_MISMATCHED_SET, format!("invalid node id {raw:?}")))
}

fn node_to_view(node: &Node) -> NodeView {
    NodeView {
        id: node.id.to_hex(),
        name: node.name.clone(),
        description: node.description.clone(),
        properties: node.properties.iter().map(|(k, v)| (k.clone(), v.value.clone())).collect(),
        children: node.children.iter().map(ArchonId::to_hex).collect(),
    }
}

/// Infers a [`PropertyTypeHint`](archon_store::PropertyTypeHint) from an
/// untyped JSON value crossing the plugin boundary, by its JSON kind — with
/// an attachment reference's tagged object shape special-cased ahead of the
/// generic string/number/bool cases.
fn infer_property_value(value: serde_json::Value) -> PropertyValue {
    match value {
        serde_json::Value::Bool(b) => PropertyValue::boolean(b),
        serde_json::Value::Number(n) => PropertyValue::number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::Object(ref map) if map.get("type").and_then(|v| v.as_str()) == Some("attachment") => {
            let hash = map.get("hash").and_then(|v| v.as_str()).unwrap_or_default();
            let filename = map.get("filename").and_then(|v| v.as_str()).unwrap_or_default();
            PropertyValue::attachment(hash, filename)
        }
        serde_json::Value::String(s) => PropertyValue::string(s),
        other => PropertyValue::string(other.to_string()),
    }
}

/// Wires the plugin host's `repo` permission group to a live project: every
/// method is a thin translation between the plugin-facing string-id/JSON
/// shapes and the node store's typed ones.
pub struct ProjectRepoAccess {
    node_store: Arc<NodeStore>,
    search_index: Arc<SearchIndex>,
    index_sink: Arc<dyn IndexSink>,
    vcs: Arc<dyn VcsBackend>,
    snapshots: Arc<SnapshotManager>,
    root_path: PathBuf,
}

impl ProjectRepoAccess {
    #[must_use]
    pub fn new(
        node_store: Arc<NodeStore>,
        search_index: Arc<SearchIndex>,
        index_sink: Arc<dyn IndexSink>,
        vcs: Arc<dyn VcsBackend>,
        snapshots: Arc<SnapshotManager>,
        root_path: PathBuf,
    ) -> Self {
        Self { node_store, search_index, index_sink, vcs, snapshots, root_path }
    }
}

impl RepoAccess for ProjectRepoAccess {
    fn get_node(&self, id: &str) -> Result<Option<NodeView>, ArchonError> {
        Ok(self.node_store.get(parse_id(id)?)?.as_ref().map(node_to_view))
    }

    fn list_children(&self, id: &str) -> Result<Vec<String>, ArchonError> {
        Ok(self.node_store.list_children(parse_id(id)?)?.iter().map(ArchonId::to_hex).collect())
    }

    /// Resolves `selector` via a small prefix convention (`id:<hex>`,
    /// `name:<prefix>`, otherwise full text) and hydrates each hit back
    /// into a full [`NodeView`] from the node store.
    fn query(&self, selector: &str, limit: usize) -> Result<Vec<NodeView>, ArchonError> {
        let query = if let Some(hex) = selector.strip_prefix("id:") {
            SearchQuery::ById(parse_id(hex)?)
        } else if let Some(prefix) = selector.strip_prefix("name:") {
            SearchQuery::NamePrefix(prefix.to_string())
        } else {
            SearchQuery::FullText(selector.to_string())
        };

        let hits = self.search_index.search(&query, limit)?;
        let mut views = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Some(node) = self.node_store.get(hit.id)? {
                views.push(node_to_view(&node));
            }
        }
        Ok(views)
    }

    fn apply_mutations(&self, mutations: Vec<Mutation>) -> Result<(), ArchonError> {
        for mutation in mutations {
            match mutation {
                Mutation::Create { parent_id, name, description, position } => {
                    let parent_id = parse_id(&parent_id)?;
                    let node = self.node_store.create(parent_id, &name, description, None)?;
                    if let Some(position) = position {
                        let mut siblings = self.node_store.list_children(parent_id)?;
                        siblings.retain(|id| *id != node.id);
                        let clamped = position.min(siblings.len());
                        siblings.insert(clamped, node.id);
                        self.node_store.reorder(parent_id, siblings)?;
                    }
                }
                Mutation::Update { id, name, description, properties } => {
                    let properties = if properties.is_empty() {
                        None
                    } else {
                        Some(properties.into_iter().map(|(k, v)| (k, infer_property_value(v))).collect())
                    };
                    self.node_store.update(parse_id(&id)?, name.as_deref(), description, properties)?;
                }
                Mutation::Delete { id } => {
                    self.node_store.delete(parse_id(&id)?)?;
                }
                Mutation::Move { id, new_parent_id, position } => {
                    self.node_store.move_node(parse_id(&id)?, parse_id(&new_parent_id)?, position)?;
                }
                Mutation::Reorder { parent_id, ordered_child_ids } => {
                    let ids = ordered_child_ids.iter().map(|s| parse_id(s)).collect::<Result<Vec<_>, _>>()?;
                    self.node_store.reorder(parse_id(&parent_id)?, ids)?;
                }
            }
        }
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<(), ArchonError> {
        self.vcs.add(&[self.root_path.clone()])?;
        self.vcs.commit(message)?;
        Ok(())
    }

    fn snapshot(&self, message: &str) -> Result<(), ArchonError> {
        self.snapshots.create(message, None)?;
        Ok(())
    }

    /// Augments the index with plugin-derived `content` without touching
    /// the canonical on-disk node: fetches the real node, appends `content`
    /// to an in-memory-only clone's description, and indexes that clone.
    fn index_put(&self, node_id: &str, content: &str) -> Result<(), ArchonError> {
        let id = parse_id(node_id)?;
        let Some(mut node) = self.node_store.get(id)? else {
            return Err(ArchonError::not_found(format!("node {node_id}")));
        };
        let parent_id = self.node_store.parent_of(id);
        node.description = Some(match node.description {
            Some(existing) => format!("{existing}\n{content}"),
            None => content.to_string(),
        });
        self.index_sink.apply(IndexDelta::Upsert(node, parent_id));
        Ok(())
    }
}

/// A headless [`UiHost`]: the UI shell itself is out of scope here, so
/// every call is logged rather than surfaced anywhere.
#[derive(Debug, Default)]
pub struct LoggingUiHost;

impl UiHost for LoggingUiHost {
    fn register_command(&self, plugin_id: &str, command_id: &str, title: &str) -> Result<(), ArchonError> {
        tracing::info!(target: "archon.ui", plugin_id, command_id, title, "plugin registered a command");
        Ok(())
    }

    fn show_panel(&self, plugin_id: &str, panel_id: &str, title: &str) -> Result<(), ArchonError> {
        tracing::info!(target: "archon.ui", plugin_id, panel_id, title, "plugin requested a panel");
        Ok(())
    }

    fn show_modal(&self, plugin_id: &str, title: &str, body: &str) -> Result<(), ArchonError> {
        tracing::info!(target: "archon.ui", plugin_id, title, body, "plugin requested a modal");
        Ok(())
    }

    fn notify(&self, plugin_id: &str, message: &str) -> Result<(), ArchonError> {
        tracing::info!(target: "archon.ui", plugin_id, message, "plugin notification");
        Ok(())
    }
}
