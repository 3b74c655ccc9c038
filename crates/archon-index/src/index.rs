//! The search index facade: a bounded-queue writer thread over a tantivy
//! index plus the in-memory catalog, with an availability
//! fallback when the index is disabled.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use archon_core::{codes, ArchonError, ArchonId};
use archon_store::{IndexDelta, IndexSink, Node};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::{doc, Index, IndexWriter, Term};

use crate::catalog::{Catalog, PropertyOp};
use crate::schema::SchemaFields;

const QUEUE_CAPACITY: usize = 1024;
const WRITER_HEAP_BYTES: usize = 32 * 1024 * 1024;

/// Whether a full index queue blocks the caller (interactive edits) or
/// drops the delta and marks the index dirty for a later rebuild (bulk
/// imports).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Interactive,
    Bulk,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub id: ArchonId,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub enum SearchQuery {
    ById(ArchonId),
    NamePrefix(String),
    Property { key: String, op: PropertyOp, value: serde_json::Value },
    FullText(String),
}

enum Command {
    Upsert(Node, Option<ArchonId>),
    Delete(ArchonId),
}

/// The live (non-disabled) index: a tantivy index, its writer thread, and
/// the parallel catalog.
pub struct ActiveIndex {
    index: Index,
    fields: SchemaFields,
    catalog: Arc<Catalog>,
    command_tx: Sender<Command>,
    dirty: Arc<AtomicBool>,
}

pub enum SearchIndex {
    Active(ActiveIndex),
    /// Disabled via `ARCHON_DISABLE_INDEX=1` or `settings.indexDisabled`.
    Disabled,
}

impl SearchIndex {
    pub fn open(index_dir: &Path, force_disabled: bool) -> Result<(Self, Arc<dyn IndexSink>), ArchonError> {
        let disabled = force_disabled
            || std::env::var("ARCHON_DISABLE_INDEX").map(|v| v == "1").unwrap_or(false);
        if disabled {
            tracing::info!(target: "archon.index", "search index disabled");
            return Ok((Self::Disabled, Arc::new(archon_store::NoopIndexSink)));
        }

        let fields = SchemaFields::new();
        std::fs::create_dir_all(index_dir).map_err(|e| ArchonError::io("create index directory", &e))?;
        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(index_dir)
                .map_err(|e| ArchonError::new(codes::INDEX_REBUILD_FAILED, format!("open index: {e}")))?
        } else {
            Index::create_in_dir(index_dir, fields.schema.clone())
                .map_err(|e| ArchonError::new(codes::INDEX_REBUILD_FAILED, format!("create index: {e}")))?
        };

        let writer: IndexWriter = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| ArchonError::new(codes::INDEX_REBUILD_FAILED, format!("open writer: {e}")))?;

        let catalog = Arc::new(Catalog::default());
        let dirty = Arc::new(AtomicBool::new(false));
        let (command_tx, command_rx) = crossbeam_channel::bounded(QUEUE_CAPACITY);

        spawn_writer_thread(writer, fields.clone(), catalog.clone(), command_rx);

        let active = ActiveIndex { index, fields, catalog, command_tx, dirty: dirty.clone() };
        let sink = TantivyIndexSink {
            command_tx: active.command_tx.clone(),
            mode: Mutex::new(ImportMode::Interactive),
            dirty,
        };
        Ok((Self::Active(active), Arc::new(sink)))
    }

    /// Walks every node and rebuilds the index from scratch, reporting
    /// `(done, total)` progress as it goes.
    pub fn rebuild(&self, nodes: &[(Node, Option<ArchonId>)], mut progress: impl FnMut(usize, usize)) -> Result<(), ArchonError> {
        let Self::Active(active) = self else {
            return Err(ArchonError::new(codes::INDEX_UNAVAILABLE, "index is disabled"));
        };
        let mut writer = active
            .index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| ArchonError::new(codes::INDEX_REBUILD_FAILED, format!("open writer: {e}")))?;
        writer
            .delete_all_documents()
            .map_err(|e| ArchonError::new(codes::INDEX_REBUILD_FAILED, format!("clear index: {e}")))?;
        active.catalog.clear();

        let total = nodes.len();
        for (done, (node, parent_id)) in nodes.iter().enumerate() {
            upsert_document(&mut writer, &active.fields, node);
            active.catalog.upsert(node, *parent_id);
            progress(done + 1, total);
        }

        writer
            .commit()
            .map_err(|e| ArchonError::new(codes::INDEX_REBUILD_FAILED, format!("commit rebuild: {e}")))?;
        Ok(())
    }

    pub fn search(&self, query: &SearchQuery, limit: usize) -> Result<Vec<SearchHit>, ArchonError> {
        let Self::Active(active) = self else {
            return Err(ArchonError::new(codes::INDEX_UNAVAILABLE, "index is disabled"));
        };
        let mut hits = match query {
            SearchQuery::ById(id) => active
                .catalog
                .get(*id)
                .map(|entry| vec![SearchHit { id: entry.id, score: 1.0 }])
                .unwrap_or_default(),
            SearchQuery::NamePrefix(prefix) => active
                .catalog
                .by_name_prefix(prefix)
                .into_iter()
                .map(|id| SearchHit { id, score: 1.0 })
                .collect(),
            SearchQuery::Property { key, op, value } => active
                .catalog
                .by_property_predicate(key, *op, value)
                .into_iter()
                .map(|id| SearchHit { id, score: 1.0 })
                .collect(),
            SearchQuery::FullText(text) => self.search_fulltext(active, text, limit)?,
        };
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then(a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }

    fn search_fulltext(&self, active: &ActiveIndex, text: &str, limit: usize) -> Result<Vec<SearchHit>, ArchonError> {
        let reader = active
            .index
            .reader()
            .map_err(|e| ArchonError::new(codes::INDEX_REBUILD_FAILED, format!("open reader: {e}")))?;
        let searcher = reader.searcher();
        let parser = QueryParser::for_index(&active.index, vec![active.fields.fulltext, active.fields.name]);
        let parsed = parser
            .parse_query(text)
            .map_err(|e| ArchonError::new(codes::INDEX_UNAVAILABLE, format!("invalid query: {e}")))?;
        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(limit))
            .map_err(|e| ArchonError::new(codes::INDEX_REBUILD_FAILED, format!("search failed: {e}")))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: tantivy::TantivyDocument = searcher
                .doc(address)
                .map_err(|e| ArchonError::new(codes::INDEX_REBUILD_FAILED, format!("fetch doc: {e}")))?;
            let id_text = doc
                .get_first(active.fields.id)
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if let Ok(id) = id_text.parse::<ArchonId>() {
                hits.push(SearchHit { id, score });
            }
        }
        Ok(hits)
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        match self {
            Self::Active(active) => active.dirty.load(Ordering::SeqCst),
            Self::Disabled => false,
        }
    }
}

fn upsert_document(writer: &mut IndexWriter, fields: &SchemaFields, node: &Node) {
    let id_text = node.id.to_hex();
    writer.delete_term(Term::from_field_text(fields.id, &id_text));

    let mut fulltext_parts = vec![node.name.clone()];
    for (key, value) in &node.properties {
        fulltext_parts.push(key.clone());
        if let Some(text) = value.value.as_str() {
            fulltext_parts.push(text.to_string());
        }
    }

    let document = doc!(
        fields.id => id_text,
        fields.name => node.name.clone(),
        fields.fulltext => fulltext_parts.join(" "),
    );
    let _ = writer.add_document(document);
}

fn spawn_writer_thread(
    mut writer: IndexWriter,
    fields: SchemaFields,
    catalog: Arc<Catalog>,
    command_rx: Receiver<Command>,
) {
    std::thread::spawn(move || {
        while let Ok(command) = command_rx.recv() {
            match command {
                Command::Upsert(node, parent_id) => {
                    upsert_document(&mut writer, &fields, &node);
                    catalog.upsert(&node, parent_id);
                }
                Command::Delete(id) => {
                    writer.delete_term(Term::from_field_text(fields.id, &id.to_hex()));
                    catalog.remove(id);
                }
            }
            // Drain whatever else is queued before paying for a commit.
            while let Ok(next) = command_rx.try_recv() {
                match next {
                    Command::Upsert(node, parent_id) => {
                        upsert_document(&mut writer, &fields, &node);
                        catalog.upsert(&node, parent_id);
                    }
                    Command::Delete(id) => {
                        writer.delete_term(Term::from_field_text(fields.id, &id.to_hex()));
                        catalog.remove(id);
                    }
                }
            }
            if let Err(err) = writer.commit() {
                tracing::warn!(target: "archon.index", error = %err, "index commit failed");
            }
        }
    });
}

/// Implements [`archon_store::IndexSink`] over the writer thread's queue.
pub struct TantivyIndexSink {
    command_tx: Sender<Command>,
    mode: Mutex<ImportMode>,
    dirty: Arc<AtomicBool>,
}

impl TantivyIndexSink {
    pub fn set_import_mode(&self, mode: ImportMode) {
        *self.mode.lock() = mode;
    }
}

impl IndexSink for TantivyIndexSink {
    fn apply(&self, delta: IndexDelta) {
        let command = match delta {
            IndexDelta::Upsert(node, parent_id) => Command::Upsert(node, parent_id),
            IndexDelta::Delete(id) => Command::Delete(id),
        };
        let mode = *self.mode.lock();
        match mode {
            ImportMode::Interactive => {
                if self.command_tx.send(command).is_err() {
                    tracing::warn!(target: "archon.index", "index writer thread is gone; delta dropped");
                }
            }
            ImportMode::Bulk => match self.command_tx.try_send(command) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dirty.store(true, Ordering::SeqCst);
                    tracing::debug!(target: "archon.index", "index queue full during bulk import; marked dirty for rebuild");
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::warn!(target: "archon.index", "index writer thread is gone; delta dropped");
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_mode_marks_dirty_instead_of_blocking_when_queue_is_full() {
        let (command_tx, _command_rx) = crossbeam_channel::bounded(1);
        let dirty = Arc::new(AtomicBool::new(false));
        let sink = TantivyIndexSink {
            command_tx,
            mode: Mutex::new(ImportMode::Bulk),
            dirty: dirty.clone(),
        };

        let node = Node::new(ArchonId::new(), "A".to_string());
        sink.apply(IndexDelta::Upsert(node.clone(), None));
        sink.apply(IndexDelta::Upsert(node, None));

        assert!(dirty.load(Ordering::SeqCst));
    }
}
