//! The rebuildable full-text and property search index: a
//! tantivy-backed full-text engine plus an in-memory catalog for id,
//! name-prefix, and property-predicate queries, fed by a bounded-queue
//! writer thread so node-store writes never block on indexing.

mod catalog;
mod index;
mod schema;

pub use catalog::{Catalog, CatalogEntry, PropertyOp};
pub use index::{ActiveIndex, ImportMode, SearchHit, SearchIndex, SearchQuery, TantivyIndexSink};
pub use schema::SchemaFields;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use archon_core::ArchonId;
    use archon_store::{IndexSink, Node, PropertyValue};
    use tempfile::tempdir;

    use super::*;

    fn wait_until_indexed(index: &SearchIndex, query: &SearchQuery) -> Vec<SearchHit> {
        for _ in 0..50 {
            let hits = index.search(query, 10).unwrap();
            if !hits.is_empty() {
                return hits;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        index.search(query, 10).unwrap()
    }

    #[test]
    fn disabled_index_reports_unavailable() {
        let dir = tempdir().unwrap();
        let (index, _sink) = SearchIndex::open(dir.path(), true).unwrap();
        let err = index.search(&SearchQuery::ById(ArchonId::new()), 10).unwrap_err();
        assert_eq!(err.code(), archon_core::codes::INDEX_UNAVAILABLE);
    }

    #[test]
    fn upsert_is_queryable_by_id_and_name_prefix() {
        let dir = tempdir().unwrap();
        let (index, sink) = SearchIndex::open(dir.path(), false).unwrap();

        let node = Node::new(ArchonId::new(), "Laboratory".to_string());
        sink.apply(archon_store::IndexDelta::Upsert(node.clone(), None));

        let by_id = wait_until_indexed(&index, &SearchQuery::ById(node.id));
        assert_eq!(by_id, vec![SearchHit { id: node.id, score: 1.0 }]);

        let by_prefix = wait_until_indexed(&index, &SearchQuery::NamePrefix("lab".to_string()));
        assert_eq!(by_prefix[0].id, node.id);
    }

    #[test]
    fn property_predicate_query() {
        let dir = tempdir().unwrap();
        let (index, sink) = SearchIndex::open(dir.path(), false).unwrap();

        let mut node = Node::new(ArchonId::new(), "Sensor".to_string());
        node.properties.insert("max_voltage".to_string(), PropertyValue::number(48.0));
        sink.apply(archon_store::IndexDelta::Upsert(node.clone(), None));

        let query = SearchQuery::Property {
            key: "max_voltage".to_string(),
            op: PropertyOp::Ge,
            value: serde_json::json!(48.0),
        };
        let hits = wait_until_indexed(&index, &query);
        assert_eq!(hits[0].id, node.id);
    }

    #[test]
    fn delete_removes_from_catalog() {
        let dir = tempdir().unwrap();
        let (index, sink) = SearchIndex::open(dir.path(), false).unwrap();
        let node = Node::new(ArchonId::new(), "Temp".to_string());
        sink.apply(archon_store::IndexDelta::Upsert(node.clone(), None));
        let _ = wait_until_indexed(&index, &SearchQuery::ById(node.id));

        sink.apply(archon_store::IndexDelta::Delete(node.id));
        std::thread::sleep(Duration::from_millis(50));
        let hits = index.search(&SearchQuery::ById(node.id), 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn rebuild_repopulates_from_linear_scan() {
        let dir = tempdir().unwrap();
        let (index, _sink) = SearchIndex::open(dir.path(), false).unwrap();
        let nodes: Vec<(Node, Option<ArchonId>)> =
            (0..5).map(|i| (Node::new(ArchonId::new(), format!("Node {i}")), None)).collect();

        let mut progress_calls = Vec::new();
        index
            .rebuild(&nodes, |done, total| progress_calls.push((done, total)))
            .unwrap();

        assert_eq!(progress_calls.last(), Some(&(5, 5)));
        for (node, _) in &nodes {
            let hits = index.search(&SearchQuery::ById(node.id), 10).unwrap();
            assert_eq!(hits.len(), 1);
        }
    }

}
