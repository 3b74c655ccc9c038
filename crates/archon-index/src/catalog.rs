//! An in-memory, tantivy-parallel catalog of node summaries. Kept in
//! lockstep with every tantivy commit by the writer thread, it serves the
//! query kinds tantivy itself isn't a good fit for: exact id lookup,
//! name-prefix, and typed property predicates.

use std::collections::HashMap;

use archon_core::ArchonId;
use archon_store::{Node, PropertyValue};
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
}

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: ArchonId,
    pub name: String,
    pub name_fold: String,
    pub parent_id: Option<ArchonId>,
    pub properties: Vec<(String, PropertyValue)>,
}

impl CatalogEntry {
    fn from_node(node: &Node, parent_id: Option<ArchonId>) -> Self {
        Self {
            id: node.id,
            name: node.name.clone(),
            name_fold: archon_core::fold_key(&node.name),
            parent_id,
            properties: node.properties.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    entries: RwLock<HashMap<ArchonId, CatalogEntry>>,
}

impl Catalog {
    pub fn upsert(&self, node: &Node, parent_id: Option<ArchonId>) {
        self.entries.write().insert(node.id, CatalogEntry::from_node(node, parent_id));
    }

    pub fn remove(&self, id: ArchonId) {
        self.entries.write().remove(&id);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn get(&self, id: ArchonId) -> Option<CatalogEntry> {
        self.entries.read().get(&id).cloned()
    }

    #[must_use]
    pub fn by_name_prefix(&self, prefix: &str) -> Vec<ArchonId> {
        let fold = archon_core::fold_key(prefix);
        let mut hits: Vec<ArchonId> = self
            .entries
            .read()
            .values()
            .filter(|entry| entry.name_fold.starts_with(&fold))
            .map(|entry| entry.id)
            .collect();
        hits.sort();
        hits
    }

    #[must_use]
    pub fn by_property_predicate(&self, key: &str, op: PropertyOp, value: &serde_json::Value) -> Vec<ArchonId> {
        let mut hits: Vec<ArchonId> = self
            .entries
            .read()
            .values()
            .filter(|entry| {
                entry
                    .properties
                    .iter()
                    .any(|(k, v)| k == key && matches_predicate(&v.value, op, value))
            })
            .map(|entry| entry.id)
            .collect();
        hits.sort();
        hits
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matches_predicate(actual: &serde_json::Value, op: PropertyOp, expected: &serde_json::Value) -> bool {
    match op {
        PropertyOp::Eq => actual == expected,
        PropertyOp::Ne => actual != expected,
        PropertyOp::Contains => match (actual.as_str(), expected.as_str()) {
            (Some(haystack), Some(needle)) => haystack.contains(needle),
            _ => false,
        },
        PropertyOp::Lt | PropertyOp::Le | PropertyOp::Gt | PropertyOp::Ge => {
            compare_ordered(actual, expected, op)
        }
    }
}

fn compare_ordered(actual: &serde_json::Value, expected: &serde_json::Value, op: PropertyOp) -> bool {
    let ordering = match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(b)) => Some(a.cmp(b)),
            _ => None,
        },
    };
    let Some(ordering) = ordering else { return false };
    match op {
        PropertyOp::Lt => ordering.is_lt(),
        PropertyOp::Le => ordering.is_le(),
        PropertyOp::Gt => ordering.is_gt(),
        PropertyOp::Ge => ordering.is_ge(),
        PropertyOp::Eq | PropertyOp::Ne | PropertyOp::Contains => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archon_store::PropertyValue;

    #[test]
    fn name_prefix_is_case_insensitive() {
        let catalog = Catalog::default();
        let mut node = Node::new(ArchonId::new(), "Laboratory".to_string());
        node.id = ArchonId::new();
        catalog.upsert(&node, None);
        assert_eq!(catalog.by_name_prefix("lab"), vec![node.id]);
    }

    #[test]
    fn numeric_property_comparison() {
        let catalog = Catalog::default();
        let mut node = Node::new(ArchonId::new(), "N".to_string());
        node.properties.insert("max_voltage".to_string(), PropertyValue::number(48.0));
        catalog.upsert(&node, None);

        let hits = catalog.by_property_predicate("max_voltage", PropertyOp::Gt, &serde_json::json!(30.0));
        assert_eq!(hits, vec![node.id]);

        let hits = catalog.by_property_predicate("max_voltage", PropertyOp::Lt, &serde_json::json!(30.0));
        assert!(hits.is_empty());
    }
}
