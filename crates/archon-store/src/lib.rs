//! The authoritative node store: CRUD, move, reorder, and
//! property mutation over `archon-layout`'s sharded node files, with a
//! derived parent index and best-effort index-delta emission.

mod autosave;
mod index_sink;
mod metrics;
mod node;
mod store;

#[cfg(test)]
mod store_iter_tests {
    use archon_core::path::AbsPathBuf;
    use archon_core::ArchonId;
    use archon_layout::ProjectLayout;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn iter_all_enumerates_every_node_with_its_parent() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(AbsPathBuf::new(dir.path().to_path_buf()).unwrap());
        layout.create_skeleton().unwrap();

        let root_id = ArchonId::new();
        archon_layout::atomic_write_with(&layout.node_path(root_id), |file| {
            serde_json::to_writer(file, &Node::new(root_id, "root".to_string())).map_err(std::io::Error::other)
        })
        .unwrap();

        let store = NodeStoreBuilder::default().open(layout, root_id, None).unwrap();
        let lab = store.create(root_id, "Lab", None, None).unwrap();

        let mut all = store.iter_all().unwrap();
        all.sort_by_key(|(node, _)| node.id);
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|(n, parent)| n.id == root_id && parent.is_none()));
        assert!(all.iter().any(|(n, parent)| n.id == lab.id && *parent == Some(root_id)));
    }
}

pub use autosave::{AutosaveHook, NoopAutosaveHook};
pub use index_sink::{IndexDelta, IndexSink, NoopIndexSink};
pub use metrics::{ArchonMetricsSink, NoopMetricsSink, TestMetricsSink, TestMetricsSnapshot};
pub use node::{AttachmentRef, Node, PropertyTypeHint, PropertyValue};
pub use store::{NodeStore, NodeStoreBuilder};

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use archon_core::path::AbsPathBuf;
    use archon_core::{codes, ArchonId};
    use archon_layout::ProjectLayout;
    use tempfile::tempdir;

    use super::*;

    fn open_store() -> (tempfile::TempDir, ProjectLayout, ArchonId, NodeStore) {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(AbsPathBuf::new(dir.path().to_path_buf()).unwrap());
        layout.create_skeleton().unwrap();

        let root_id = ArchonId::new();
        let root = Node::new(root_id, "root".to_string());
        archon_layout::atomic_write_with(&layout.node_path(root_id), |file| {
            serde_json::to_writer(file, &root).map_err(std::io::Error::other)
        })
        .unwrap();

        let store = NodeStoreBuilder::default().open(layout.clone(), root_id, None).unwrap();
        (dir, layout, root_id, store)
    }

    #[test]
    fn create_appends_child_and_is_retrievable() {
        let (_dir, _layout, root_id, store) = open_store();
        let lab = store.create(root_id, "Lab", None, None).unwrap();
        assert_eq!(store.list_children(root_id).unwrap(), vec![lab.id]);
        assert_eq!(store.get(lab.id).unwrap().unwrap().name, "Lab");
    }

    #[test]
    fn duplicate_sibling_name_is_rejected_case_insensitively() {
        let (_dir, _layout, root_id, store) = open_store();
        store.create(root_id, "Sensor", None, None).unwrap();
        let err = store.create(root_id, "sensor", None, None).unwrap_err();
        assert_eq!(err.code(), codes::VALIDATION_DUPLICATE_NAME);
    }

    #[test]
    fn move_updates_parent_membership_and_rejects_cycles() {
        let (_dir, _layout, root_id, store) = open_store();
        let lab = store.create(root_id, "Lab", None, None).unwrap();
        let bench = store.create(lab.id, "Bench 3", None, None).unwrap();

        store.move_node(bench.id, root_id, Some(1)).unwrap();
        assert!(store.list_children(lab.id).unwrap().is_empty());
        assert!(store.list_children(root_id).unwrap().contains(&bench.id));

        let err = store.move_node(root_id, bench.id, None).unwrap_err();
        assert_eq!(err.code(), codes::CONFLICT_CYCLE);
    }

    #[test]
    fn reorder_rejects_non_permutations() {
        let (_dir, _layout, root_id, store) = open_store();
        let a = store.create(root_id, "A", None, None).unwrap();
        let b = store.create(root_id, "B", None, None).unwrap();

        store.reorder(root_id, vec![b.id, a.id]).unwrap();
        assert_eq!(store.list_children(root_id).unwrap(), vec![b.id, a.id]);

        let err = store.reorder(root_id, vec![b.id]).unwrap_err();
        assert_eq!(err.code(), codes::VALIDATION_MISMATCHED_SET);
    }

    #[test]
    fn delete_removes_subtree_and_unlinks_from_parent() {
        let (_dir, _layout, root_id, store) = open_store();
        let lab = store.create(root_id, "Lab", None, None).unwrap();
        let bench = store.create(lab.id, "Bench", None, None).unwrap();

        store.delete(lab.id).unwrap();
        assert!(store.get(lab.id).unwrap().is_none());
        assert!(store.get(bench.id).unwrap().is_none());
        assert!(store.list_children(root_id).unwrap().is_empty());
    }

    #[test]
    fn root_cannot_be_deleted() {
        let (_dir, _layout, root_id, store) = open_store();
        let err = store.delete(root_id).unwrap_err();
        assert_eq!(err.code(), codes::VALIDATION_CANNOT_DELETE_ROOT);
    }

    #[test]
    fn set_and_delete_property_round_trip() {
        let (_dir, _layout, root_id, store) = open_store();
        let lab = store.create(root_id, "Lab", None, None).unwrap();
        let updated = store
            .set_property(lab.id, "max_voltage", PropertyValue::number(30.0))
            .unwrap();
        assert!(updated.properties.contains_key("max_voltage"));

        let updated = store.delete_property(lab.id, "max_voltage").unwrap();
        assert!(!updated.properties.contains_key("max_voltage"));
    }

    #[test]
    fn autosave_hook_fires_on_threshold() {
        struct CountingHook(std::sync::atomic::AtomicU64);
        impl AutosaveHook for CountingHook {
            fn on_autosave_due(&self, _change_count: u64) {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(AbsPathBuf::new(dir.path().to_path_buf()).unwrap());
        layout.create_skeleton().unwrap();
        let root_id = ArchonId::new();
        archon_layout::atomic_write_with(&layout.node_path(root_id), |file| {
            serde_json::to_writer(file, &Node::new(root_id, "root".to_string())).map_err(std::io::Error::other)
        })
        .unwrap();

        let hook = std::sync::Arc::new(CountingHook(std::sync::atomic::AtomicU64::new(0)));
        let store = NodeStoreBuilder::default()
            .autosave_hook(hook.clone())
            .open(layout, root_id, Some(2))
            .unwrap();

        store.create(root_id, "A", None, None).unwrap();
        assert_eq!(hook.0.load(std::sync::atomic::Ordering::SeqCst), 0);
        store.create(root_id, "B", None, None).unwrap();
        assert_eq!(hook.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn reopening_rebuilds_parent_index_from_disk() {
        let (dir, layout, root_id, store) = open_store();
        let lab = store.create(root_id, "Lab", None, None).unwrap();
        drop(store);

        let reopened = NodeStoreBuilder::default().open(layout, root_id, None).unwrap();
        let err = reopened.move_node(lab.id, lab.id, None).unwrap_err();
        assert_eq!(err.code(), codes::CONFLICT_CYCLE);
        drop(dir);
    }

    #[test]
    fn create_with_properties_map() {
        let (_dir, _layout, root_id, store) = open_store();
        let mut props = HashMap::new();
        props.insert("color".to_string(), PropertyValue::string("blue"));
        let node = store.create(root_id, "Widget", None, Some(props)).unwrap();
        assert_eq!(node.properties.len(), 1);
    }

    proptest::proptest! {
        #[test]
        fn reorder_accepts_every_permutation_of_existing_children(perm_seed in 0u64..24) {
            let (_dir, _layout, root_id, store) = open_store();
            let ids: Vec<ArchonId> = (0..4)
                .map(|i| store.create(root_id, &format!("child-{i}"), None, None).unwrap().id)
                .collect();

            // Deterministic pseudo-shuffle over the 4 children, keyed by perm_seed.
            let mut permuted = ids.clone();
            let mut seed = perm_seed;
            for i in (1..permuted.len()).rev() {
                let j = (seed as usize) % (i + 1);
                seed /= (i + 1) as u64;
                permuted.swap(i, j);
            }

            store.reorder(root_id, permuted.clone()).unwrap();
            proptest::prop_assert_eq!(store.list_children(root_id).unwrap(), permuted);
        }
    }
}
