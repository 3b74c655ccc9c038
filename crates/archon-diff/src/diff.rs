//! The tree-to-tree diff algorithm.

use std::collections::{BTreeSet, HashSet};

use crate::change::Change;
use crate::tree::Tree;

/// Computes the ordered list of changes that would turn `a` into `b`.
/// Deterministic: identical inputs always yield byte-identical output,
/// since every group is sorted by `(parentId, position, id, key)`.
#[must_use]
pub fn diff(a: &Tree, b: &Tree) -> Vec<Change> {
    let a_ids: HashSet<_> = a.ids().collect();
    let b_ids: HashSet<_> = b.ids().collect();

    let mut changes = Vec::new();

    for id in b_ids.difference(&a_ids) {
        if let Some(parent_id) = b.parent_of(*id) {
            let position = b.position_in_parent(*id).unwrap_or(0);
            changes.push(Change::Added { id: *id, parent_id, position });
        }
    }

    for id in a_ids.difference(&b_ids) {
        if let Some(parent_id) = a.parent_of(*id) {
            changes.push(Change::Removed { id: *id, parent_id });
        }
    }

    let common: Vec<_> = a_ids.intersection(&b_ids).copied().collect();

    for id in &common {
        let (na, nb) = (a.get(*id).unwrap(), b.get(*id).unwrap());

        if na.name != nb.name {
            changes.push(Change::Renamed { id: *id, old_name: na.name.clone(), new_name: nb.name.clone() });
        }

        if let (Some(old_parent_id), Some(new_parent_id)) = (a.parent_of(*id), b.parent_of(*id)) {
            if old_parent_id != new_parent_id {
                changes.push(Change::Moved {
                    id: *id,
                    old_parent_id,
                    new_parent_id,
                    old_position: a.position_in_parent(*id).unwrap_or(0),
                    new_position: b.position_in_parent(*id).unwrap_or(0),
                });
            }
        }

        if na.description != nb.description {
            changes.push(Change::DescriptionChanged { id: *id, old: na.description.clone(), new: nb.description.clone() });
        }

        let keys: BTreeSet<&String> = na.properties.keys().chain(nb.properties.keys()).collect();
        for key in keys {
            let old_value = na.properties.get(key).cloned();
            let new_value = nb.properties.get(key).cloned();
            if old_value != new_value {
                changes.push(Change::PropertyChanged { id: *id, key: key.clone(), old_value, new_value });
            }
        }
    }

    // A pure intra-parent reorder surfaces once at the parent level, never
    // as per-child Moved entries: only parents whose child *set* is
    // unchanged (nothing added/removed under them) qualify.
    for id in &common {
        let (na, nb) = (a.get(*id).unwrap(), b.get(*id).unwrap());
        let a_set: HashSet<_> = na.children.iter().copied().collect();
        let b_set: HashSet<_> = nb.children.iter().copied().collect();
        if a_set == b_set && na.children != nb.children {
            changes.push(Change::Reordered {
                parent_id: *id,
                old_order: na.children.clone(),
                new_order: nb.children.clone(),
            });
        }
    }

    changes.sort_by(|x, y| x.kind_rank().cmp(&y.kind_rank()).then_with(|| x.sort_key().cmp(&y.sort_key())));
    changes
}
