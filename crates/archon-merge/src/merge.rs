//! Three-way merge: given a common ancestor and two descendant
//! trees, produces a merged tree plus the conflicts that required a
//! fallback decision.

use std::collections::{BTreeSet, HashMap, HashSet};

use archon_core::ArchonId;
use archon_diff::Tree;
use archon_store::{Node, PropertyValue};

use crate::conflict::Conflict;
use crate::field::merge_field;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    A,
    B,
}

/// Decided content (ignoring children) for a kept id, plus conflicts raised
/// while deciding it.
struct Resolved {
    name: String,
    description: Option<String>,
    properties: HashMap<String, PropertyValue>,
}

fn content_equal(a: &Node, b: &Node) -> bool {
    a.name == b.name && a.description == b.description && a.properties == b.properties
}

/// Merges `a` and `b` against their common ancestor `o`.
pub fn merge(o: &Tree, a: &Tree, b: &Tree) -> (Tree, Vec<Conflict>) {
    let mut conflicts = Vec::new();
    let mut kept: HashMap<ArchonId, Resolved> = HashMap::new();

    let all_ids: BTreeSet<ArchonId> = o.ids().chain(a.ids()).chain(b.ids()).collect();

    for id in all_ids {
        let (in_o, in_a, in_b) = (o.contains(id), a.contains(id), b.contains(id));
        match (in_o, in_a, in_b) {
            (true, true, true) => {
                let (on, an, bn) = (o.get(id).unwrap(), a.get(id).unwrap(), b.get(id).unwrap());
                kept.insert(id, resolve_triple(on, an, bn, &mut conflicts, id));
            }
            (true, true, false) => {
                let (on, an) = (o.get(id).unwrap(), a.get(id).unwrap());
                if content_equal(on, an) {
                    // A left it untouched; B's removal wins.
                } else {
                    conflicts.push(Conflict::DeleteEdit { id });
                    kept.insert(id, resolve_one(on));
                }
            }
            (true, false, true) => {
                let (on, bn) = (o.get(id).unwrap(), b.get(id).unwrap());
                if content_equal(on, bn) {
                    // B left it untouched; A's removal wins.
                } else {
                    conflicts.push(Conflict::DeleteEdit { id });
                    kept.insert(id, resolve_one(on));
                }
            }
            (true, false, false) => {
                // Removed on both sides; nothing to keep.
            }
            (false, true, true) => {
                let (an, bn) = (a.get(id).unwrap(), b.get(id).unwrap());
                if content_equal(an, bn) {
                    kept.insert(id, resolve_one(an));
                } else {
                    conflicts.push(Conflict::DuplicateAdd { id });
                    kept.insert(id, resolve_one(an));
                }
            }
            (false, true, false) => {
                kept.insert(id, resolve_one(a.get(id).unwrap()));
            }
            (false, false, true) => {
                kept.insert(id, resolve_one(b.get(id).unwrap()));
            }
            (false, false, false) => unreachable!("id came from one of the three id sets"),
        }
    }

    let kept_ids: HashSet<ArchonId> = kept.keys().copied().collect();
    let parents = resolve_parents(o, a, b, &kept_ids, &mut conflicts);
    let orders = resolve_orders(o, a, b, &kept_ids, &parents, &mut conflicts);

    let mut nodes: HashMap<ArchonId, Node> = kept
        .into_iter()
        .map(|(id, resolved)| {
            let mut node = Node::new(id, resolved.name);
            node.description = resolved.description;
            node.properties = resolved.properties.into_iter().collect();
            (id, node)
        })
        .collect();

    for (parent_id, children) in orders {
        if let Some(parent_node) = nodes.get_mut(&parent_id) {
            parent_node.children = children;
        }
    }

    repair_name_collisions(&mut nodes, &parents, &mut conflicts);

    (Tree::build(nodes.into_values()), conflicts)
}

fn resolve_one(node: &Node) -> Resolved {
    Resolved {
        name: node.name.clone(),
        description: node.description.clone(),
        properties: node.properties.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
    }
}

fn resolve_triple(o: &Node, a: &Node, b: &Node, conflicts: &mut Vec<Conflict>, id: ArchonId) -> Resolved {
    let (name, name_conflict) = merge_field(&o.name, &a.name, &b.name);
    if name_conflict {
        conflicts.push(Conflict::RenameRename { id, a_name: a.name.clone(), b_name: b.name.clone() });
    }

    let (description, _) = merge_field(&o.description, &a.description, &b.description);

    let keys: BTreeSet<&String> = o.properties.keys().chain(a.properties.keys()).chain(b.properties.keys()).collect();
    let mut properties = HashMap::new();
    for key in keys {
        let (o_val, a_val, b_val) =
            (o.properties.get(key).cloned(), a.properties.get(key).cloned(), b.properties.get(key).cloned());
        let (value, conflict) = merge_field(&o_val, &a_val, &b_val);
        if conflict {
            conflicts.push(Conflict::PropertyConflict { id, key: key.clone() });
        }
        if let Some(value) = value {
            properties.insert(key.clone(), value);
        }
    }

    Resolved { name, description, properties }
}

/// Resolves the merged parent of every kept id. When `o` has no entry for
/// an id (it was freshly added on one or both sides) there is no base to
/// merge against, so the adding side's parent is used directly.
fn resolve_parents(
    o: &Tree,
    a: &Tree,
    b: &Tree,
    kept_ids: &HashSet<ArchonId>,
    conflicts: &mut Vec<Conflict>,
) -> HashMap<ArchonId, ArchonId> {
    let mut parents = HashMap::new();
    for &id in kept_ids {
        let (op, ap, bp) = (o.parent_of(id), a.parent_of(id), b.parent_of(id));
        let resolved = match (op, ap, bp) {
            (Some(op), Some(ap), Some(bp)) => {
                let (parent, conflict) = merge_field(&op, &ap, &bp);
                if conflict {
                    conflicts.push(Conflict::MoveMove { id, a_parent_id: ap, b_parent_id: bp });
                }
                Some(parent)
            }
            (_, Some(ap), Some(bp)) if ap == bp => Some(ap),
            (_, Some(ap), Some(bp)) => {
                conflicts.push(Conflict::MoveMove { id, a_parent_id: ap, b_parent_id: bp });
                Some(ap)
            }
            (_, Some(ap), None) => Some(ap),
            (_, None, Some(bp)) => Some(bp),
            (Some(op), None, None) => Some(op),
            (None, None, None) => None,
        };
        if let Some(parent_id) = resolved {
            parents.insert(id, parent_id);
        }
    }
    parents
}

/// Per-parent sibling order reconciliation via the longest-common-subsequence
/// rule: if only one side reordered relative to `o`, that
/// side's order wins; if both reordered and disagree, report `OrderConflict`
/// and keep `o`'s relative order. Newly added siblings (no position in any
/// of the three base orders) are appended afterward in id order, which is a
/// deliberate simplification: exact interleave position for a sibling added
/// during a disagreeing reorder is not reconstructed.
fn resolve_orders(
    o: &Tree,
    a: &Tree,
    b: &Tree,
    kept_ids: &HashSet<ArchonId>,
    parents: &HashMap<ArchonId, ArchonId>,
    conflicts: &mut Vec<Conflict>,
) -> HashMap<ArchonId, Vec<ArchonId>> {
    let mut children_of: HashMap<ArchonId, Vec<ArchonId>> = HashMap::new();
    for (&id, &parent_id) in parents {
        children_of.entry(parent_id).or_default().push(id);
    }

    let mut orders = HashMap::new();
    for (parent_id, members) in &children_of {
        let members: HashSet<ArchonId> = members.iter().copied().collect();

        let filtered = |tree: &Tree| -> Vec<ArchonId> {
            tree.get(*parent_id)
                .map(|n| n.children.iter().copied().filter(|id| members.contains(id)).collect())
                .unwrap_or_default()
        };
        let (o_order, a_order, b_order) = (filtered(o), filtered(a), filtered(b));

        let a_reordered = a_order != o_order && !a_order.is_empty();
        let b_reordered = b_order != o_order && !b_order.is_empty();

        let mut base_order = if a_reordered && b_reordered && a_order != b_order {
            conflicts.push(Conflict::OrderConflict { parent_id: *parent_id });
            o_order.clone()
        } else if a_reordered {
            a_order.clone()
        } else if b_reordered {
            b_order.clone()
        } else {
            o_order.clone()
        };

        let mut placed: HashSet<ArchonId> = base_order.iter().copied().collect();
        let mut fresh: Vec<ArchonId> = members.iter().copied().filter(|id| !placed.contains(id)).collect();
        fresh.sort();
        base_order.extend(fresh.iter().copied());
        placed.extend(fresh);

        orders.insert(*parent_id, base_order);
    }
    orders
}

/// Repairs sibling name collisions introduced by independent renames on
/// each side: among colliding ids, the lexicographically smaller id is kept
/// as a child under `parent_id`; the others are removed from that children
/// list, but their own children are reparented onto the winner rather than
/// dropped, so no node becomes unreachable from every children list.
fn repair_name_collisions(
    nodes: &mut HashMap<ArchonId, Node>,
    parents: &HashMap<ArchonId, ArchonId>,
    conflicts: &mut Vec<Conflict>,
) {
    let mut by_parent: HashMap<ArchonId, Vec<ArchonId>> = HashMap::new();
    for (&id, &parent_id) in parents {
        by_parent.entry(parent_id).or_default().push(id);
    }

    for (parent_id, children) in by_parent {
        let mut by_folded_name: HashMap<String, Vec<ArchonId>> = HashMap::new();
        for id in &children {
            if let Some(node) = nodes.get(id) {
                by_folded_name.entry(node.name.trim().to_lowercase()).or_default().push(*id);
            }
        }

        for (_, mut ids) in by_folded_name {
            if ids.len() <= 1 {
                continue;
            }
            ids.sort();
            let winner = ids[0];
            let losers = &ids[1..];
            let name = nodes.get(&winner).map(|n| n.name.clone()).unwrap_or_default();
            conflicts.push(Conflict::NameCollision { parent_id, name, ids: ids.clone() });

            for loser in losers {
                let orphaned = nodes.remove(loser).map(|n| n.children).unwrap_or_default();
                if let Some(winner_node) = nodes.get_mut(&winner) {
                    winner_node.children.extend(orphaned);
                }
                if let Some(parent_node) = nodes.get_mut(&parent_id) {
                    parent_node.children.retain(|child| child != loser);
                }
            }
        }
    }
}
