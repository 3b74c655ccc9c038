//! Deterministic semantic tree diffing: given two resolved
//! history points, produces an ordered, reproducible list of structural and
//! value changes.

mod change;
mod diff;
mod tree;

pub use change::{invert, Change};
pub use diff::diff;
pub use tree::Tree;

#[cfg(test)]
mod tests {
    use archon_core::ArchonId;
    use archon_store::{Node, PropertyValue};

    use super::*;

    fn node(id: ArchonId, name: &str, children: &[ArchonId]) -> Node {
        let mut n = Node::new(id, name.to_string());
        n.children = children.to_vec();
        n
    }

    #[test]
    fn detects_added_and_removed() {
        let root = ArchonId::from_u128(0);
        let kept = ArchonId::from_u128(1);
        let removed = ArchonId::from_u128(2);
        let added = ArchonId::from_u128(3);

        let a = Tree::build([node(root, "root", &[kept, removed]), node(kept, "Kept", &[]), node(removed, "Gone", &[])]);
        let b = Tree::build([node(root, "root", &[kept, added]), node(kept, "Kept", &[]), node(added, "New", &[])]);

        let changes = diff(&a, &b);
        assert!(changes.iter().any(|c| matches!(c, Change::Added { id, .. } if *id == added)));
        assert!(changes.iter().any(|c| matches!(c, Change::Removed { id, .. } if *id == removed)));
    }

    #[test]
    fn detects_rename_and_move() {
        let root = ArchonId::from_u128(0);
        let other_parent = ArchonId::from_u128(1);
        let moved = ArchonId::from_u128(2);

        let a = Tree::build([node(root, "root", &[moved]), node(other_parent, "Other", &[]), node(moved, "Old", &[])]);
        let b = Tree::build([node(root, "root", &[]), node(other_parent, "Other", &[moved]), node(moved, "New", &[])]);

        let changes = diff(&a, &b);
        assert!(changes.iter().any(|c| matches!(c, Change::Renamed { old_name, new_name, .. } if old_name == "Old" && new_name == "New")));
        assert!(changes.iter().any(|c| matches!(c, Change::Moved { new_parent_id, .. } if *new_parent_id == other_parent)));
    }

    #[test]
    fn intra_parent_reorder_is_a_single_change() {
        let root = ArchonId::from_u128(0);
        let x = ArchonId::from_u128(1);
        let y = ArchonId::from_u128(2);

        let a = Tree::build([node(root, "root", &[x, y]), node(x, "X", &[]), node(y, "Y", &[])]);
        let b = Tree::build([node(root, "root", &[y, x]), node(x, "X", &[]), node(y, "Y", &[])]);

        let changes = diff(&a, &b);
        assert_eq!(changes.len(), 1);
        assert!(matches!(&changes[0], Change::Reordered { parent_id, .. } if *parent_id == root));
    }

    #[test]
    fn property_changes_are_reported_per_key() {
        let root = ArchonId::from_u128(0);
        let mut before = node(root, "root", &[]);
        before.properties.insert("voltage".to_string(), PropertyValue::number(5.0));
        let mut after = node(root, "root", &[]);
        after.properties.insert("voltage".to_string(), PropertyValue::number(9.0));

        let changes = diff(&Tree::build([before]), &Tree::build([after]));
        assert_eq!(changes.len(), 1);
        assert!(matches!(&changes[0], Change::PropertyChanged { key, .. } if key == "voltage"));
    }

    #[test]
    fn invert_round_trips_the_change_kinds() {
        let root = ArchonId::from_u128(0);
        let kept = ArchonId::from_u128(1);
        let a = Tree::build([node(root, "root", &[]), node(kept, "Old", &[])]);
        let b = Tree::build([node(root, "root", &[]), node(kept, "New", &[])]);

        let forward = diff(&a, &b);
        let back = diff(&b, &a);
        assert_eq!(invert(&forward), back);
    }
}
