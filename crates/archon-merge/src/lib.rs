//! Three-way tree merge: given a common ancestor and two
//! descendant trees, produces a merged tree and an explicit conflict list
//! rather than guessing silently.

mod conflict;
mod field;
mod merge;

pub use conflict::Conflict;
pub use field::merge_field;
pub use merge::merge;

#[cfg(test)]
mod tests {
    use archon_core::ArchonId;
    use archon_diff::Tree;
    use archon_store::{Node, PropertyValue};

    use super::*;

    fn node(id: ArchonId, name: &str, children: &[ArchonId]) -> Node {
        let mut n = Node::new(id, name.to_string());
        n.children = children.to_vec();
        n
    }

    #[test]
    fn unrelated_edits_both_apply() {
        let root = ArchonId::from_u128(0);
        let x = ArchonId::from_u128(1);

        let o = Tree::build([node(root, "root", &[x]), node(x, "X", &[])]);
        let mut x_a = node(x, "X", &[]);
        x_a.properties.insert("color".to_string(), PropertyValue::string("red"));
        let a = Tree::build([node(root, "root", &[x]), x_a]);
        let x_b = node(x, "Renamed", &[]);
        let b = Tree::build([node(root, "root", &[x]), x_b]);

        let (merged, conflicts) = merge(&o, &a, &b);
        assert!(conflicts.is_empty());
        let m = merged.get(x).unwrap();
        assert_eq!(m.name, "Renamed");
        assert_eq!(m.properties.get("color").unwrap().value, serde_json::json!("red"));
    }

    #[test]
    fn divergent_rename_is_a_conflict_falling_back_to_base() {
        let root = ArchonId::from_u128(0);
        let x = ArchonId::from_u128(1);

        let o = Tree::build([node(root, "root", &[x]), node(x, "Base", &[])]);
        let a = Tree::build([node(root, "root", &[x]), node(x, "A-Name", &[])]);
        let b = Tree::build([node(root, "root", &[x]), node(x, "B-Name", &[])]);

        let (merged, conflicts) = merge(&o, &a, &b);
        assert!(conflicts.iter().any(|c| matches!(c, Conflict::RenameRename { .. })));
        assert_eq!(merged.get(x).unwrap().name, "Base");
    }

    #[test]
    fn delete_edit_conflict_keeps_the_base_version() {
        let root = ArchonId::from_u128(0);
        let x = ArchonId::from_u128(1);

        let o = Tree::build([node(root, "root", &[x]), node(x, "X", &[])]);
        let a = Tree::build([node(root, "root", &[])]); // A deleted x
        let mut x_edited = node(x, "X-Edited", &[]);
        let b = Tree::build([node(root, "root", &[x]), { x_edited.description = Some("edited".into()); x_edited }]);

        let (merged, conflicts) = merge(&o, &a, &b);
        assert!(conflicts.iter().any(|c| matches!(c, Conflict::DeleteEdit { id } if *id == x)));
        assert!(merged.contains(x));
    }

    #[test]
    fn duplicate_add_with_different_content_is_a_conflict() {
        let root = ArchonId::from_u128(0);
        let new_id = ArchonId::from_u128(1);

        let o = Tree::build([node(root, "root", &[])]);
        let a = Tree::build([node(root, "root", &[new_id]), node(new_id, "FromA", &[])]);
        let b = Tree::build([node(root, "root", &[new_id]), node(new_id, "FromB", &[])]);

        let (merged, conflicts) = merge(&o, &a, &b);
        assert!(conflicts.iter().any(|c| matches!(c, Conflict::DuplicateAdd { id } if *id == new_id)));
        assert!(merged.contains(new_id));
    }

    #[test]
    fn name_collision_keeps_the_lexicographically_smaller_id() {
        let root = ArchonId::from_u128(0);
        let x = ArchonId::from_u128(1);
        let y = ArchonId::from_u128(2);

        let o = Tree::build([node(root, "root", &[x, y]), node(x, "X", &[]), node(y, "Y", &[])]);
        let a = Tree::build([node(root, "root", &[x, y]), node(x, "Shared", &[]), node(y, "Y", &[])]);
        let b = Tree::build([node(root, "root", &[x, y]), node(x, "X", &[]), node(y, "Shared", &[])]);

        let (merged, conflicts) = merge(&o, &a, &b);
        assert!(conflicts.iter().any(|c| matches!(c, Conflict::NameCollision { .. })));
        assert!(merged.contains(x));
        assert!(!merged.contains(y));
    }

    #[test]
    fn name_collision_reparents_the_losers_children_instead_of_orphaning_them() {
        let root = ArchonId::from_u128(0);
        let x = ArchonId::from_u128(1);
        let y = ArchonId::from_u128(2);
        let grandchild = ArchonId::from_u128(3);

        let o = Tree::build([
            node(root, "root", &[x, y]),
            node(x, "X", &[]),
            node(y, "Y", &[grandchild]),
            node(grandchild, "Grandchild", &[]),
        ]);
        let a = Tree::build([
            node(root, "root", &[x, y]),
            node(x, "Shared", &[]),
            node(y, "Y", &[grandchild]),
            node(grandchild, "Grandchild", &[]),
        ]);
        let b = Tree::build([
            node(root, "root", &[x, y]),
            node(x, "X", &[]),
            node(y, "Shared", &[grandchild]),
            node(grandchild, "Grandchild", &[]),
        ]);

        let (merged, conflicts) = merge(&o, &a, &b);
        assert!(conflicts.iter().any(|c| matches!(c, Conflict::NameCollision { .. })));
        // x wins (lexicographically smaller id); y is dropped as a sibling,
        // but its child must not vanish from every children list.
        assert!(merged.contains(x));
        assert!(!merged.contains(y));
        assert!(merged.contains(grandchild));
        assert!(merged.get(x).unwrap().children.contains(&grandchild));
    }
}
