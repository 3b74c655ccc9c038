//! A resolved snapshot of the node hierarchy at one point in history,
//! independent of any live project (operates on two such trees).

use std::collections::HashMap;

use archon_core::ArchonId;
use archon_store::Node;

#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: HashMap<ArchonId, Node>,
    parent_of: HashMap<ArchonId, ArchonId>,
}

impl Tree {
    #[must_use]
    pub fn build(nodes: impl IntoIterator<Item = Node>) -> Self {
        let nodes: HashMap<ArchonId, Node> = nodes.into_iter().map(|n| (n.id, n)).collect();
        let mut parent_of = HashMap::new();
        for node in nodes.values() {
            for child in &node.children {
                parent_of.insert(*child, node.id);
            }
        }
        Self { nodes, parent_of }
    }

    #[must_use]
    pub fn get(&self, id: ArchonId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    #[must_use]
    pub fn parent_of(&self, id: ArchonId) -> Option<ArchonId> {
        self.parent_of.get(&id).copied()
    }

    #[must_use]
    pub fn position_in_parent(&self, id: ArchonId) -> Option<usize> {
        let parent = self.parent_of(id)?;
        self.nodes.get(&parent)?.children.iter().position(|child| *child == id)
    }

    #[must_use]
    pub fn ids(&self) -> impl Iterator<Item = ArchonId> + '_ {
        self.nodes.keys().copied()
    }

    #[must_use]
    pub fn contains(&self, id: ArchonId) -> bool {
        self.nodes.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
