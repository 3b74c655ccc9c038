//! The `Change` vocabulary.

use archon_core::ArchonId;
use archon_store::PropertyValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Added { id: ArchonId, parent_id: ArchonId, position: usize },
    Removed { id: ArchonId, parent_id: ArchonId },
    Renamed { id: ArchonId, old_name: String, new_name: String },
    Moved { id: ArchonId, old_parent_id: ArchonId, new_parent_id: ArchonId, old_position: usize, new_position: usize },
    Reordered { parent_id: ArchonId, old_order: Vec<ArchonId>, new_order: Vec<ArchonId> },
    PropertyChanged { id: ArchonId, key: String, old_value: Option<PropertyValue>, new_value: Option<PropertyValue> },
    DescriptionChanged { id: ArchonId, old: Option<String>, new: Option<String> },
}

impl Change {
    /// The position of this change in the fixed kind ordering used for
    /// deterministic emission.
    #[must_use]
    pub(crate) fn kind_rank(&self) -> u8 {
        match self {
            Change::Added { .. } => 0,
            Change::Removed { .. } => 1,
            Change::Renamed { .. } => 2,
            Change::Moved { .. } => 3,
            Change::Reordered { .. } => 4,
            Change::PropertyChanged { .. } => 5,
            Change::DescriptionChanged { .. } => 6,
        }
    }

    /// `(parentId, position, id, key)` used to order changes within a kind.
    pub(crate) fn sort_key(&self) -> (Option<ArchonId>, Option<usize>, ArchonId, String) {
        match self {
            Change::Added { id, parent_id, position } => (Some(*parent_id), Some(*position), *id, String::new()),
            Change::Removed { id, parent_id } => (Some(*parent_id), None, *id, String::new()),
            Change::Renamed { id, .. } => (None, None, *id, String::new()),
            Change::Moved { id, new_parent_id, new_position, .. } => {
                (Some(*new_parent_id), Some(*new_position), *id, String::new())
            }
            Change::Reordered { parent_id, .. } => (Some(*parent_id), None, *parent_id, String::new()),
            Change::PropertyChanged { id, key, .. } => (None, None, *id, key.clone()),
            Change::DescriptionChanged { id, .. } => (None, None, *id, String::new()),
        }
    }

    /// Swaps the before/after sides of this change, per the invertibility
    /// property: `invert(diff(A, B))` and `diff(B, A)` agree on
    /// every field except a `Removed` change's reconstructed position,
    /// which is not preserved by the `Removed` variant and is placed at the
    /// end of the parent's children instead.
    #[must_use]
    pub fn invert(&self) -> Change {
        match self {
            Change::Added { id, parent_id, .. } => Change::Removed { id: *id, parent_id: *parent_id },
            Change::Removed { id, parent_id } => {
                Change::Added { id: *id, parent_id: *parent_id, position: usize::MAX }
            }
            Change::Renamed { id, old_name, new_name } => {
                Change::Renamed { id: *id, old_name: new_name.clone(), new_name: old_name.clone() }
            }
            Change::Moved { id, old_parent_id, new_parent_id, old_position, new_position } => Change::Moved {
                id: *id,
                old_parent_id: *new_parent_id,
                new_parent_id: *old_parent_id,
                old_position: *new_position,
                new_position: *old_position,
            },
            Change::Reordered { parent_id, old_order, new_order } => Change::Reordered {
                parent_id: *parent_id,
                old_order: new_order.clone(),
                new_order: old_order.clone(),
            },
            Change::PropertyChanged { id, key, old_value, new_value } => Change::PropertyChanged {
                id: *id,
                key: key.clone(),
                old_value: new_value.clone(),
                new_value: old_value.clone(),
            },
            Change::DescriptionChanged { id, old, new } => {
                Change::DescriptionChanged { id: *id, old: new.clone(), new: old.clone() }
            }
        }
    }
}

/// Inverts and reverses a whole change list, so that applying `invert(cs)`
/// undoes `cs` in the correct dependency order (children before parents for
/// removals, parents before children for additions).
#[must_use]
pub fn invert(changes: &[Change]) -> Vec<Change> {
    changes.iter().rev().map(Change::invert).collect()
}
