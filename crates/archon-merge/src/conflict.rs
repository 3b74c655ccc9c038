//! The `Conflict` vocabulary.

use archon_core::ArchonId;

#[derive(Debug, Clone, PartialEq)]
pub enum Conflict {
    DuplicateAdd { id: ArchonId },
    DeleteEdit { id: ArchonId },
    MoveMove { id: ArchonId, a_parent_id: ArchonId, b_parent_id: ArchonId },
    RenameRename { id: ArchonId, a_name: String, b_name: String },
    PropertyConflict { id: ArchonId, key: String },
    OrderConflict { parent_id: ArchonId },
    NameCollision { parent_id: ArchonId, name: String, ids: Vec<ArchonId> },
}
