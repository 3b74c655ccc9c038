//! The tantivy schema backing the search index: a `nodes`
//! table (id/name/parent_id), denormalized onto one document per node, plus
//! an aggregated full-text field spanning name and all property text
//! values. Numeric/boolean/date property predicates and name-prefix lookup
//! are served from the in-memory [`crate::catalog::Catalog`] rather than
//! tantivy fast fields, since tantivy has no native "compare stored number"
//! query — see `DESIGN.md`.

use tantivy::schema::{Schema, FAST, STORED, STRING, TEXT};
use tantivy::schema::Field;

pub const FIELD_ID: &str = "id";
pub const FIELD_NAME: &str = "name";
pub const FIELD_PARENT_ID: &str = "parent_id";
pub const FIELD_FULLTEXT: &str = "fulltext";

#[derive(Debug, Clone)]
pub struct SchemaFields {
    pub schema: Schema,
    pub id: Field,
    pub name: Field,
    pub parent_id: Field,
    pub fulltext: Field,
}

impl SchemaFields {
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Schema::builder();
        let id = builder.add_text_field(FIELD_ID, STRING | STORED | FAST);
        let name = builder.add_text_field(FIELD_NAME, TEXT | STORED);
        let parent_id = builder.add_text_field(FIELD_PARENT_ID, STRING | STORED);
        let fulltext = builder.add_text_field(FIELD_FULLTEXT, TEXT);
        let schema = builder.build();
        Self {
            schema,
            id,
            name,
            parent_id,
            fulltext,
        }
    }
}

impl Default for SchemaFields {
    fn default() -> Self {
        Self::new()
    }
}
