//! Metadata describing how collections decompose into tables.
//!
//! - [`TableRef`]: path from a collection root to a doc-part
//! - [`MetaDatabase`] → [`MetaCollection`] → [`MetaDocPart`] → [`MetaField`]:
//!   the strictly owned tree of generated schemas, tables and columns
//! - [`ImmutableMetaSnapshot`] / [`MutableMetaSnapshot`]: a published version
//!   and a private working copy that records [`MetaChange`]s
//! - [`MetainfoRepository`]: the shared current version
//!
//! Every identifier that appears in generated SQL comes from this tree.

mod model;
mod repository;
mod snapshot;
mod table_ref;

pub use model::{MetaCollection, MetaDatabase, MetaDocPart, MetaField};
pub use repository::MetainfoRepository;
pub use snapshot::{ImmutableMetaSnapshot, MetaChange, MutableMetaSnapshot};
pub use table_ref::{TableRef, TableRefOrder, TableRefSegment};

/// Schema holding the metadata tables. Never handed out as a database schema.
pub const META_SCHEMA: &str = "docrel_meta";

/// Reserved field name for scalar array elements.
pub const SCALAR_ELEMENT_FIELD: &str = "$v";
