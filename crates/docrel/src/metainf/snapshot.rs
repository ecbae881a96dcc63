//! Immutable and mutable views of the metadata tree.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::core::identifier::IdentifierFactory;
use crate::error::{DocrelError, Result};
use crate::kv::FieldType;

use super::model::{MetaCollection, MetaDatabase, MetaDocPart, MetaField};
use super::table_ref::TableRef;
use super::META_SCHEMA;

/// One append-only registration. Changes are applied in order; a change may
/// only reference elements registered by itself or by earlier changes.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaChange {
    Database {
        name: String,
        identifier: String,
    },
    Collection {
        database: String,
        name: String,
        identifier: String,
    },
    DocPart {
        database: String,
        collection: String,
        table_ref: TableRef,
        identifier: String,
    },
    Field {
        database: String,
        collection: String,
        table_ref: TableRef,
        field: Arc<MetaField>,
    },
}

/// A consistent version of all metadata.
#[derive(Debug, Clone, Default)]
pub struct ImmutableMetaSnapshot {
    databases: BTreeMap<String, Arc<MetaDatabase>>,
    by_identifier: HashMap<String, String>,
}

impl ImmutableMetaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database(&self, name: &str) -> Option<Arc<MetaDatabase>> {
        self.databases.get(name).cloned()
    }

    pub fn database_by_identifier(&self, identifier: &str) -> Option<Arc<MetaDatabase>> {
        self.by_identifier
            .get(identifier)
            .and_then(|name| self.databases.get(name))
            .cloned()
    }

    pub fn databases(&self) -> impl Iterator<Item = &Arc<MetaDatabase>> {
        self.databases.values()
    }

    pub fn collection(&self, database: &str, collection: &str) -> Option<Arc<MetaCollection>> {
        self.databases.get(database)?.collection(collection)
    }

    pub fn doc_part(
        &self,
        database: &str,
        collection: &str,
        table_ref: &TableRef,
    ) -> Option<Arc<MetaDocPart>> {
        self.collection(database, collection)?
            .doc_part_by_table_ref(table_ref)
    }

    /// Apply one change.
    ///
    /// Returns `Ok(false)` when the element already exists with the same
    /// identifier, and `MetaConflict` when it exists under a different one or
    /// when the identifier is already used by another element.
    pub(crate) fn apply(&mut self, change: &MetaChange) -> Result<bool> {
        match change {
            MetaChange::Database { name, identifier } => {
                if let Some(existing) = self.databases.get(name) {
                    return same_identifier("database", name, existing.identifier(), identifier);
                }
                if let Some(owner) = self.by_identifier.get(identifier) {
                    return Err(identifier_taken("schema", identifier, owner));
                }
                self.by_identifier.insert(identifier.clone(), name.clone());
                self.databases.insert(
                    name.clone(),
                    Arc::new(MetaDatabase::new(name.clone(), identifier.clone())),
                );
                Ok(true)
            }

            MetaChange::Collection {
                database,
                name,
                identifier,
            } => {
                let db = self.require_database(database)?;
                if let Some(existing) = db.collection(name) {
                    return same_identifier("collection", name, existing.identifier(), identifier);
                }
                if let Some(owner) = db.collection_by_identifier(identifier) {
                    return Err(identifier_taken("collection", identifier, owner.name()));
                }
                self.database_mut(database)?
                    .insert_collection(MetaCollection::new(name.clone(), identifier.clone()));
                Ok(true)
            }

            MetaChange::DocPart {
                database,
                collection,
                table_ref,
                identifier,
            } => {
                let db = self.require_database(database)?;
                let col = db.collection(collection).ok_or_else(|| {
                    DocrelError::Precondition(format!(
                        "collection '{}.{}' is not registered",
                        database, collection
                    ))
                })?;
                if let Some(existing) = col.doc_part_by_table_ref(table_ref) {
                    return same_identifier(
                        "doc part",
                        &table_ref.to_string(),
                        existing.identifier(),
                        identifier,
                    );
                }
                if db.contains_table_identifier(identifier) {
                    return Err(identifier_taken("table", identifier, database));
                }
                if let Some(parent) = table_ref.parent() {
                    if col.doc_part_by_table_ref(&parent).is_none() {
                        return Err(DocrelError::Precondition(format!(
                            "doc part {} registered before its parent {}",
                            table_ref, parent
                        )));
                    }
                }
                self.collection_mut(database, collection)?
                    .insert_doc_part(MetaDocPart::new(table_ref.clone(), identifier.clone()));
                Ok(true)
            }

            MetaChange::Field {
                database,
                collection,
                table_ref,
                field,
            } => {
                let doc_part = self.doc_part(database, collection, table_ref).ok_or_else(|| {
                    DocrelError::Precondition(format!(
                        "doc part {} of '{}.{}' is not registered",
                        table_ref, database, collection
                    ))
                })?;
                if let Some(existing) = doc_part.field(field.name(), field.field_type()) {
                    return same_identifier(
                        "field",
                        field.name(),
                        existing.identifier(),
                        field.identifier(),
                    );
                }
                if let Some(owner) = doc_part.field_by_identifier(field.identifier()) {
                    return Err(identifier_taken("column", field.identifier(), owner.name()));
                }
                self.collection_mut(database, collection)?
                    .doc_part_mut(table_ref)
                    .ok_or_else(|| {
                        DocrelError::Precondition(format!("doc part {} vanished", table_ref))
                    })?
                    .insert_field(Arc::clone(field));
                Ok(true)
            }
        }
    }

    pub(crate) fn remove_collection(
        &mut self,
        database: &str,
        collection: &str,
    ) -> Option<Arc<MetaCollection>> {
        self.databases
            .get_mut(database)
            .map(Arc::make_mut)?
            .remove_collection(collection)
    }

    fn require_database(&self, name: &str) -> Result<Arc<MetaDatabase>> {
        self.database(name).ok_or_else(|| {
            DocrelError::Precondition(format!("database '{}' is not registered", name))
        })
    }

    fn database_mut(&mut self, name: &str) -> Result<&mut MetaDatabase> {
        self.databases
            .get_mut(name)
            .map(Arc::make_mut)
            .ok_or_else(|| DocrelError::Precondition(format!("database '{}' is not registered", name)))
    }

    fn collection_mut(&mut self, database: &str, collection: &str) -> Result<&mut MetaCollection> {
        self.database_mut(database)?
            .collection_mut(collection)
            .ok_or_else(|| {
                DocrelError::Precondition(format!(
                    "collection '{}.{}' is not registered",
                    database, collection
                ))
            })
    }
}

fn same_identifier(kind: &str, name: &str, existing: &str, proposed: &str) -> Result<bool> {
    if existing == proposed {
        Ok(false)
    } else {
        Err(DocrelError::MetaConflict(format!(
            "{} '{}' registered as '{}', not '{}'",
            kind, name, existing, proposed
        )))
    }
}

fn identifier_taken(kind: &str, identifier: &str, owner: &str) -> DocrelError {
    DocrelError::MetaConflict(format!(
        "{} identifier '{}' already used by '{}'",
        kind, identifier, owner
    ))
}

/// A private working copy that records every registration it makes.
///
/// Lookups see the registrations made so far; [`MutableMetaSnapshot::changes`]
/// is merged into the shared repository once the structures exist in the
/// backend.
#[derive(Debug, Clone)]
pub struct MutableMetaSnapshot {
    working: ImmutableMetaSnapshot,
    factory: IdentifierFactory,
    changes: Vec<MetaChange>,
}

impl MutableMetaSnapshot {
    pub fn new(base: &ImmutableMetaSnapshot, factory: IdentifierFactory) -> Self {
        Self {
            working: base.clone(),
            factory,
            changes: Vec::new(),
        }
    }

    /// Current working view, including unmerged registrations.
    pub fn snapshot(&self) -> &ImmutableMetaSnapshot {
        &self.working
    }

    pub fn changes(&self) -> &[MetaChange] {
        &self.changes
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn into_changes(self) -> Vec<MetaChange> {
        self.changes
    }

    pub fn ensure_database(&mut self, name: &str) -> Result<Arc<MetaDatabase>> {
        if let Some(db) = self.working.database(name) {
            return Ok(db);
        }
        let working = &self.working;
        let identifier = self.factory.schema_identifier(name, |candidate| {
            candidate == META_SCHEMA || working.database_by_identifier(candidate).is_some()
        });
        self.record(MetaChange::Database {
            name: name.to_string(),
            identifier,
        })?;
        self.working.require_database(name)
    }

    pub fn ensure_collection(&mut self, database: &str, name: &str) -> Result<Arc<MetaCollection>> {
        let db = self.ensure_database(database)?;
        if let Some(collection) = db.collection(name) {
            return Ok(collection);
        }
        let identifier = self.factory.collection_identifier(name, |candidate| {
            db.collection_by_identifier(candidate).is_some()
        });
        self.record(MetaChange::Collection {
            database: database.to_string(),
            name: name.to_string(),
            identifier,
        })?;
        self.working.collection(database, name).ok_or_else(|| {
            DocrelError::Precondition(format!("collection '{}.{}' not recorded", database, name))
        })
    }

    /// Register the doc-part at `table_ref` and, first, any missing ancestor.
    pub fn ensure_doc_part(
        &mut self,
        database: &str,
        collection: &str,
        table_ref: &TableRef,
    ) -> Result<Arc<MetaDocPart>> {
        let col = self.ensure_collection(database, collection)?;
        if let Some(doc_part) = col.doc_part_by_table_ref(table_ref) {
            return Ok(doc_part);
        }
        if let Some(parent) = table_ref.parent() {
            self.ensure_doc_part(database, collection, &parent)?;
        }

        let db = self.working.require_database(database)?;
        let identifier = self
            .factory
            .table_identifier(col.identifier(), table_ref, |candidate| {
                db.contains_table_identifier(candidate)
            });
        self.record(MetaChange::DocPart {
            database: database.to_string(),
            collection: collection.to_string(),
            table_ref: table_ref.clone(),
            identifier,
        })?;
        self.working
            .doc_part(database, collection, table_ref)
            .ok_or_else(|| DocrelError::Precondition(format!("doc part {} not recorded", table_ref)))
    }

    pub fn ensure_field(
        &mut self,
        database: &str,
        collection: &str,
        table_ref: &TableRef,
        name: &str,
        field_type: FieldType,
    ) -> Result<Arc<MetaField>> {
        let doc_part = self.ensure_doc_part(database, collection, table_ref)?;
        if let Some(field) = doc_part.field(name, field_type) {
            return Ok(field);
        }
        let identifier = self.factory.column_identifier(name, field_type, |candidate| {
            doc_part.field_by_identifier(candidate).is_some()
        });
        let field = Arc::new(MetaField::new(name, identifier, field_type));
        self.record(MetaChange::Field {
            database: database.to_string(),
            collection: collection.to_string(),
            table_ref: table_ref.clone(),
            field: Arc::clone(&field),
        })?;
        Ok(field)
    }

    fn record(&mut self, change: MetaChange) -> Result<()> {
        self.working.apply(&change)?;
        self.changes.push(change);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifier::IdentifierPolicy;

    const POLICY: IdentifierPolicy = IdentifierPolicy {
        max_length: 63,
        reserved_words: &["select", "user"],
        reserved_prefixes: &[],
    };

    fn mutable() -> MutableMetaSnapshot {
        MutableMetaSnapshot::new(&ImmutableMetaSnapshot::new(), IdentifierFactory::new(POLICY))
    }

    #[test]
    fn test_ensure_field_registers_whole_path() {
        let mut meta = mutable();
        let b_c = TableRef::root().child_field("b").child_field("c");
        let field = meta
            .ensure_field("db", "col", &b_c, "x", FieldType::String)
            .unwrap();
        assert_eq!(field.identifier(), "x_s");

        // database, collection, root, [b], [b.c], field
        assert_eq!(meta.changes().len(), 6);
        assert!(matches!(meta.changes()[2], MetaChange::DocPart { ref table_ref, .. } if table_ref.is_root()));

        let col = meta.snapshot().collection("db", "col").unwrap();
        assert_eq!(col.doc_part_count(), 3);
        assert_eq!(
            col.doc_part_by_table_ref(&b_c).unwrap().identifier(),
            "col_b_c"
        );
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut meta = mutable();
        meta.ensure_field("db", "col", &TableRef::root(), "a", FieldType::Integer)
            .unwrap();
        let before = meta.changes().len();
        meta.ensure_field("db", "col", &TableRef::root(), "a", FieldType::Integer)
            .unwrap();
        assert_eq!(meta.changes().len(), before);
    }

    #[test]
    fn test_reserved_collection_name() {
        let mut meta = mutable();
        let col = meta.ensure_collection("db", "user").unwrap();
        assert_eq!(col.identifier(), "user_1");
        let root = meta.ensure_doc_part("db", "user", &TableRef::root()).unwrap();
        assert_ne!(root.identifier(), "user");
    }

    #[test]
    fn test_meta_schema_name_is_never_a_database_identifier() {
        let mut meta = mutable();
        let db = meta.ensure_database(META_SCHEMA).unwrap();
        assert_ne!(db.identifier(), META_SCHEMA);
    }

    #[test]
    fn test_table_identifiers_unique_across_collections() {
        let mut meta = mutable();
        // Collection "a_b" root and collection "a" child [b] would both want "a_b"
        meta.ensure_doc_part("db", "a_b", &TableRef::root()).unwrap();
        let child = meta
            .ensure_doc_part("db", "a", &TableRef::root().child_field("b"))
            .unwrap();
        assert_eq!(child.identifier(), "a_b_1");
    }

    #[test]
    fn test_apply_duplicate_same_identifier_is_noop() {
        let mut snapshot = ImmutableMetaSnapshot::new();
        let change = MetaChange::Database {
            name: "db".into(),
            identifier: "db".into(),
        };
        assert!(snapshot.apply(&change).unwrap());
        assert!(!snapshot.apply(&change).unwrap());
    }

    #[test]
    fn test_apply_different_identifier_conflicts() {
        let mut snapshot = ImmutableMetaSnapshot::new();
        snapshot
            .apply(&MetaChange::Database {
                name: "db".into(),
                identifier: "db".into(),
            })
            .unwrap();

        let err = snapshot
            .apply(&MetaChange::Database {
                name: "db".into(),
                identifier: "db_1".into(),
            })
            .unwrap_err();
        assert!(matches!(err, DocrelError::MetaConflict(_)));
        assert!(err.is_retryable());

        let err = snapshot
            .apply(&MetaChange::Database {
                name: "other".into(),
                identifier: "db".into(),
            })
            .unwrap_err();
        assert!(matches!(err, DocrelError::MetaConflict(_)));
    }

    #[test]
    fn test_apply_child_before_parent_is_precondition() {
        let mut snapshot = ImmutableMetaSnapshot::new();
        snapshot
            .apply(&MetaChange::Database {
                name: "db".into(),
                identifier: "db".into(),
            })
            .unwrap();
        snapshot
            .apply(&MetaChange::Collection {
                database: "db".into(),
                name: "c".into(),
                identifier: "c".into(),
            })
            .unwrap();
        let err = snapshot
            .apply(&MetaChange::DocPart {
                database: "db".into(),
                collection: "c".into(),
                table_ref: TableRef::root().child_field("b"),
                identifier: "c_b".into(),
            })
            .unwrap_err();
        assert!(matches!(err, DocrelError::Precondition(_)));
    }

    #[test]
    fn test_mutable_does_not_touch_base() {
        let base = ImmutableMetaSnapshot::new();
        let mut meta = MutableMetaSnapshot::new(&base, IdentifierFactory::new(POLICY));
        meta.ensure_collection("db", "c").unwrap();
        assert!(base.database("db").is_none());
        assert!(meta.snapshot().database("db").is_some());
    }
}
