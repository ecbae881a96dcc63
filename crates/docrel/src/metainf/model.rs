//! The four-level metadata tree.
//!
//! Every level is immutable once shared: children are held behind `Arc` and
//! a mutation clones only the path from the root to the changed node
//! (`Arc::make_mut`), so readers holding an older snapshot are unaffected.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::kv::FieldType;

use super::table_ref::{TableRef, TableRefOrder};

/// One generated column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetaField {
    name: String,
    identifier: String,
    field_type: FieldType,
}

impl MetaField {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            field_type,
        }
    }

    /// Document key this column stores.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }
}

/// One generated table: the documents, sub-documents or array elements found
/// at one [`TableRef`].
#[derive(Debug, Clone)]
pub struct MetaDocPart {
    table_ref: TableRef,
    identifier: String,
    // Registration order; reads select columns in this order.
    fields: Vec<Arc<MetaField>>,
    by_name_type: HashMap<(String, FieldType), usize>,
    by_identifier: HashMap<String, usize>,
}

impl MetaDocPart {
    pub fn new(table_ref: TableRef, identifier: impl Into<String>) -> Self {
        Self {
            table_ref,
            identifier: identifier.into(),
            fields: Vec::new(),
            by_name_type: HashMap::new(),
            by_identifier: HashMap::new(),
        }
    }

    pub fn table_ref(&self) -> &TableRef {
        &self.table_ref
    }

    /// Table identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn is_root(&self) -> bool {
        self.table_ref.is_root()
    }

    pub fn field(&self, name: &str, field_type: FieldType) -> Option<Arc<MetaField>> {
        self.by_name_type
            .get(&(name.to_string(), field_type))
            .map(|&i| Arc::clone(&self.fields[i]))
    }

    /// All columns holding `name`, one per type seen.
    pub fn fields_by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Arc<MetaField>> + 'a {
        self.fields.iter().filter(move |f| f.name() == name)
    }

    pub fn field_by_identifier(&self, identifier: &str) -> Option<Arc<MetaField>> {
        self.by_identifier
            .get(identifier)
            .map(|&i| Arc::clone(&self.fields[i]))
    }

    pub fn fields(&self) -> &[Arc<MetaField>] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn insert_field(&mut self, field: Arc<MetaField>) {
        let index = self.fields.len();
        self.by_name_type
            .insert((field.name().to_string(), field.field_type()), index);
        self.by_identifier.insert(field.identifier().to_string(), index);
        self.fields.push(field);
    }
}

/// One logical document collection.
#[derive(Debug, Clone)]
pub struct MetaCollection {
    name: String,
    identifier: String,
    doc_parts: BTreeMap<TableRef, Arc<MetaDocPart>>,
    by_identifier: HashMap<String, TableRef>,
}

impl MetaCollection {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            doc_parts: BTreeMap::new(),
            by_identifier: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefix of every table identifier of this collection.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn doc_part_by_table_ref(&self, table_ref: &TableRef) -> Option<Arc<MetaDocPart>> {
        self.doc_parts.get(table_ref).cloned()
    }

    pub fn doc_part_by_identifier(&self, identifier: &str) -> Option<Arc<MetaDocPart>> {
        self.by_identifier
            .get(identifier)
            .and_then(|table_ref| self.doc_parts.get(table_ref))
            .cloned()
    }

    /// The root doc-part; absent until the first document is inserted.
    pub fn root_doc_part(&self) -> Option<Arc<MetaDocPart>> {
        self.doc_part_by_table_ref(&TableRef::root())
    }

    pub fn doc_parts(&self, order: TableRefOrder) -> Vec<Arc<MetaDocPart>> {
        match order {
            TableRefOrder::Ascending => self.doc_parts.values().cloned().collect(),
            TableRefOrder::Descending => self.doc_parts.values().rev().cloned().collect(),
        }
    }

    pub fn doc_part_count(&self) -> usize {
        self.doc_parts.len()
    }

    pub(crate) fn insert_doc_part(&mut self, doc_part: MetaDocPart) {
        self.by_identifier
            .insert(doc_part.identifier().to_string(), doc_part.table_ref().clone());
        self.doc_parts
            .insert(doc_part.table_ref().clone(), Arc::new(doc_part));
    }

    pub(crate) fn doc_part_mut(&mut self, table_ref: &TableRef) -> Option<&mut MetaDocPart> {
        self.doc_parts.get_mut(table_ref).map(Arc::make_mut)
    }
}

/// One logical database, stored as one backend schema.
#[derive(Debug, Clone)]
pub struct MetaDatabase {
    name: String,
    identifier: String,
    collections: BTreeMap<String, Arc<MetaCollection>>,
    by_identifier: HashMap<String, String>,
}

impl MetaDatabase {
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            collections: BTreeMap::new(),
            by_identifier: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn collection(&self, name: &str) -> Option<Arc<MetaCollection>> {
        self.collections.get(name).cloned()
    }

    pub fn collection_by_identifier(&self, identifier: &str) -> Option<Arc<MetaCollection>> {
        self.by_identifier
            .get(identifier)
            .and_then(|name| self.collections.get(name))
            .cloned()
    }

    pub fn collections(&self) -> impl Iterator<Item = &Arc<MetaCollection>> {
        self.collections.values()
    }

    /// Whether any collection of this database already uses `identifier` for
    /// a table. Tables share one namespace per schema.
    pub fn contains_table_identifier(&self, identifier: &str) -> bool {
        self.collections
            .values()
            .any(|c| c.doc_part_by_identifier(identifier).is_some())
    }

    pub(crate) fn insert_collection(&mut self, collection: MetaCollection) {
        self.by_identifier
            .insert(collection.identifier().to_string(), collection.name().to_string());
        self.collections
            .insert(collection.name().to_string(), Arc::new(collection));
    }

    pub(crate) fn collection_mut(&mut self, name: &str) -> Option<&mut MetaCollection> {
        self.collections.get_mut(name).map(Arc::make_mut)
    }

    pub(crate) fn remove_collection(&mut self, name: &str) -> Option<Arc<MetaCollection>> {
        let removed = self.collections.remove(name)?;
        self.by_identifier.remove(removed.identifier());
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_part_with_fields() -> MetaDocPart {
        let mut doc_part = MetaDocPart::new(TableRef::root(), "users");
        doc_part.insert_field(Arc::new(MetaField::new("a", "a_i", FieldType::Integer)));
        doc_part.insert_field(Arc::new(MetaField::new("a", "a_s", FieldType::String)));
        doc_part.insert_field(Arc::new(MetaField::new("b", "b_e", FieldType::Child)));
        doc_part
    }

    #[test]
    fn test_field_lookups() {
        let doc_part = doc_part_with_fields();

        let a_int = doc_part.field("a", FieldType::Integer).unwrap();
        assert_eq!(a_int.identifier(), "a_i");
        assert!(doc_part.field("a", FieldType::Long).is_none());

        let names: Vec<_> = doc_part.fields_by_name("a").map(|f| f.identifier()).collect();
        assert_eq!(names, vec!["a_i", "a_s"]);

        let b = doc_part.field_by_identifier("b_e").unwrap();
        assert_eq!(b.name(), "b");
        assert_eq!(b.field_type(), FieldType::Child);
        assert!(doc_part.field_by_identifier("nope").is_none());
    }

    #[test]
    fn test_fields_keep_registration_order() {
        let doc_part = doc_part_with_fields();
        let ids: Vec<_> = doc_part.fields().iter().map(|f| f.identifier()).collect();
        assert_eq!(ids, vec!["a_i", "a_s", "b_e"]);
    }

    #[test]
    fn test_collection_doc_part_order() {
        let mut collection = MetaCollection::new("users", "users");
        let b = TableRef::root().child_field("b");
        let bc = b.child_field("c");
        collection.insert_doc_part(MetaDocPart::new(bc.clone(), "users_b_c"));
        collection.insert_doc_part(MetaDocPart::new(TableRef::root(), "users"));
        collection.insert_doc_part(MetaDocPart::new(b.clone(), "users_b"));

        let asc: Vec<_> = collection
            .doc_parts(TableRefOrder::Ascending)
            .iter()
            .map(|d| d.identifier().to_string())
            .collect();
        assert_eq!(asc, vec!["users", "users_b", "users_b_c"]);

        let desc: Vec<_> = collection
            .doc_parts(TableRefOrder::Descending)
            .iter()
            .map(|d| d.identifier().to_string())
            .collect();
        assert_eq!(desc, vec!["users_b_c", "users_b", "users"]);

        assert!(collection.root_doc_part().is_some());
        assert_eq!(
            collection.doc_part_by_identifier("users_b").unwrap().table_ref(),
            &b
        );
    }

    #[test]
    fn test_make_mut_does_not_affect_shared_copy() {
        let mut collection = MetaCollection::new("users", "users");
        collection.insert_doc_part(MetaDocPart::new(TableRef::root(), "users"));
        let shared = collection.clone();

        collection
            .doc_part_mut(&TableRef::root())
            .unwrap()
            .insert_field(Arc::new(MetaField::new("a", "a_i", FieldType::Integer)));

        assert_eq!(collection.root_doc_part().unwrap().field_count(), 1);
        assert_eq!(shared.root_doc_part().unwrap().field_count(), 0);
    }

    #[test]
    fn test_database_table_namespace() {
        let mut db = MetaDatabase::new("shop", "shop");
        let mut orders = MetaCollection::new("orders", "orders");
        orders.insert_doc_part(MetaDocPart::new(TableRef::root(), "orders"));
        db.insert_collection(orders);

        assert!(db.contains_table_identifier("orders"));
        assert!(!db.contains_table_identifier("orders_items"));
        assert_eq!(db.collection_by_identifier("orders").unwrap().name(), "orders");

        db.remove_collection("orders");
        assert!(db.collection("orders").is_none());
        assert!(db.collection_by_identifier("orders").is_none());
    }
}
