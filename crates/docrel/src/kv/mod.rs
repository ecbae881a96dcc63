//! Document value model.
//!
//! Documents are trees of [`KvValue`]s rooted at a [`KvDocument`]. Every
//! scalar variant corresponds to exactly one [`FieldType`]; arrays and
//! sub-documents correspond to [`FieldType::Child`].

mod types;

pub use types::FieldType;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;

/// A dynamically typed document value.
#[derive(Debug, Clone, PartialEq)]
pub enum KvValue {
    Null,
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Instant(DateTime<Utc>),
    Binary(Vec<u8>),
    ObjectId([u8; 12]),
    Array(Vec<KvValue>),
    Document(KvDocument),
}

impl KvValue {
    /// The column type this value is stored under.
    pub fn field_type(&self) -> FieldType {
        match self {
            KvValue::Null => FieldType::Null,
            KvValue::Boolean(_) => FieldType::Boolean,
            KvValue::Integer(_) => FieldType::Integer,
            KvValue::Long(_) => FieldType::Long,
            KvValue::Double(_) => FieldType::Double,
            KvValue::Decimal(_) => FieldType::Decimal,
            KvValue::String(_) => FieldType::String,
            KvValue::Date(_) => FieldType::Date,
            KvValue::Time(_) => FieldType::Time,
            KvValue::Instant(_) => FieldType::Instant,
            KvValue::Binary(_) => FieldType::Binary,
            KvValue::ObjectId(_) => FieldType::ObjectId,
            KvValue::Array(_) | KvValue::Document(_) => FieldType::Child,
        }
    }

    /// Whether this value is stored in a child doc-part.
    pub fn is_composite(&self) -> bool {
        matches!(self, KvValue::Array(_) | KvValue::Document(_))
    }
}

impl From<bool> for KvValue {
    fn from(v: bool) -> Self {
        KvValue::Boolean(v)
    }
}

impl From<i32> for KvValue {
    fn from(v: i32) -> Self {
        KvValue::Integer(v)
    }
}

impl From<i64> for KvValue {
    fn from(v: i64) -> Self {
        KvValue::Long(v)
    }
}

impl From<f64> for KvValue {
    fn from(v: f64) -> Self {
        KvValue::Double(v)
    }
}

impl From<Decimal> for KvValue {
    fn from(v: Decimal) -> Self {
        KvValue::Decimal(v)
    }
}

impl From<&str> for KvValue {
    fn from(v: &str) -> Self {
        KvValue::String(v.to_string())
    }
}

impl From<String> for KvValue {
    fn from(v: String) -> Self {
        KvValue::String(v)
    }
}

impl From<NaiveDate> for KvValue {
    fn from(v: NaiveDate) -> Self {
        KvValue::Date(v)
    }
}

impl From<NaiveTime> for KvValue {
    fn from(v: NaiveTime) -> Self {
        KvValue::Time(v)
    }
}

impl From<DateTime<Utc>> for KvValue {
    fn from(v: DateTime<Utc>) -> Self {
        KvValue::Instant(v)
    }
}

impl From<Vec<KvValue>> for KvValue {
    fn from(v: Vec<KvValue>) -> Self {
        KvValue::Array(v)
    }
}

impl From<KvDocument> for KvValue {
    fn from(v: KvDocument) -> Self {
        KvValue::Document(v)
    }
}

/// An ordered map of document keys to values.
///
/// Insertion order is preserved and keys are unique; inserting an existing
/// key replaces its value in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KvDocument {
    entries: Vec<(String, KvValue)>,
}

impl KvDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<KvValue>) -> Option<KvValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Builder-style [`KvDocument::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<KvValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&KvValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KvValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl<K: Into<String>, V: Into<KvValue>> FromIterator<(K, V)> for KvDocument {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut doc = KvDocument::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}

impl IntoIterator for KvDocument {
    type Item = (String, KvValue);
    type IntoIter = std::vec::IntoIter<(String, KvValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_of_values() {
        assert_eq!(KvValue::Null.field_type(), FieldType::Null);
        assert_eq!(KvValue::from(1).field_type(), FieldType::Integer);
        assert_eq!(KvValue::from(1i64).field_type(), FieldType::Long);
        assert_eq!(KvValue::from("x").field_type(), FieldType::String);
        assert_eq!(KvValue::Array(vec![]).field_type(), FieldType::Child);
        assert_eq!(
            KvValue::Document(KvDocument::new()).field_type(),
            FieldType::Child
        );
    }

    #[test]
    fn test_document_preserves_insertion_order() {
        let doc = KvDocument::new().with("z", 1).with("a", 2).with("m", 3);
        let keys: Vec<_> = doc.keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_document_insert_replaces_in_place() {
        let mut doc = KvDocument::new().with("a", 1).with("b", 2);
        let previous = doc.insert("a", "one");
        assert_eq!(previous, Some(KvValue::Integer(1)));
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.keys().next(), Some("a"));
        assert_eq!(doc.get("a"), Some(&KvValue::from("one")));
    }

    #[test]
    fn test_document_from_iter() {
        let doc: KvDocument = vec![("a", KvValue::from(true)), ("b", KvValue::Null)]
            .into_iter()
            .collect();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get("b"), Some(&KvValue::Null));
        assert!(doc.get("c").is_none());
    }
}
