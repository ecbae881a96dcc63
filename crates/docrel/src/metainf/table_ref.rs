//! Paths from a collection root to its document parts.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One step of a [`TableRef`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRefSegment {
    /// Descend into the sub-document or array stored under a key.
    Field(String),
    /// Descend into an array nested directly inside another array. The first
    /// nested level is dimension 2.
    ArrayDimension(u32),
}

/// Path from the collection root to a doc-part.
///
/// Ordering is by depth first, then segment by segment, so a path always
/// sorts before every extension of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableRef {
    segments: Vec<TableRefSegment>,
}

impl TableRef {
    /// The collection root.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<TableRefSegment>) -> Self {
        Self { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[TableRefSegment] {
        &self.segments
    }

    /// Parent path; `None` for the root.
    pub fn parent(&self) -> Option<TableRef> {
        if self.is_root() {
            return None;
        }
        Some(TableRef {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Child doc-part for the composite value stored under `name`.
    #[must_use]
    pub fn child_field(&self, name: &str) -> TableRef {
        let mut segments = self.segments.clone();
        segments.push(TableRefSegment::Field(name.to_string()));
        TableRef { segments }
    }

    /// Child doc-part for an array nested directly in this array doc-part.
    #[must_use]
    pub fn child_array(&self) -> TableRef {
        let dimension = match self.segments.last() {
            Some(TableRefSegment::ArrayDimension(n)) => n + 1,
            _ => 2,
        };
        let mut segments = self.segments.clone();
        segments.push(TableRefSegment::ArrayDimension(dimension));
        TableRef { segments }
    }

    /// Whether `self` is a proper prefix of `other`.
    pub fn is_ancestor_of(&self, other: &TableRef) -> bool {
        self.depth() < other.depth() && other.segments.starts_with(&self.segments)
    }

    /// JSON form used by the metadata tables.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Ord for TableRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.depth()
            .cmp(&other.depth())
            .then_with(|| self.segments.cmp(&other.segments))
    }
}

impl PartialOrd for TableRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("<root>");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match segment {
                TableRefSegment::Field(name) => f.write_str(name)?,
                TableRefSegment::ArrayDimension(n) => write!(f, "[{}]", n)?,
            }
        }
        Ok(())
    }
}

/// Traversal order over the doc-parts of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRefOrder {
    /// Parents before children (creation, insertion).
    Ascending,
    /// Children before parents (deletion, reads).
    Descending,
}

impl TableRefOrder {
    /// Sort `items` by their table ref in this order.
    pub fn sort<T, F>(self, items: &mut [T], key: F)
    where
        F: Fn(&T) -> &TableRef,
    {
        match self {
            TableRefOrder::Ascending => items.sort_by(|a, b| key(a).cmp(key(b))),
            TableRefOrder::Descending => items.sort_by(|a, b| key(b).cmp(key(a))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root() {
        let root = TableRef::root();
        assert!(root.is_root());
        assert_eq!(root.depth(), 0);
        assert!(root.parent().is_none());
        assert_eq!(root.to_string(), "<root>");
    }

    #[test]
    fn test_child_paths() {
        let b = TableRef::root().child_field("b");
        assert_eq!(b.depth(), 1);
        assert_eq!(b.parent(), Some(TableRef::root()));

        let nested = b.child_array().child_array();
        assert_eq!(
            nested.segments(),
            &[
                TableRefSegment::Field("b".into()),
                TableRefSegment::ArrayDimension(2),
                TableRefSegment::ArrayDimension(3),
            ]
        );
        assert_eq!(nested.to_string(), "b.[2].[3]");
    }

    #[test]
    fn test_prefix_sorts_first() {
        let pairs = [
            (TableRef::root(), TableRef::root().child_field("a")),
            (
                TableRef::root().child_field("z"),
                TableRef::root().child_field("z").child_field("a"),
            ),
            (
                TableRef::root().child_field("m"),
                TableRef::root().child_field("m").child_array(),
            ),
        ];

        for (a, b) in pairs {
            assert!(a.is_ancestor_of(&b));
            assert!(a < b);

            let mut items = vec![b.clone(), a.clone()];
            TableRefOrder::Ascending.sort(&mut items, |t| t);
            assert_eq!(items, vec![a.clone(), b.clone()]);

            TableRefOrder::Descending.sort(&mut items, |t| t);
            assert_eq!(items, vec![b.clone(), a.clone()]);
        }
    }

    #[test]
    fn test_depth_dominates_names() {
        // "z" is shallower than "a.a" even though it compares greater by name
        let z = TableRef::root().child_field("z");
        let aa = TableRef::root().child_field("a").child_field("a");
        assert!(z < aa);
    }

    #[test]
    fn test_json_form() {
        let table_ref = TableRef::root().child_field("b").child_array();
        let json = table_ref.to_json().unwrap();
        assert_eq!(json, r#"[{"field":"b"},{"array_dimension":2}]"#);
        assert_eq!(TableRef::from_json(&json).unwrap(), table_ref);
        assert_eq!(TableRef::from_json("[]").unwrap(), TableRef::root());
    }
}
