//! Shared, versioned metadata.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::core::identifier::{IdentifierFactory, IdentifierPolicy};
use crate::error::Result;

use super::model::MetaCollection;
use super::snapshot::{ImmutableMetaSnapshot, MetaChange, MutableMetaSnapshot};

/// Holds the current [`ImmutableMetaSnapshot`].
///
/// Readers take an `Arc` to the current version and keep using it for as
/// long as they like. Writers work on a [`MutableMetaSnapshot`] and publish
/// its changes with [`MetainfoRepository::merge`]; the write lock is held only
/// for the in-memory merge.
#[derive(Debug)]
pub struct MetainfoRepository {
    current: RwLock<Arc<ImmutableMetaSnapshot>>,
    factory: IdentifierFactory,
}

impl MetainfoRepository {
    pub fn new(policy: IdentifierPolicy) -> Self {
        Self::with_snapshot(ImmutableMetaSnapshot::new(), policy)
    }

    pub fn with_snapshot(snapshot: ImmutableMetaSnapshot, policy: IdentifierPolicy) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            factory: IdentifierFactory::new(policy),
        }
    }

    /// The current version.
    pub fn snapshot(&self) -> Arc<ImmutableMetaSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Start a private working copy of the current version.
    pub fn begin(&self) -> MutableMetaSnapshot {
        MutableMetaSnapshot::new(&self.snapshot(), self.factory)
    }

    /// Fail with `MetaConflict` if `changes` could not be merged into the
    /// current version. Publishes nothing.
    pub fn check(&self, changes: &[MetaChange]) -> Result<()> {
        let current = self.snapshot();
        apply_all(&current, changes).map(|_| ())
    }

    /// Publish `changes` as a new version.
    ///
    /// Elements that already exist with the same identifier are skipped. If
    /// any change conflicts, nothing is published and `MetaConflict` is
    /// returned.
    pub fn merge(&self, changes: &[MetaChange]) -> Result<Arc<ImmutableMetaSnapshot>> {
        let mut guard = self.current.write();
        let (next, applied) = apply_all(&guard, changes)?;

        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        debug!(
            "Merged {} metadata changes ({} new, {} already known)",
            changes.len(),
            applied,
            changes.len() - applied
        );
        Ok(next)
    }

    /// Forget a collection (after its tables were dropped).
    pub fn remove_collection(&self, database: &str, collection: &str) -> Option<Arc<MetaCollection>> {
        let mut guard = self.current.write();
        let mut next = ImmutableMetaSnapshot::clone(&guard);
        let removed = next.remove_collection(database, collection)?;
        *guard = Arc::new(next);
        debug!("Removed collection {}.{} from metadata", database, collection);
        Some(removed)
    }

    /// Replace the whole snapshot with one reloaded from the backend.
    pub fn replace(&self, snapshot: ImmutableMetaSnapshot) {
        *self.current.write() = Arc::new(snapshot);
    }
}

/// Apply `changes` to a copy of `base`; returns the copy and how many
/// changes were new.
fn apply_all(base: &ImmutableMetaSnapshot, changes: &[MetaChange]) -> Result<(ImmutableMetaSnapshot, usize)> {
    let mut next = base.clone();
    let mut applied = 0usize;
    for change in changes {
        if next.apply(change)? {
            applied += 1;
        }
    }
    Ok((next, applied))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocrelError;
    use crate::kv::FieldType;
    use crate::metainf::TableRef;

    const POLICY: IdentifierPolicy = IdentifierPolicy {
        max_length: 63,
        reserved_words: &[],
        reserved_prefixes: &[],
    };

    #[test]
    fn test_merge_publishes_new_version() {
        let repo = MetainfoRepository::new(POLICY);
        let before = repo.snapshot();

        let mut meta = repo.begin();
        meta.ensure_field("db", "c", &TableRef::root(), "a", FieldType::Integer)
            .unwrap();
        let after = repo.merge(meta.changes()).unwrap();

        assert!(before.database("db").is_none());
        assert!(after.doc_part("db", "c", &TableRef::root()).is_some());
        assert!(repo.snapshot().database("db").is_some());
    }

    #[test]
    fn test_concurrent_identical_registration_is_benign() {
        let repo = MetainfoRepository::new(POLICY);
        let mut first = repo.begin();
        let mut second = repo.begin();
        for meta in [&mut first, &mut second] {
            meta.ensure_field("db", "c", &TableRef::root().child_field("b"), "x", FieldType::String)
                .unwrap();
        }

        repo.merge(first.changes()).unwrap();
        let merged = repo.merge(second.changes()).unwrap();
        let doc_part = merged
            .doc_part("db", "c", &TableRef::root().child_field("b"))
            .unwrap();
        assert_eq!(doc_part.field_count(), 1);
    }

    #[test]
    fn test_conflicting_merge_publishes_nothing() {
        let repo = MetainfoRepository::new(POLICY);
        let mut first = repo.begin();
        let mut second = repo.begin();

        // Root doc-part registered by `second` under a different identifier
        first
            .ensure_field("db", "c", &TableRef::root(), "a", FieldType::Integer)
            .unwrap();
        repo.merge(first.changes()).unwrap();

        second.ensure_collection("db", "c").unwrap();
        let mut changes = second.into_changes();
        changes.push(MetaChange::DocPart {
            database: "db".into(),
            collection: "c".into(),
            table_ref: TableRef::root(),
            identifier: "c_other".into(),
        });

        let version = repo.snapshot();
        let err = repo.merge(&changes).unwrap_err();
        assert!(matches!(err, DocrelError::MetaConflict(_)));
        assert!(Arc::ptr_eq(&version, &repo.snapshot()));
    }

    #[test]
    fn test_check_sees_identifiers_published_meanwhile() {
        let repo = MetainfoRepository::new(POLICY);
        let mut first = repo.begin();
        let mut second = repo.begin();
        first
            .ensure_field("db", "c", &TableRef::root(), "A", FieldType::Integer)
            .unwrap();
        second
            .ensure_field("db", "c", &TableRef::root(), "a", FieldType::Integer)
            .unwrap();

        repo.check(second.changes()).unwrap();
        repo.merge(first.changes()).unwrap();
        let version = repo.snapshot();
        assert!(matches!(
            repo.check(second.changes()),
            Err(DocrelError::MetaConflict(_))
        ));
        assert!(Arc::ptr_eq(&version, &repo.snapshot()));

        // A fresh working copy picks the next free identifier
        let mut retry = repo.begin();
        retry
            .ensure_field("db", "c", &TableRef::root(), "a", FieldType::Integer)
            .unwrap();
        repo.check(retry.changes()).unwrap();
        let merged = repo.merge(retry.changes()).unwrap();
        let root = merged.doc_part("db", "c", &TableRef::root()).unwrap();
        assert_eq!(root.field_count(), 2);
    }

    #[test]
    fn test_replace_swaps_version() {
        let repo = MetainfoRepository::new(POLICY);
        let mut meta = repo.begin();
        meta.ensure_doc_part("db", "c", &TableRef::root()).unwrap();
        let reloaded = {
            let mut snapshot = ImmutableMetaSnapshot::new();
            for change in meta.changes() {
                snapshot.apply(change).unwrap();
            }
            snapshot
        };

        let before = repo.snapshot();
        repo.replace(reloaded);
        assert!(before.collection("db", "c").is_none());
        assert!(repo.snapshot().collection("db", "c").is_some());
    }

    #[test]
    fn test_remove_collection() {
        let repo = MetainfoRepository::new(POLICY);
        let mut meta = repo.begin();
        meta.ensure_doc_part("db", "c", &TableRef::root()).unwrap();
        repo.merge(meta.changes()).unwrap();

        assert!(repo.remove_collection("db", "c").is_some());
        assert!(repo.snapshot().collection("db", "c").is_none());
        assert!(repo.remove_collection("db", "c").is_none());
    }
}
