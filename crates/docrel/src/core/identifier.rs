//! Identifier generation and quoting.
//!
//! Document field names, collection names and database names are arbitrary
//! user strings; the relational objects that store them need identifiers
//! every backend accepts. This module turns names into identifiers that are:
//!
//! - lowercase ASCII `[a-z0-9_]`, never starting with a digit,
//! - within the dialect's length limit,
//! - never a dialect reserved word (or reserved prefix),
//! - unique in their namespace (the caller supplies the "is taken" check),
//! - deterministic: the same name in the same namespace state always yields
//!   the same identifier, so two writers racing on the same structure pick the
//!   same identifier.
//!
//! Collisions are resolved by appending `_1`, `_2`, ... before the type suffix;
//! names starting with a reserved prefix get a leading underscore.
//!
//! Generated identifiers are still quoted in SQL: identifiers cannot be passed
//! as statement parameters, so [`quote_double`] escapes embedded quotes for the
//! dialects that use double-quote quoting.

use crate::kv::FieldType;
use crate::metainf::{TableRef, TableRefSegment};

/// Internal columns present on doc-part tables. Field columns can never take
/// these names.
pub const INTERNAL_COLUMNS: &[&str] = &["did", "rid", "pid", "seq"];

/// Per-dialect identifier constraints.
#[derive(Debug, Clone, Copy)]
pub struct IdentifierPolicy {
    /// Maximum identifier length in bytes.
    pub max_length: usize,
    /// Words the dialect refuses (or handles specially) as identifiers.
    pub reserved_words: &'static [&'static str],
    /// Prefixes the dialect reserves for its own objects.
    pub reserved_prefixes: &'static [&'static str],
}

impl IdentifierPolicy {
    /// Whether `candidate` (already lowercase) is unusable under this policy.
    pub fn is_reserved(&self, candidate: &str) -> bool {
        self.reserved_words.contains(&candidate)
            || INTERNAL_COLUMNS.contains(&candidate)
            || self
                .reserved_prefixes
                .iter()
                .any(|prefix| candidate.starts_with(prefix))
    }
}

/// Deterministic identifier generator.
#[derive(Debug, Clone, Copy)]
pub struct IdentifierFactory {
    policy: IdentifierPolicy,
}

impl IdentifierFactory {
    pub fn new(policy: IdentifierPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &IdentifierPolicy {
        &self.policy
    }

    /// Backend schema for a logical database.
    pub fn schema_identifier(&self, database: &str, is_taken: impl Fn(&str) -> bool) -> String {
        self.generate(database, "", is_taken)
    }

    /// Prefix for every table of a collection; also the root table name.
    pub fn collection_identifier(
        &self,
        collection: &str,
        is_taken: impl Fn(&str) -> bool,
    ) -> String {
        self.generate(collection, "", is_taken)
    }

    /// Table for the doc-part at `table_ref`, unique across the database.
    pub fn table_identifier(
        &self,
        collection_identifier: &str,
        table_ref: &TableRef,
        is_taken: impl Fn(&str) -> bool,
    ) -> String {
        let mut base = collection_identifier.to_string();
        for segment in table_ref.segments() {
            base.push('_');
            match segment {
                TableRefSegment::Field(name) => base.push_str(&sanitize(name)),
                TableRefSegment::ArrayDimension(dimension) => {
                    base.push_str(&dimension.to_string())
                }
            }
        }
        self.generate(&base, "", is_taken)
    }

    /// Column for field `name` of `field_type`, unique within its doc-part.
    pub fn column_identifier(
        &self,
        name: &str,
        field_type: FieldType,
        is_taken: impl Fn(&str) -> bool,
    ) -> String {
        let suffix = format!("_{}", field_type.code());
        self.generate(name, &suffix, is_taken)
    }

    fn generate(&self, base: &str, suffix: &str, is_taken: impl Fn(&str) -> bool) -> String {
        let mut base = sanitize(base);
        if self
            .policy
            .reserved_prefixes
            .iter()
            .any(|prefix| base.starts_with(prefix))
        {
            base.insert(0, '_');
        }
        let mut counter = 0usize;
        loop {
            let tag = if counter == 0 {
                String::new()
            } else {
                format!("_{}", counter)
            };
            let budget = self
                .policy
                .max_length
                .saturating_sub(suffix.len() + tag.len())
                .max(1);
            // sanitize() output is ASCII, so byte truncation is char-safe
            let stem = &base[..base.len().min(budget)];
            let candidate = format!("{}{}{}", stem, tag, suffix);

            if !self.policy.is_reserved(&candidate) && !is_taken(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Reduce an arbitrary name to `[a-z0-9_]`, not starting with a digit.
pub fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if out.is_empty() {
        out.push('x');
    } else if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Quote an identifier with double quotes (PostgreSQL, SQLite).
///
/// Escapes embedded double quotes by doubling them.
pub fn quote_double(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: IdentifierPolicy = IdentifierPolicy {
        max_length: 16,
        reserved_words: &["select", "table", "user"],
        reserved_prefixes: &["pg_"],
    };

    fn factory() -> IdentifierFactory {
        IdentifierFactory::new(POLICY)
    }

    fn never(_: &str) -> bool {
        false
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Hello World"), "hello_world");
        assert_eq!(sanitize("a.b-c"), "a_b_c");
        assert_eq!(sanitize("9lives"), "_9lives");
        assert_eq!(sanitize("ñandú"), "_and_");
        assert_eq!(sanitize(""), "x");
        assert_eq!(sanitize("$v"), "_v");
    }

    #[test]
    fn test_column_identifier_carries_type_suffix() {
        let f = factory();
        assert_eq!(f.column_identifier("a", FieldType::Integer, never), "a_i");
        assert_eq!(f.column_identifier("a", FieldType::String, never), "a_s");
        assert_eq!(f.column_identifier("b", FieldType::Child, never), "b_e");
    }

    #[test]
    fn test_reserved_words_are_avoided() {
        let f = factory();
        assert_eq!(f.collection_identifier("user", never), "user_1");
        assert_eq!(f.collection_identifier("SELECT", never), "select_1");
        assert_eq!(f.schema_identifier("pg_things", never), "_pg_things");
        // A suffixed column never collides with the bare word
        assert_eq!(f.column_identifier("select", FieldType::String, never), "select_s");
    }

    #[test]
    fn test_internal_columns_are_reserved() {
        for name in INTERNAL_COLUMNS {
            assert!(POLICY.is_reserved(name));
        }
        assert_eq!(factory().collection_identifier("did", never), "did_1");
    }

    #[test]
    fn test_collision_counter() {
        let f = factory();
        let taken = ["a_i", "a_1_i"];
        let id = f.column_identifier("a", FieldType::Integer, |c| taken.contains(&c));
        assert_eq!(id, "a_2_i");
    }

    #[test]
    fn test_length_limit_respected() {
        let f = factory();
        let long = "abcdefghijklmnopqrstuvwxyz";
        let id = f.column_identifier(long, FieldType::Long, never);
        assert_eq!(id, "abcdefghijklmn_l");
        assert!(id.len() <= POLICY.max_length);

        let id = f.column_identifier(long, FieldType::Long, |c| c == "abcdefghijklmn_l");
        assert_eq!(id, "abcdefghijkl_1_l");
        assert!(id.len() <= POLICY.max_length);
    }

    #[test]
    fn test_deterministic() {
        let f = factory();
        let a = f.table_identifier("orders", &TableRef::root().child_field("Items"), never);
        let b = f.table_identifier("orders", &TableRef::root().child_field("Items"), never);
        assert_eq!(a, b);
        assert_eq!(a, "orders_items");
    }

    #[test]
    fn test_table_identifier_for_nested_arrays() {
        let f = IdentifierFactory::new(IdentifierPolicy {
            max_length: 63,
            ..POLICY
        });
        let table_ref = TableRef::root().child_field("m").child_array();
        assert_eq!(f.table_identifier("c", &table_ref, never), "c_m_2");
    }

    #[test]
    fn test_quote_double() {
        assert_eq!(quote_double("users"), "\"users\"");
        assert_eq!(quote_double("table\"name"), "\"table\"\"name\"");
        assert_eq!(quote_double("db.table"), "\"db.table\"");
    }
}
