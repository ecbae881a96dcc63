//! Column types used in DDL for each field type.

use crate::kv::FieldType;

/// Map a field type to its PostgreSQL column type.
pub fn postgres_column_type(field_type: FieldType) -> &'static str {
    match field_type {
        // Null columns only record presence
        FieldType::Null | FieldType::Boolean | FieldType::Child => "BOOLEAN",

        FieldType::Integer => "INTEGER",
        FieldType::Long => "BIGINT",
        FieldType::Double => "DOUBLE PRECISION",
        FieldType::Decimal => "NUMERIC",
        FieldType::String => "TEXT",

        FieldType::Date => "DATE",
        FieldType::Time => "TIME",
        FieldType::Instant => "TIMESTAMP",

        FieldType::Binary | FieldType::ObjectId => "BYTEA",
    }
}

/// Map a field type to its SQLite column type (storage class affinity).
///
/// Decimals and temporal values are stored as text to keep their exact
/// representation.
pub fn sqlite_column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Null
        | FieldType::Boolean
        | FieldType::Integer
        | FieldType::Long
        | FieldType::Child => "INTEGER",

        FieldType::Double => "REAL",

        FieldType::Decimal
        | FieldType::String
        | FieldType::Date
        | FieldType::Time
        | FieldType::Instant => "TEXT",

        FieldType::Binary | FieldType::ObjectId => "BLOB",
    }
}
