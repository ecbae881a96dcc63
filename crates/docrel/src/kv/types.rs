//! Column value-types.

use std::fmt;

/// The closed set of value types a generated column can hold.
///
/// Arrays and sub-documents both map to [`FieldType::Child`]: the column only
/// records whether a child doc-part holds a sub-document (`true`) or array
/// elements (`false`) for that row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldType {
    Null = 0,
    Boolean = 1,
    Integer = 2,
    Long = 3,
    Double = 4,
    Decimal = 5,
    String = 6,
    Date = 7,
    Time = 8,
    Instant = 9,
    Binary = 10,
    ObjectId = 11,
    Child = 12,
}

impl FieldType {
    /// Number of variants; sizes per-type lookup tables.
    pub const COUNT: usize = 13;

    /// Every variant, in discriminant order.
    pub const ALL: [FieldType; FieldType::COUNT] = [
        FieldType::Null,
        FieldType::Boolean,
        FieldType::Integer,
        FieldType::Long,
        FieldType::Double,
        FieldType::Decimal,
        FieldType::String,
        FieldType::Date,
        FieldType::Time,
        FieldType::Instant,
        FieldType::Binary,
        FieldType::ObjectId,
        FieldType::Child,
    ];

    /// Position of this type in per-type lookup tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Stable one-character code, used as column suffix and in persisted
    /// metadata. Never change an existing code.
    pub fn code(self) -> char {
        match self {
            FieldType::Null => 'n',
            FieldType::Boolean => 'b',
            FieldType::Integer => 'i',
            FieldType::Long => 'l',
            FieldType::Double => 'd',
            FieldType::Decimal => 'm',
            FieldType::String => 's',
            FieldType::Date => 'c',
            FieldType::Time => 't',
            FieldType::Instant => 'g',
            FieldType::Binary => 'r',
            FieldType::ObjectId => 'x',
            FieldType::Child => 'e',
        }
    }

    /// Inverse of [`FieldType::code`].
    pub fn from_code(code: char) -> Option<FieldType> {
        FieldType::ALL.into_iter().find(|t| t.code() == code)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Null => "null",
            FieldType::Boolean => "boolean",
            FieldType::Integer => "integer",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::Decimal => "decimal",
            FieldType::String => "string",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Instant => "instant",
            FieldType::Binary => "binary",
            FieldType::ObjectId => "object_id",
            FieldType::Child => "child",
        };
        f.write_str(name)
    }
}
