//! Field-order contract implemented by every record kind.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// The kinds of record the engine extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Commit metadata.
    Commit,
    /// Branch heads.
    Branch,
    /// Lightweight and annotated tags.
    Tag,
    /// Per-file change records.
    FileMod,
    /// Line-level file diffs.
    Diff,
}

impl RecordKind {
    /// Stable lowercase name, also used in log output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Branch => "branch",
            Self::Tag => "tag",
            Self::FileMod => "file_mod",
            Self::Diff => "diff",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// UTF-8 text.
    Text,
    /// Unsigned integer.
    Integer,
    /// Boolean flag.
    Boolean,
    /// ISO 8601 timestamp with a fixed UTC offset.
    Timestamp,
    /// Ordered list of text values.
    TextList,
    /// Nested structured value (e.g. diff hunks).
    Nested,
}

/// A named, typed column in a record's row projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Column name.
    pub name: &'static str,
    /// Column value type.
    pub ty: FieldType,
    /// Whether the column may hold `null`.
    pub nullable: bool,
}

impl Field {
    /// A column that always carries a value.
    #[must_use]
    pub const fn required(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
        }
    }

    /// A column that may be `null`.
    #[must_use]
    pub const fn nullable(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
        }
    }
}

/// Ordered key/value projection of a record.
///
/// Column order always matches [`Record::fields`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<(&'static str, Value)>,
}

impl Row {
    /// Create an empty row with room for `capacity` columns.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    /// Append a column value.
    pub fn push(&mut self, name: &'static str, value: impl Into<Value>) {
        self.values.push((name, value.into()));
    }

    /// Look up a column by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(column, _)| *column == name)
            .map(|(_, value)| value)
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.iter().map(|(name, _)| *name)
    }

    /// Iterate over `(column, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.values.iter().map(|(name, value)| (*name, value))
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Convert into a JSON object.
    ///
    /// Key order follows `serde_json`'s map implementation, so prefer
    /// [`Row::iter`] when column order matters.
    #[must_use]
    pub fn into_json(self) -> Value {
        Value::Object(self.values.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Structural description shared by every extracted entity.
pub trait Record: Sized {
    /// The kind of record.
    const KIND: RecordKind;

    /// Ordered column list for the row projection.
    fn fields() -> &'static [Field];

    /// Project the record into a row whose columns match [`Record::fields`].
    fn to_row(&self) -> Row;
}

#[cfg(test)]
pub(crate) fn assert_row_matches_fields<R: Record>(record: &R) {
    let row = record.to_row();
    let expected: Vec<&str> = R::fields().iter().map(|field| field.name).collect();
    let actual: Vec<&str> = row.columns().collect();
    assert_eq!(actual, expected, "{} row columns", R::KIND);
    for (field, (_, value)) in R::fields().iter().zip(row.iter()) {
        if value.is_null() {
            assert!(field.nullable, "{}.{} must not be null", R::KIND, field.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_serializes_in_column_order() {
        let mut row = Row::with_capacity(3);
        row.push("zeta", 1);
        row.push("alpha", "two");
        row.push("mid", Value::Null);

        let json = serde_json::to_string(&row).expect("serialize row");
        assert_eq!(json, r#"{"zeta":1,"alpha":"two","mid":null}"#);
        assert_eq!(row.get("alpha"), Some(&Value::from("two")));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn record_kind_names_are_snake_case() {
        let json = serde_json::to_string(&RecordKind::FileMod).expect("serialize kind");
        assert_eq!(json, "\"file_mod\"");
        assert_eq!(RecordKind::FileMod.to_string(), "file_mod");
    }
}
