use serde::{Deserialize, Serialize};

use crate::record::{Field, FieldType, Record, RecordKind, Row};

/// A branch head in the working copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Short branch name (e.g. `main`, `feature/login`).
    pub name: String,
    /// Hash of the commit the branch points at.
    pub tip: String,
    /// Whether this is the repository's default branch.
    pub is_default: bool,
}

/// A lightweight or annotated tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Short tag name (e.g. `v1.0.0`).
    pub name: String,
    /// Hash of the commit the tag ultimately references.
    pub target: String,
    /// Hash of the tag object itself, for annotated tags.
    #[serde(default)]
    pub tag_object: Option<String>,
    /// Tag message, for annotated tags.
    #[serde(default)]
    pub annotation: Option<String>,
}

impl Tag {
    /// Whether the tag carries its own tag object.
    #[must_use]
    pub const fn is_annotated(&self) -> bool {
        self.tag_object.is_some()
    }
}

const BRANCH_FIELDS: &[Field] = &[
    Field::required("name", FieldType::Text),
    Field::required("tip", FieldType::Text),
    Field::required("is_default", FieldType::Boolean),
];

const TAG_FIELDS: &[Field] = &[
    Field::required("name", FieldType::Text),
    Field::required("target", FieldType::Text),
    Field::nullable("tag_object", FieldType::Text),
    Field::nullable("annotation", FieldType::Text),
];

impl Record for Branch {
    const KIND: RecordKind = RecordKind::Branch;

    fn fields() -> &'static [Field] {
        BRANCH_FIELDS
    }

    fn to_row(&self) -> Row {
        let mut row = Row::with_capacity(BRANCH_FIELDS.len());
        row.push("name", self.name.as_str());
        row.push("tip", self.tip.as_str());
        row.push("is_default", self.is_default);
        row
    }
}

impl Record for Tag {
    const KIND: RecordKind = RecordKind::Tag;

    fn fields() -> &'static [Field] {
        TAG_FIELDS
    }

    fn to_row(&self) -> Row {
        let mut row = Row::with_capacity(TAG_FIELDS.len());
        row.push("name", self.name.as_str());
        row.push("target", self.target.as_str());
        row.push("tag_object", self.tag_object.clone());
        row.push("annotation", self.annotation.clone());
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::assert_row_matches_fields;

    #[test]
    fn rows_match_field_contract() {
        assert_row_matches_fields(&Branch {
            name: "main".into(),
            tip: "0123456789abcdef0123456789abcdef01234567".into(),
            is_default: true,
        });
        assert_row_matches_fields(&Tag {
            name: "v1".into(),
            target: "0123456789abcdef0123456789abcdef01234567".into(),
            tag_object: None,
            annotation: None,
        });
    }

    #[test]
    fn tag_defaults_to_lightweight() {
        let json = r#"{"name":"v1","target":"abc"}"#;
        let tag: Tag = serde_json::from_str(json).expect("deserialize tag");
        assert!(!tag.is_annotated());
        assert!(tag.annotation.is_none());
    }
}
