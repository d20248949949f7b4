//! Static entity metadata.

use serde::{Deserialize, Serialize};

/// Soft-delete flag values stored in an entity's deleted-flag column.
pub struct DeletedFlag;

impl DeletedFlag {
    /// Row is live.
    pub const NORMAL: i32 = 1;
    /// Row is logically deleted.
    pub const DELETED: i32 = -1;
}

/// Mapping between an entity field and its table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    pub column: String,
}

/// Describes how an entity type maps onto its table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    /// Model name, used as the key in registries and in predicate `model` tags
    pub name: String,
    pub table: String,
    pub id_field: String,
    pub fields: Vec<FieldMeta>,
    /// Field holding the soft-delete flag, if the entity supports logical delete
    pub deleted_flag_field: Option<String>,
    pub update_time_field: Option<String>,
    /// Fields filled by relation assembly; they have no column
    #[serde(default)]
    pub relation_fields: Vec<String>,
}

impl EntityMeta {
    /// Create metadata with the given id field mapped to the column of the same name.
    pub fn new(name: impl Into<String>, table: impl Into<String>, id_field: impl Into<String>) -> Self {
        let id_field = id_field.into();
        Self {
            name: name.into(),
            table: table.into(),
            fields: vec![FieldMeta {
                name: id_field.clone(),
                column: id_field.clone(),
            }],
            id_field,
            deleted_flag_field: None,
            update_time_field: None,
            relation_fields: Vec::new(),
        }
    }

    /// Map a field to a column. Re-mapping an existing field replaces its column.
    pub fn field(mut self, name: impl Into<String>, column: impl Into<String>) -> Self {
        let name = name.into();
        let column = column.into();
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == name) {
            existing.column = column;
        } else {
            self.fields.push(FieldMeta { name, column });
        }
        self
    }

    /// Declare the soft-delete flag field; it must already be mapped or is mapped to itself.
    pub fn deleted_flag(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.column_of(&name).is_none() {
            self = self.field(name.clone(), name.clone());
        }
        self.deleted_flag_field = Some(name);
        self
    }

    /// Declare the last-update-time field.
    pub fn update_time(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.column_of(&name).is_none() {
            self = self.field(name.clone(), name.clone());
        }
        self.update_time_field = Some(name);
        self
    }

    /// Declare fields that relation assembly may fill.
    pub fn relation_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.relation_fields.contains(&name) {
                self.relation_fields.push(name);
            }
        }
        self
    }

    /// Column for a field, if mapped.
    pub fn column_of(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == field)
            .map(|f| f.column.as_str())
    }

    /// Field for a column, if mapped.
    pub fn field_of(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.column == column)
            .map(|f| f.name.as_str())
    }

    pub fn id_column(&self) -> &str {
        self.column_of(&self.id_field).unwrap_or(&self.id_field)
    }

    pub fn deleted_flag_column(&self) -> Option<&str> {
        self.deleted_flag_field
            .as_deref()
            .and_then(|f| self.column_of(f))
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.column_of(field).is_some()
    }

    pub fn has_relation_field(&self, field: &str) -> bool {
        self.relation_fields.iter().any(|f| f == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student() -> EntityMeta {
        EntityMeta::new("Student", "zz_student", "studentId")
            .field("studentId", "student_id")
            .field("courseId", "course_id")
            .deleted_flag("deletedFlag")
            .update_time("updateTime")
    }

    #[test]
    fn column_mapping() {
        let meta = student();
        assert_eq!(meta.id_column(), "student_id");
        assert_eq!(meta.column_of("courseId"), Some("course_id"));
        assert_eq!(meta.field_of("course_id"), Some("courseId"));
        assert_eq!(meta.deleted_flag_column(), Some("deletedFlag"));
        assert!(meta.has_field("updateTime"));
        assert!(!meta.has_field("nope"));
    }

    #[test]
    fn relation_fields_have_no_column() {
        let meta = student().relation_fields(["course", "totalScore", "course"]);
        assert_eq!(meta.relation_fields, vec!["course", "totalScore"]);
        assert!(meta.has_relation_field("course"));
        assert!(!meta.has_field("course"));
        assert!(!meta.has_relation_field("courseId"));
    }

    #[test]
    fn remapping_does_not_duplicate() {
        let meta = student();
        assert_eq!(
            meta.fields.iter().filter(|f| f.name == "studentId").count(),
            1
        );
    }
}
