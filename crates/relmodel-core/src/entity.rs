//! The field lens the relation engine reads and writes entities through.

use crate::{AccessError, AccessErrorKind, Record, Result, Value};

/// An entity instance the engine can enrich.
///
/// Implementations expose fields by name. The engine reads master-id fields
/// with `get_field` and writes relation fields with `set_field`; it never
/// touches fields it was not told about in a relation declaration.
pub trait Entity: Send + Sync {
    /// Read a field. Unknown or unset fields read as `Value::Null`.
    fn get_field(&self, field: &str) -> Value;

    /// Overwrite a field. Unknown fields are an error.
    fn set_field(&mut self, field: &str, value: Value) -> Result<()>;

    /// Build an instance from a field-keyed record.
    fn from_record(record: Record) -> Result<Self>
    where
        Self: Sized;

    /// Render the instance as a field-keyed record.
    fn to_record(&self) -> Record;
}

impl Entity for Record {
    fn get_field(&self, field: &str) -> Value {
        self.get_or_null(field)
    }

    fn set_field(&mut self, field: &str, value: Value) -> Result<()> {
        self.set(field, value);
        Ok(())
    }

    fn from_record(record: Record) -> Result<Self> {
        Ok(record)
    }

    fn to_record(&self) -> Record {
        self.clone()
    }
}

/// Error for a `set_field` on a field the entity does not have.
pub fn unknown_field(entity: &str, field: &str) -> crate::Error {
    AccessError {
        kind: AccessErrorKind::UnknownField,
        entity: entity.to_string(),
        field: field.to_string(),
        message: "no such field".to_string(),
    }
    .into()
}
