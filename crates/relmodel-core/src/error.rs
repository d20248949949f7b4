//! Error types for relation assembly and data-service operations.

use std::fmt;

/// The primary error type for all relmodel operations.
#[derive(Debug)]
pub enum Error {
    /// Relation schema errors (bad declarations, unknown fields, unresolved handles)
    Schema(SchemaError),
    /// Local store query errors
    Query(QueryError),
    /// A remote service answered with a failure
    Remote(RemoteDataError),
    /// Entity field access errors
    Access(AccessError),
    /// Configuration errors
    Config(ConfigError),
    /// Operation was cancelled via asupersync
    Cancelled,
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    /// Entity the failing declaration belongs to, if known
    pub entity: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Aggregation type code or name outside SUM/COUNT/AVG/MIN/MAX
    InvalidAggregation,
    /// A declared field has no column mapping on its model
    UnknownField,
    /// A local service, remote client, model or constant dictionary is not registered
    UnresolvedHandle,
    /// Identifier rejected by validation
    InvalidIdentifier,
    /// Declaration is inconsistent with its relation kind
    Invalid,
}

#[derive(Debug)]
pub struct QueryError {
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Failure reported by a remote service through its response envelope.
#[derive(Debug, Clone)]
pub struct RemoteDataError {
    /// Remote client name the call went to
    pub service: String,
    /// Operation that failed (`list_by`, `aggregate_by`, ...)
    pub operation: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct AccessError {
    pub kind: AccessErrorKind,
    pub entity: String,
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessErrorKind {
    /// Field does not exist on the entity
    UnknownField,
    /// Value could not be stored into the field
    TypeMismatch,
    /// Record could not be converted into the entity type
    Conversion,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Build a schema error with the given kind.
    pub fn schema(kind: SchemaErrorKind, message: impl Into<String>) -> Self {
        Error::Schema(SchemaError {
            kind,
            entity: None,
            message: message.into(),
        })
    }

    /// Build a query error without attached SQL.
    pub fn query(message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            sql: None,
            message: message.into(),
            source: None,
        })
    }

    /// Is this a declaration/schema error? These are never ignored by policy.
    pub fn is_schema_error(&self) -> bool {
        matches!(self, Error::Schema(_))
    }

    /// Is this a remote data error?
    pub fn is_remote_error(&self) -> bool {
        matches!(self, Error::Remote(_))
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl SchemaError {
    /// Attach the owning entity name.
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Schema(e) => match &e.entity {
                Some(entity) => write!(f, "Schema error on '{}': {}", entity, e.message),
                None => write!(f, "Schema error: {}", e.message),
            },
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Remote(e) => write!(
                f,
                "Remote data error from '{}' ({}): {}",
                e.service, e.operation, e.message
            ),
            Error::Access(e) => write!(
                f,
                "Field access error on '{}.{}': {}",
                e.entity, e.field, e.message
            ),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for RemoteDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.service, self.operation, self.message)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<RemoteDataError> for Error {
    fn from(err: RemoteDataError) -> Self {
        Error::Remote(err)
    }
}

impl From<AccessError> for Error {
    fn from(err: AccessError) -> Self {
        Error::Access(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for relmodel operations.
pub type Result<T> = std::result::Result<T, Error>;
