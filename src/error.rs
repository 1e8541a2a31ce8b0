use rusqlite::ErrorCode;
use thiserror::Error;

use crate::datatype::{Id, Version};

#[derive(Error, Debug)]
pub enum GuideError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("No {entity} with number {id}")]
    NotFound { entity: &'static str, id: Id },
    #[error("Conflict on {entity} {id}: expected version {expected}, found {found}")]
    Conflict {
        entity: &'static str,
        id: Id,
        expected: Version,
        found: Version,
    },
    #[error("Constraint violation on {table}.{column}: '{value}'")]
    ConstraintViolation {
        table: &'static str,
        column: &'static str,
        value: String,
    },
    #[error("Store failure: {0}")]
    Resource(String),
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
    #[error("Invalid request: {0}")]
    Invalid(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, GuideError>;

impl GuideError {
    /// True when reloading the entity and retrying may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}

// Helper conversions
impl From<rusqlite::Error> for GuideError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::FromSqlConversionFailure(column, _, cause) => Self::DataCorruption {
                message: format!("column {column}: {cause}"),
            },
            rusqlite::Error::IntegralValueOutOfRange(column, value) => Self::DataCorruption {
                message: format!("column {column}: value {value} out of range"),
            },
            other => Self::Resource(other.to_string()),
        }
    }
}

/// Classifies a failed write: constraint failures keep the offending value so
/// the caller can re-prompt, everything else is an infrastructure failure.
pub(crate) fn classify(
    e: rusqlite::Error,
    table: &'static str,
    column: &'static str,
    value: impl ToString,
) -> GuideError {
    match &e {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            let value = value.to_string();
            tracing::warn!(table, column, %value, detail = %e, "constraint violated");
            GuideError::ConstraintViolation {
                table,
                column,
                value,
            }
        }
        _ => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn unique_failure_is_classified_with_value() {
        let db = Connection::open_in_memory().unwrap();
        db.execute_batch("create table T (v text unique); insert into T values ('x');")
            .unwrap();
        let e = db.execute("insert into T values ('x')", []).unwrap_err();
        match classify(e, "T", "v", "x") {
            GuideError::ConstraintViolation { table, column, value } => {
                assert_eq!((table, column, value.as_str()), ("T", "v", "x"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_failures_are_resource_failures() {
        let db = Connection::open_in_memory().unwrap();
        let e = db.execute("insert into Missing values (1)", []).unwrap_err();
        assert!(matches!(classify(e, "Missing", "v", 1), GuideError::Resource(_)));
    }
}
