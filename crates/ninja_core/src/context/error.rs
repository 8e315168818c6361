//! Session-level error type.
//!
//! SQLite failures are classified at the boundary so callers can tell a
//! constraint violation or an unreachable store from every other failure.

use crate::db::DbError;
use crate::model::{EntityKey, ValidationError};
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors surfaced by sessions, sets, queries and flush.
#[derive(Debug)]
pub enum PersistenceError {
    /// Foreign key, uniqueness, not-null or check constraint rejected a write.
    ConstraintViolation(rusqlite::Error),
    /// Store cannot be opened or reached.
    Connectivity(rusqlite::Error),
    /// Entity failed write-path validation before any SQL was issued.
    Validation(ValidationError),
    /// Update or delete matched no row for a tracked key.
    StaleEntity {
        table: &'static str,
        key: EntityKey,
    },
    /// A different instance with the same key is already tracked.
    IdentityConflict {
        table: &'static str,
        key: EntityKey,
    },
    /// Operation requires an entity the session is not tracking.
    NotTracked { table: &'static str },
    /// Filter references a column the entity does not map.
    UnknownColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Named procedure is not defined in the store.
    ProcedureNotFound(String),
    /// Persisted row cannot be decoded into an entity.
    InvalidData(String),
    /// Any other storage failure.
    Db(DbError),
}

impl PersistenceError {
    /// Whether the failure came from a storage constraint.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }

    /// Whether the failure means the store is unreachable.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

impl Display for PersistenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConstraintViolation(err) => write!(f, "constraint violation: {err}"),
            Self::Connectivity(err) => write!(f, "store unreachable: {err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::StaleEntity { table, key } => {
                write!(f, "{table}: no row with id {key} was affected")
            }
            Self::IdentityConflict { table, key } => write!(
                f,
                "{table}: another instance with id {key} is already tracked"
            ),
            Self::NotTracked { table } => {
                write!(f, "{table}: entity is not tracked by this session")
            }
            Self::UnknownColumn { table, column } => {
                write!(f, "{table}: unknown column `{column}`")
            }
            Self::ProcedureNotFound(name) => write!(f, "stored procedure not found: {name}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PersistenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ConstraintViolation(err) => Some(err),
            Self::Connectivity(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::StaleEntity { .. }
            | Self::IdentityConflict { .. }
            | Self::NotTracked { .. }
            | Self::UnknownColumn { .. }
            | Self::ProcedureNotFound(_)
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for PersistenceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        match sqlite_code(&value) {
            Some(ErrorCode::ConstraintViolation) => Self::ConstraintViolation(value),
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly,
            ) => Self::Connectivity(value),
            _ => Self::Db(DbError::Sqlite(value)),
        }
    }
}

impl From<DbError> for PersistenceError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => err.into(),
            other => Self::Db(other),
        }
    }
}

fn sqlite_code(err: &rusqlite::Error) -> Option<ErrorCode> {
    match err {
        rusqlite::Error::SqliteFailure(inner, _) => Some(inner.code),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::PersistenceError;
    use crate::db::DbError;
    use rusqlite::ffi;

    fn failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), None)
    }

    #[test]
    fn constraint_codes_are_classified() {
        let err = PersistenceError::from(failure(ffi::SQLITE_CONSTRAINT_FOREIGNKEY));
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn open_failures_are_connectivity() {
        let err = PersistenceError::from(DbError::Sqlite(failure(ffi::SQLITE_CANTOPEN)));
        assert!(err.is_connectivity());
    }

    #[test]
    fn other_sqlite_errors_stay_generic() {
        let err = PersistenceError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(err, PersistenceError::Db(DbError::Sqlite(_))));
    }
}
