//! Error types for the mapper
//!
//! Every pipeline stage reports failure through `ModelResult`. Storage errors
//! are carried verbatim; only deadlock-style conflicts are ever retried, and
//! that decision lives in the execution layer.

use thiserror::Error;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for mapper operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// A single-result lookup matched no rows
    #[error("Record not found in table '{table}': {key}")]
    NotFound { table: String, key: String },

    /// Deadlock or lock-wait reported by the storage backend
    #[error("Transient conflict: {0}")]
    TransientConflict(String),

    /// Any other storage-layer failure
    #[error("Database error: {0}")]
    Database(String),

    /// Connection pool error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Setup-time misconfiguration (duplicate alias, missing relation parameters)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Relationship resolution failed
    #[error("Relationship error: {0}")]
    Relationship(String),

    /// Malformed query descriptor
    #[error("Query error: {0}")]
    Query(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A result row could not be turned into a model instance
    #[error("Hydration error: {0}")]
    Hydration(String),

    /// Primary key is missing or invalid
    #[error("Primary key is missing or invalid")]
    MissingPrimaryKey,
}

impl ModelError {
    /// Build a not-found error for `table` and the looked-up key
    pub fn not_found(table: &str, key: impl std::fmt::Display) -> Self {
        ModelError::NotFound {
            table: table.to_string(),
            key: key.to_string(),
        }
    }

    /// HTTP-style status code associated with this error
    pub fn status(&self) -> u16 {
        match self {
            ModelError::NotFound { .. } => 404,
            ModelError::Query(_) | ModelError::MissingPrimaryKey => 400,
            ModelError::TransientConflict(_) => 409,
            _ => 500,
        }
    }

    /// Whether this error carries not-found semantics
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::NotFound { .. })
    }
}

// MySQL: ER_LOCK_DEADLOCK, ER_LOCK_WAIT_TIMEOUT
const DEADLOCK_CODES: &[&str] = &["1213", "1205", "40001"];

// Convert from sqlx errors, keeping deadlocks distinguishable
impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            if DEADLOCK_CODES.contains(&code.as_str()) {
                return ModelError::TransientConflict(db_err.message().to_string());
            }
        }
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                ModelError::Connection(err.to_string())
            }
            other => ModelError::Database(other.to_string()),
        }
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

/// Check if an error represents a deadlock/lock-wait that may succeed on retry
///
/// Driver errors are classified by code in `From<sqlx::Error>`. Text-only
/// errors count when they mention a deadlock or start with a lock error code.
pub fn is_transient_conflict(error: &ModelError) -> bool {
    match error {
        ModelError::TransientConflict(_) => true,
        ModelError::Database(msg) => {
            msg.to_uppercase().contains("DEADLOCK") || starts_with_lock_code(msg)
        }
        _ => false,
    }
}

/// `1205 ...`, `error 1213: ...`, `ERROR 1205 (HY000): ...`
fn starts_with_lock_code(msg: &str) -> bool {
    let msg = msg.trim_start();
    let rest = match msg.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("error ") => &msg[6..],
        _ => msg,
    };
    ["1213", "1205"].iter().any(|code| {
        rest.strip_prefix(code)
            .is_some_and(|tail| !tail.starts_with(|c: char| c.is_ascii_digit()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_carries_status() {
        let err = ModelError::not_found("users", 42);
        assert!(err.is_not_found());
        assert_eq!(err.status(), 404);
        assert_eq!(err.to_string(), "Record not found in table 'users': 42");
    }

    #[test]
    fn test_transient_conflict_detection() {
        let err1 =
            ModelError::TransientConflict("Deadlock found when trying to get lock".to_string());
        assert!(is_transient_conflict(&err1));

        let err2 = ModelError::Database("ER_LOCK_DEADLOCK: Deadlock found".to_string());
        assert!(is_transient_conflict(&err2));

        let err3 = ModelError::Database("error 1205: Lock wait timeout exceeded".to_string());
        assert!(is_transient_conflict(&err3));

        let err4 = ModelError::Database("Duplicate entry 'alex' for key 'name'".to_string());
        assert!(!is_transient_conflict(&err4));

        let err5 = ModelError::not_found("users", 1);
        assert!(!is_transient_conflict(&err5));

        let err6 =
            ModelError::Database("ERROR 1213 (40001): try restarting transaction".to_string());
        assert!(is_transient_conflict(&err6));
    }

    #[test]
    fn test_lock_codes_inside_messages_are_not_conflicts() {
        let duplicate =
            ModelError::Database("Duplicate entry '1205' for key 'PRIMARY'".to_string());
        assert!(!is_transient_conflict(&duplicate));

        let value = ModelError::Database("Data too long: '40001' for column 'zip'".to_string());
        assert!(!is_transient_conflict(&value));

        let longer_code = ModelError::Database("error 12130: unrelated".to_string());
        assert!(!is_transient_conflict(&longer_code));
    }
}
