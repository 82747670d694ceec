//! Error type for store operations

use diesel::result::{DatabaseErrorKind, Error as DieselError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A required field was missing or an update carried nothing to change.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Structure {id} not found")]
    NotFound { id: i64 },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(DieselError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<DieselError> for StoreError {
    fn from(e: DieselError) -> Self {
        match e {
            // NOT NULL is enforced by the table as well as by callers
            DieselError::DatabaseError(DatabaseErrorKind::NotNullViolation, info) => {
                StoreError::Validation(info.message().to_string())
            }
            other => StoreError::Query(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = StoreError::NotFound { id: 7 };
        assert_eq!(err.to_string(), "Structure 7 not found");
        assert!(err.is_not_found());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_validation_message() {
        let err = StoreError::validation("structure is required");
        assert_eq!(err.to_string(), "Validation error: structure is required");
        assert!(err.is_validation());
    }

    #[test]
    fn test_diesel_not_found_is_query_error() {
        // Row-level misses are mapped explicitly by the store, not here
        let err: StoreError = DieselError::NotFound.into();
        assert!(matches!(err, StoreError::Query(DieselError::NotFound)));
    }
}
