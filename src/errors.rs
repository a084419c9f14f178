//! Typed error hierarchy for the store layer.
//!
//! Every store operation returns `StoreResult`; the API layer maps the
//! variants onto the HTTP taxonomy (NotFound → 404, Validation → 400,
//! everything else → 500 with the detail kept out of the response body).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("{0}")]
    Internal(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_entity_and_id() {
        let err = StoreError::not_found("material", 42);
        match &err {
            StoreError::NotFound { entity, id } => {
                assert_eq!(*entity, "material");
                assert_eq!(*id, 42);
            }
            _ => panic!("Expected NotFound variant"),
        }
        assert_eq!(err.to_string(), "material 42 not found");
    }

    #[test]
    fn validation_message_is_the_display() {
        let err = StoreError::validation("insufficient stock");
        assert_eq!(err.to_string(), "insufficient stock");
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn database_errors_convert() {
        let err: StoreError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
