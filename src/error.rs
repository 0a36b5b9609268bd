use thiserror::Error;

/// Errors raised by the todo store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The input breaks a record invariant (blank task text, bad due date).
    #[error("{0}")]
    Validation(String),

    /// No record with the given identifier.
    #[error("Todo not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The connection could not be used at all.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(error: tokio::task::JoinError) -> Self {
        StoreError::Unavailable(format!("store worker failed: {}", error))
    }
}
