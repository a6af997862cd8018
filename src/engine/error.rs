use thiserror::Error;

use crate::store::StoreError;

/// Operation failures, classified by what the caller did wrong.
/// Messages are client-facing; handlers surface them verbatim.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Input fails structural or referential checks.
    #[error("{0}")]
    Validation(String),

    /// The addressed resource does not exist (or is not visible to the
    /// caller).
    #[error("{0}")]
    NotFound(String),

    /// The caller's role or identity does not permit the operation.
    #[error("{0}")]
    Authorization(String),

    /// The resource exists but its lifecycle state forbids the
    /// transition.
    #[error("{0}")]
    InvalidState(String),

    /// A uniqueness rule or concurrent write got in the way.
    #[error("{0}")]
    Conflict(String),

    /// Underlying storage failure, not attributable to the caller.
    #[error("Store error: {0}")]
    Store(StoreError),
}

/// Version mismatches and unique violations are concurrency outcomes,
/// not infrastructure failures; they map to `Conflict`.
impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::VersionMismatch { collection, id, .. } => EngineError::Conflict(format!(
                "Concurrent update on {collection}/{id}, retry the operation"
            )),
            StoreError::UniqueViolation { detail, .. } => EngineError::Conflict(detail),
            other => EngineError::Store(other),
        }
    }
}
