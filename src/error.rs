use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::{models::UnknownRole, storage::StorageError},
    state::state_machine::{ApplyError, InvalidTransition, PlanError},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The store rejected or failed the request.
    #[error("storage failure")]
    Storage(#[source] StorageError),
    /// Caller is not allowed to perform the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the caller or found in the store.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Another device broke a protocol invariant.
    #[error("protocol anomaly: {0}")]
    Protocol(String),
}

impl ServiceError {
    /// Whether the failure only reports missing data in the store.
    pub fn is_no_data(&self) -> bool {
        matches!(self, ServiceError::Storage(err) if err.is_no_data())
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Storage(err)
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}

impl From<UnknownRole> for ServiceError {
    fn from(err: UnknownRole) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<PlanError> for ServiceError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::AlreadyPending => {
                ServiceError::InvalidState("state transition already pending".into())
            }
            PlanError::InvalidTransition(invalid) => invalid.into(),
        }
    }
}

impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::NoPending => ServiceError::InvalidState("no transition is pending".into()),
            ApplyError::IdMismatch { .. } => {
                ServiceError::InvalidState("pending transition does not match".into())
            }
        }
    }
}
