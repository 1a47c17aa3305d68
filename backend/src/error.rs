//! Error types for the workflow engine and its datastore ports.
//!
//! Per-action failures are never errors: they become failed
//! `ExecutionResult`s. The types here cover the layers around the actions
//! (storage, parsing persisted definitions, ledger bookkeeping).

use thiserror::Error;
use uuid::Uuid;

use crate::workflows::ExecutionStatus;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid status transition for execution {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: ExecutionStatus,
        to: ExecutionStatus,
    },
    #[error("Invalid stored value: {0}")]
    InvalidData(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Raised when a persisted action cannot be turned into a typed [`Action`].
///
/// [`Action`]: crate::workflows::Action
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("Unknown action type '{0}'")]
    UnknownActionType(String),
    #[error("Malformed config for {action_type} action '{action_id}': {message}")]
    MalformedConfig {
        action_type: String,
        action_id: String,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Workflow execution {0} not found")]
    ExecutionNotFound(Uuid),
    #[error("Workflow execution {id} is already {status}")]
    ExecutionFinished { id: Uuid, status: ExecutionStatus },
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Short machine-readable code, recorded alongside poller errors.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Store(StoreError::NotFound(_)) => "NOT_FOUND",
            Self::Store(StoreError::Database(_)) => "DATABASE_ERROR",
            Self::Store(StoreError::Serialization(_)) => "SERIALIZATION_ERROR",
            Self::Store(StoreError::InvalidTransition { .. }) => "INVALID_TRANSITION",
            Self::Store(StoreError::InvalidData(_)) => "INVALID_DATA",
            Self::ExecutionNotFound(_) => "EXECUTION_NOT_FOUND",
            Self::ExecutionFinished { .. } => "EXECUTION_FINISHED",
        }
    }
}
