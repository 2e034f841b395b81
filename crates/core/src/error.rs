//! Error taxonomy shared by every host of the custody state machine.

use serde::{Deserialize, Serialize};

use crate::stage::Stage;

/// Stable, machine-readable classification of a [`ChainError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    InvalidStage,
    NotFound,
    InvalidArgument,
}

impl ErrorKind {
    /// The snake_case code used on the wire (`"invalid_stage"`, ...).
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvalidStage => "invalid_stage",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidArgument => "invalid_argument",
        }
    }
}

/// All errors the registry and the lifecycle tracker can raise.
///
/// Every variant is raised before any state is touched: a `ChainError`
/// always means the operation had no effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The caller lacks the ownership or role the operation requires.
    #[error("unauthorized: '{caller}' cannot {operation} (requires {required})")]
    Unauthorized {
        caller: String,
        operation: String,
        required: String,
    },

    /// The item is not at the stage the attempted transition starts from.
    #[error("wrong stage: cold drink {id} is at {actual}, {operation} requires {expected}")]
    InvalidStage {
        id: u64,
        operation: String,
        expected: Stage,
        actual: Stage,
    },

    /// The referenced item or identity has no record.
    #[error("{entity} '{key}' not found")]
    NotFound { entity: String, key: String },

    /// A role code outside the closed set, or an empty required field.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::Unauthorized { .. } => ErrorKind::Unauthorized,
            ChainError::InvalidStage { .. } => ErrorKind::InvalidStage,
            ChainError::NotFound { .. } => ErrorKind::NotFound,
            ChainError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
        }
    }

    pub fn item_not_found(id: u64) -> Self {
        ChainError::NotFound {
            entity: "cold drink".to_string(),
            key: id.to_string(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ChainError::InvalidArgument {
            message: message.into(),
        }
    }
}
