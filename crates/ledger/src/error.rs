use coldchain_core::{ChainError, ErrorKind};
use coldchain_storage::StorageError;

use crate::classifier::ClassifierError;

/// Everything a [`SupplyChain`](crate::SupplyChain) operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum SupplyChainError {
    /// A domain rule refused the operation.
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

impl SupplyChainError {
    /// The domain classification, or `None` for internal failures
    /// (backend faults, unreachable classifier).
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SupplyChainError::Chain(e) => Some(e.kind()),
            SupplyChainError::Storage(StorageError::ItemNotFound { .. })
            | SupplyChainError::Storage(StorageError::ParticipantNotFound { .. }) => {
                Some(ErrorKind::NotFound)
            }
            SupplyChainError::Storage(StorageError::InvalidRecord { .. }) => {
                Some(ErrorKind::InvalidArgument)
            }
            SupplyChainError::Storage(_) => None,
            SupplyChainError::Classifier(ClassifierError::NoText) => {
                Some(ErrorKind::InvalidArgument)
            }
            SupplyChainError::Classifier(_) => None,
        }
    }

    /// Wire code: the kind's snake_case code, or `"internal"`.
    pub fn code(&self) -> &'static str {
        self.kind().map_or("internal", |k| k.code())
    }
}
