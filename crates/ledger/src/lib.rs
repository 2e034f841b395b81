//! coldchain-ledger: the supply chain service.
//!
//! Wraps a [`ChainStorage`](coldchain_storage::ChainStorage) backend with the
//! registry and lifecycle operations, runs every operation in one storage
//! snapshot, and seals each applied transition into a hash-chained history.
//! Ingredient classification lives here too, since its verdict feeds
//! `add_cold_drink`.

pub mod action_space;
pub mod classifier;
pub mod error;
pub mod history;
pub mod service;

pub use action_space::{Action, ActionSpace, BlockedAction, BlockedReason};
pub use classifier::{
    Alert, Amount, Classification, ClassifierError, IngredientClassifier, IngredientStatus,
    LabelRules,
};
#[cfg(feature = "remote")]
pub use classifier::HttpClassifier;
pub use error::SupplyChainError;
pub use history::{BrokenLink, HistoryVerification, GENESIS_DIGEST};
pub use service::{Admission, SupplyChain};
