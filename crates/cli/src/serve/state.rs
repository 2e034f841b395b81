//! Application state shared across request handlers.

use coldchain_core::Identity;
use coldchain_ledger::{IngredientClassifier, LabelRules, SupplyChain};
use coldchain_storage::MemoryStorage;

pub(crate) struct AppState {
    pub(crate) chain: SupplyChain<MemoryStorage>,
    /// Classifier used by `POST /cold-drinks/admit`: remote when configured.
    pub(crate) classifier: Box<dyn IngredientClassifier>,
    /// Rules answering `POST /process-ingredients` locally.
    pub(crate) label_rules: LabelRules,
    /// Required on every request except `/health` when set.
    pub(crate) api_key: Option<String>,
}

/// Caller identity taken from the `X-Caller-Identity` header.
#[derive(Debug, Clone)]
pub(crate) struct Caller(pub(crate) Identity);
