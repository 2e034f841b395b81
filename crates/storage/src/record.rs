use std::collections::BTreeMap;

use coldchain_core::{ColdDrink, Identity, Role, Stage, Transition};
use serde::{Deserialize, Serialize};

/// Current RFC 3339 timestamp for record bookkeeping.
pub fn timestamp_now() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

/// A registered participant as stored in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub identity: Identity,
    /// The role currently held (last write wins).
    pub role: Role,
    /// Sequence number within `role`; the value stamped on items.
    pub sequence: u64,
    /// Every sequence number this identity was ever given, per role.
    pub sequences: BTreeMap<Role, u64>,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub registered_at: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub updated_at: String,
}

/// A cold drink plus its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item: ColdDrink,
    /// 0 at creation, +1 per committed update.
    pub version: i64,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub updated_at: String,
}

/// One applied stage transition, as kept in an item's history.
///
/// `digest` chains each record to the previous one for the same item;
/// the service layer computes it, the backend only stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub item_id: u64,
    pub transition: Transition,
    pub actor: Identity,
    pub actor_sequence: u64,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub from_version: i64,
    pub to_version: i64,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub recorded_at: String,
    pub prev_digest: String,
    pub digest: String,
}
