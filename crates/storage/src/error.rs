/// All errors that can be returned by a ChainStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict: another snapshot committed
    /// a change to the item after this one read it.
    #[error("concurrent conflict on cold drink {item_id}: expected version {expected_version}")]
    ConcurrentConflict { item_id: u64, expected_version: i64 },

    /// The role of a participant read with `get_participant_for_update`
    /// changed before the reading snapshot committed.
    #[error("concurrent role change for participant {identity}")]
    RoleConflict { identity: String },

    /// No item was ever allocated under this id.
    #[error("cold drink not found: {item_id}")]
    ItemNotFound { item_id: u64 },

    /// The identity holds no role.
    #[error("participant not found: {identity}")]
    ParticipantNotFound { identity: String },

    /// The record handed to the backend violates a domain rule.
    #[error("invalid record: {message}")]
    InvalidRecord { message: String },

    /// A backend-specific storage error (lock poisoning, I/O, serialization, ...).
    #[error("storage backend error: {0}")]
    Backend(String),
}
