use async_trait::async_trait;
use coldchain_core::{ColdDrink, ColdDrinkDraft, Identity, Role, Stage};

use crate::error::StorageError;
use crate::record::{ItemRecord, ParticipantRecord, TransitionRecord};

/// The storage trait for cold-chain backends.
///
/// A `ChainStorage` implementation durably holds the participant table,
/// the item table, their counters, and each item's transition history.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()` — start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` — commit and consume the transaction
///    OR `abort_snapshot(snapshot)` — roll back and consume the transaction
///
/// Writes staged in a snapshot are invisible to other readers until commit,
/// and commit applies all of them or none. A `Snapshot` dropped without
/// committing MUST be rolled back.
///
/// ## OCC Conflict Detection
///
/// `update_item` is conditional on the item's committed `version` still
/// being `expected_version`, checked when the update is staged and again at
/// commit. Either check failing yields `StorageError::ConcurrentConflict`;
/// at most one of several racing snapshots on the same item can commit.
///
/// Participant reads made with `get_participant_for_update` are guarded the
/// same way: if the identity's committed role differs at commit time from
/// the role that was read, commit fails with `StorageError::RoleConflict`.
///
/// ## Counters
///
/// Item ids start at 1 and per-role sequence numbers start at 1. Both are
/// reserved when first handed out and never reused, even if the snapshot
/// that reserved them is aborted.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait ChainStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Registry ─────────────────────────────────────────────────────────────

    /// Grant `role` to `identity`, overwriting any previous role.
    ///
    /// Allocates a sequence number under `role` the first time the identity
    /// is registered under it; otherwise the existing number is reused.
    async fn put_participant(
        &self,
        snapshot: &mut Self::Snapshot,
        identity: &Identity,
        role: Role,
    ) -> Result<ParticipantRecord, StorageError>;

    /// Read a participant inside `snapshot`, including its own staged grants.
    ///
    /// `None` when the identity holds no role. A read of committed state is
    /// re-validated at commit (see OCC Conflict Detection above).
    async fn get_participant_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        identity: &Identity,
    ) -> Result<Option<ParticipantRecord>, StorageError>;

    /// Committed participant record.
    ///
    /// Returns `Err(StorageError::ParticipantNotFound)` for identities with no role.
    async fn get_participant(
        &self,
        identity: &Identity,
    ) -> Result<ParticipantRecord, StorageError>;

    /// All committed participants, optionally only those currently holding `role`.
    async fn list_participants(
        &self,
        role_filter: Option<Role>,
    ) -> Result<Vec<ParticipantRecord>, StorageError>;

    // ── Items (within snapshot) ───────────────────────────────────────────────

    /// Allocate the next item id and stage a new item at `Created`, version 0.
    async fn insert_item(
        &self,
        snapshot: &mut Self::Snapshot,
        draft: ColdDrinkDraft,
    ) -> Result<ItemRecord, StorageError>;

    /// Read an item for update, including this snapshot's own staged writes.
    ///
    /// Returns `Err(StorageError::ItemNotFound)` if the item does not exist.
    async fn get_item_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        item_id: u64,
    ) -> Result<ItemRecord, StorageError>;

    /// Stage a version-validated replacement of an item (OCC).
    ///
    /// Returns the new version number on success.
    async fn update_item(
        &self,
        snapshot: &mut Self::Snapshot,
        expected_version: i64,
        item: &ColdDrink,
    ) -> Result<i64, StorageError>;

    // ── History (within snapshot) ─────────────────────────────────────────────

    /// Stage a transition record. Must be staged in the SAME snapshot as the
    /// `update_item` it describes: no stage change without history.
    async fn insert_transition(
        &self,
        snapshot: &mut Self::Snapshot,
        record: TransitionRecord,
    ) -> Result<(), StorageError>;

    /// Most recent transition of an item, including staged ones.
    async fn latest_transition(
        &self,
        snapshot: &mut Self::Snapshot,
        item_id: u64,
    ) -> Result<Option<TransitionRecord>, StorageError>;

    // ── Queries (committed state) ─────────────────────────────────────────────

    /// Returns `Err(StorageError::ItemNotFound)` if the item does not exist.
    async fn get_item(&self, item_id: u64) -> Result<ItemRecord, StorageError>;

    /// All committed items in id order, optionally filtered by stage.
    async fn list_items(
        &self,
        stage_filter: Option<Stage>,
    ) -> Result<Vec<ItemRecord>, StorageError>;

    /// Highest item id handed out so far (0 when none).
    async fn item_counter(&self) -> Result<u64, StorageError>;

    /// Committed history of an item, oldest first. Empty for unknown items.
    async fn list_transitions(&self, item_id: u64) -> Result<Vec<TransitionRecord>, StorageError>;
}
