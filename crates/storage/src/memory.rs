//! In-memory `ChainStorage` backend.
//!
//! Committed tables sit behind one `std::sync::Mutex` that is only held for
//! the duration of a single call, never across an `.await`. Snapshots stage
//! their writes privately and validate item versions and guarded
//! participant reads at commit, so transactions on different items never
//! wait on each other.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use coldchain_core::{ColdDrink, ColdDrinkDraft, Identity, Registry, Role, Stage};

use crate::error::StorageError;
use crate::record::{timestamp_now, ItemRecord, ParticipantRecord, TransitionRecord};
use crate::traits::ChainStorage;

#[derive(Debug, Default)]
struct Tables {
    registry: Registry,
    /// identity → (registered_at, updated_at)
    participant_times: BTreeMap<Identity, (String, String)>,
    items: BTreeMap<u64, ItemRecord>,
    /// Last item id handed out.
    item_counter: u64,
    transitions: BTreeMap<u64, Vec<TransitionRecord>>,
}

impl Tables {
    fn participant(&self, identity: &Identity) -> Option<ParticipantRecord> {
        let role = self.registry.role_of(identity)?;
        let sequences = self.registry.sequences_of(identity);
        let sequence = sequences.get(&role).copied()?;
        let (registered_at, updated_at) = self
            .participant_times
            .get(identity)
            .cloned()
            .unwrap_or_default();
        Some(ParticipantRecord {
            identity: identity.clone(),
            role,
            sequence,
            sequences,
            registered_at,
            updated_at,
        })
    }

    /// The participant as `snapshot` sees it: committed state overlaid with
    /// the snapshot's grants, the last grant deciding the current role.
    fn staged_participant(
        &self,
        snapshot: &MemorySnapshot,
        identity: &Identity,
    ) -> Option<ParticipantRecord> {
        let (_, role, sequence) = snapshot
            .grants
            .iter()
            .rev()
            .find(|(id, _, _)| id == identity)?;
        Some(self.granted(snapshot, identity, *role, *sequence))
    }

    fn granted(
        &self,
        snapshot: &MemorySnapshot,
        identity: &Identity,
        role: Role,
        sequence: u64,
    ) -> ParticipantRecord {
        let mut sequences = self.registry.sequences_of(identity);
        let staged = snapshot.grants.iter().filter(|(id, _, _)| id == identity);
        for (_, staged_role, staged_seq) in staged {
            sequences.entry(*staged_role).or_insert(*staged_seq);
        }
        let now = timestamp_now();
        let registered_at = self
            .participant_times
            .get(identity)
            .map(|(registered, _)| registered.clone())
            .unwrap_or_else(|| now.clone());
        ParticipantRecord {
            identity: identity.clone(),
            role,
            sequence,
            sequences,
            registered_at,
            updated_at: now,
        }
    }
}

/// A staged grant: (identity, role, sequence number reserved for it).
type StagedGrant = (Identity, Role, u64);

/// Pending writes of one in-memory transaction.
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    grants: Vec<StagedGrant>,
    inserted: BTreeMap<u64, ItemRecord>,
    /// item_id → (committed version this update was based on, staged record)
    updated: BTreeMap<u64, (i64, ItemRecord)>,
    transitions: Vec<TransitionRecord>,
    /// identity → committed role seen by `get_participant_for_update`
    role_reads: BTreeMap<Identity, Option<Role>>,
}

impl MemorySnapshot {
    fn staged_sequence(&self, identity: &Identity, role: Role) -> Option<u64> {
        self.grants
            .iter()
            .find(|(id, r, _)| id == identity && *r == role)
            .map(|(_, _, seq)| *seq)
    }

    fn staged_item(&self, item_id: u64) -> Option<&ItemRecord> {
        self.updated
            .get(&item_id)
            .map(|(_, rec)| rec)
            .or_else(|| self.inserted.get(&item_id))
    }
}

/// Process-wide in-memory storage. Cheap to construct; share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.tables
            .lock()
            .map_err(|_| StorageError::Backend("memory tables lock poisoned".to_string()))
    }
}

#[async_trait]
impl ChainStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut tables = self.tables()?;

        // Validate every staged update before applying anything.
        for (item_id, (base_version, _)) in &snapshot.updated {
            let committed = tables
                .items
                .get(item_id)
                .ok_or(StorageError::ItemNotFound { item_id: *item_id })?;
            if committed.version != *base_version {
                return Err(StorageError::ConcurrentConflict {
                    item_id: *item_id,
                    expected_version: *base_version,
                });
            }
        }

        for (identity, seen) in &snapshot.role_reads {
            if tables.registry.role_of(identity) != *seen {
                return Err(StorageError::RoleConflict {
                    identity: identity.to_string(),
                });
            }
        }

        let now = timestamp_now();
        for (identity, role, sequence) in snapshot.grants {
            tables.registry.record(identity.clone(), role, sequence);
            tables
                .participant_times
                .entry(identity)
                .and_modify(|(_, updated)| *updated = now.clone())
                .or_insert_with(|| (now.clone(), now.clone()));
        }
        for (item_id, record) in snapshot.inserted {
            tables.items.insert(item_id, record);
        }
        for (item_id, (_, mut record)) in snapshot.updated {
            record.updated_at = now.clone();
            tables.items.insert(item_id, record);
        }
        for record in snapshot.transitions {
            tables
                .transitions
                .entry(record.item_id)
                .or_default()
                .push(record);
        }
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn put_participant(
        &self,
        snapshot: &mut MemorySnapshot,
        identity: &Identity,
        role: Role,
    ) -> Result<ParticipantRecord, StorageError> {
        let mut tables = self.tables()?;

        let existing = snapshot
            .staged_sequence(identity, role)
            .or_else(|| tables.registry.sequence_of(identity, role));
        let sequence = match existing {
            Some(existing) => existing,
            None => tables.registry.reserve_sequence(role),
        };
        snapshot.grants.push((identity.clone(), role, sequence));

        Ok(tables.granted(snapshot, identity, role, sequence))
    }

    async fn get_participant_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        identity: &Identity,
    ) -> Result<Option<ParticipantRecord>, StorageError> {
        let tables = self.tables()?;
        if let Some(staged) = tables.staged_participant(snapshot, identity) {
            return Ok(Some(staged));
        }
        let committed = tables.participant(identity);
        snapshot
            .role_reads
            .entry(identity.clone())
            .or_insert(committed.as_ref().map(|p| p.role));
        Ok(committed)
    }

    async fn get_participant(
        &self,
        identity: &Identity,
    ) -> Result<ParticipantRecord, StorageError> {
        self.tables()?
            .participant(identity)
            .ok_or_else(|| StorageError::ParticipantNotFound {
                identity: identity.to_string(),
            })
    }

    async fn list_participants(
        &self,
        role_filter: Option<Role>,
    ) -> Result<Vec<ParticipantRecord>, StorageError> {
        let tables = self.tables()?;
        Ok(tables
            .registry
            .participants()
            .filter(|(_, role)| role_filter.map_or(true, |f| f == *role))
            .filter_map(|(identity, _)| tables.participant(identity))
            .collect())
    }

    async fn insert_item(
        &self,
        snapshot: &mut MemorySnapshot,
        draft: ColdDrinkDraft,
    ) -> Result<ItemRecord, StorageError> {
        draft
            .validate()
            .map_err(|e| StorageError::InvalidRecord {
                message: e.to_string(),
            })?;
        let item_id = {
            let mut tables = self.tables()?;
            tables.item_counter += 1;
            tables.item_counter
        };
        let item = ColdDrink::new(item_id, draft).map_err(|e| StorageError::InvalidRecord {
            message: e.to_string(),
        })?;
        let now = timestamp_now();
        let record = ItemRecord {
            item,
            version: 0,
            created_at: now.clone(),
            updated_at: now,
        };
        snapshot.inserted.insert(item_id, record.clone());
        Ok(record)
    }

    async fn get_item_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        item_id: u64,
    ) -> Result<ItemRecord, StorageError> {
        if let Some(staged) = snapshot.staged_item(item_id) {
            return Ok(staged.clone());
        }
        self.tables()?
            .items
            .get(&item_id)
            .cloned()
            .ok_or(StorageError::ItemNotFound { item_id })
    }

    async fn update_item(
        &self,
        snapshot: &mut MemorySnapshot,
        expected_version: i64,
        item: &ColdDrink,
    ) -> Result<i64, StorageError> {
        let item_id = item.id;
        let conflict = StorageError::ConcurrentConflict {
            item_id,
            expected_version,
        };

        if let Some(record) = snapshot.inserted.get_mut(&item_id) {
            if record.version != expected_version {
                return Err(conflict);
            }
            record.item = item.clone();
            record.version += 1;
            return Ok(record.version);
        }

        if let Some((_, record)) = snapshot.updated.get_mut(&item_id) {
            if record.version != expected_version {
                return Err(conflict);
            }
            record.item = item.clone();
            record.version += 1;
            return Ok(record.version);
        }

        let committed = self
            .tables()?
            .items
            .get(&item_id)
            .cloned()
            .ok_or(StorageError::ItemNotFound { item_id })?;
        if committed.version != expected_version {
            return Err(conflict);
        }
        let mut record = committed;
        record.item = item.clone();
        record.version += 1;
        let new_version = record.version;
        snapshot.updated.insert(item_id, (expected_version, record));
        Ok(new_version)
    }

    async fn insert_transition(
        &self,
        snapshot: &mut MemorySnapshot,
        record: TransitionRecord,
    ) -> Result<(), StorageError> {
        if snapshot.staged_item(record.item_id).is_none()
            && !self.tables()?.items.contains_key(&record.item_id)
        {
            return Err(StorageError::ItemNotFound {
                item_id: record.item_id,
            });
        }
        snapshot.transitions.push(record);
        Ok(())
    }

    async fn latest_transition(
        &self,
        snapshot: &mut MemorySnapshot,
        item_id: u64,
    ) -> Result<Option<TransitionRecord>, StorageError> {
        if let Some(staged) = snapshot
            .transitions
            .iter()
            .rev()
            .find(|t| t.item_id == item_id)
        {
            return Ok(Some(staged.clone()));
        }
        Ok(self
            .tables()?
            .transitions
            .get(&item_id)
            .and_then(|history| history.last().cloned()))
    }

    async fn get_item(&self, item_id: u64) -> Result<ItemRecord, StorageError> {
        self.tables()?
            .items
            .get(&item_id)
            .cloned()
            .ok_or(StorageError::ItemNotFound { item_id })
    }

    async fn list_items(
        &self,
        stage_filter: Option<Stage>,
    ) -> Result<Vec<ItemRecord>, StorageError> {
        Ok(self
            .tables()?
            .items
            .values()
            .filter(|rec| stage_filter.map_or(true, |s| rec.item.stage == s))
            .cloned()
            .collect())
    }

    async fn item_counter(&self) -> Result<u64, StorageError> {
        Ok(self.tables()?.item_counter)
    }

    async fn list_transitions(&self, item_id: u64) -> Result<Vec<TransitionRecord>, StorageError> {
        Ok(self
            .tables()?
            .transitions
            .get(&item_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    #[tokio::test]
    async fn dropped_snapshot_leaves_no_trace() {
        let storage = MemoryStorage::new();
        {
            let mut snap = storage.begin_snapshot().await.unwrap();
            storage
                .insert_item(&mut snap, ColdDrinkDraft::new("Cola", "fizzy", true))
                .await
                .unwrap();
            storage
                .put_participant(&mut snap, &id("r"), Role::Retailer)
                .await
                .unwrap();
        }
        assert!(storage.list_items(None).await.unwrap().is_empty());
        assert!(storage.list_participants(None).await.unwrap().is_empty());
        // The reserved id is burned, never reused.
        assert_eq!(storage.item_counter().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn last_grant_in_snapshot_wins() {
        let storage = MemoryStorage::new();
        let mut snap = storage.begin_snapshot().await.unwrap();
        storage
            .put_participant(&mut snap, &id("x"), Role::Distributor)
            .await
            .unwrap();
        let rec = storage
            .put_participant(&mut snap, &id("x"), Role::Retailer)
            .await
            .unwrap();
        assert_eq!(rec.role, Role::Retailer);
        assert_eq!(rec.sequences.len(), 2);
        storage.commit_snapshot(snap).await.unwrap();

        let rec = storage.get_participant(&id("x")).await.unwrap();
        assert_eq!(rec.role, Role::Retailer);
        assert_eq!(rec.sequence, 1);
        assert_eq!(rec.sequences.get(&Role::Distributor), Some(&1));
    }

    #[tokio::test]
    async fn insert_rejects_invalid_draft_without_burning_id() {
        let storage = MemoryStorage::new();
        let mut snap = storage.begin_snapshot().await.unwrap();
        let err = storage
            .insert_item(&mut snap, ColdDrinkDraft::new("", "fizzy", true))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord { .. }));
        assert_eq!(storage.item_counter().await.unwrap(), 0);
    }
}
