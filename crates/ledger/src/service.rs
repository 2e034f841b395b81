//! The supply chain service.
//!
//! [`SupplyChain`] owns the registry owner identity and the chain policy and
//! drives a [`ChainStorage`] backend. Each mutating operation runs inside
//! one storage snapshot: all checks happen against the snapshot's view, the
//! writes are staged, and the snapshot commits only if every step passed.
//! Any error aborts the snapshot, so a failed operation leaves no trace.
//!
//! The caller's role is read inside the same snapshot and guarded until
//! commit. If a concurrent grant changes that role first, the commit fails
//! with `RoleConflict` and the whole operation is retried against the new
//! role, up to [`MAX_ATTEMPTS`] times.

use std::sync::Arc;

use coldchain_core::{
    require_owner, role_name, Actor, ChainError, ChainPolicy, ColdDrink, ColdDrinkDraft,
    Identity, Role, Stage, Transition,
};
use coldchain_storage::{
    timestamp_now, ChainStorage, ParticipantRecord, StorageError, TransitionRecord,
};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::action_space::{self, ActionSpace};
use crate::classifier::{Classification, IngredientClassifier};
use crate::error::SupplyChainError;
use crate::history::{self, HistoryVerification, GENESIS_DIGEST};

/// Attempts per operation when a guarded participant read goes stale.
pub const MAX_ATTEMPTS: u32 = 3;

/// Result of [`SupplyChain::admit_cold_drink`].
#[derive(Debug, Clone, Serialize)]
pub struct Admission {
    pub id: u64,
    pub classification: Classification,
}

pub struct SupplyChain<S: ChainStorage> {
    storage: Arc<S>,
    owner: Identity,
    policy: ChainPolicy,
}

impl<S: ChainStorage> Clone for SupplyChain<S> {
    fn clone(&self) -> Self {
        SupplyChain {
            storage: self.storage.clone(),
            owner: self.owner.clone(),
            policy: self.policy,
        }
    }
}

fn actor_of(record: ParticipantRecord) -> Actor {
    Actor {
        identity: record.identity,
        role: Some(record.role),
        sequence: Some(record.sequence),
    }
}

fn item_not_found(err: StorageError, item_id: u64) -> SupplyChainError {
    match err {
        StorageError::ItemNotFound { .. } => ChainError::item_not_found(item_id).into(),
        other => other.into(),
    }
}

impl<S: ChainStorage> SupplyChain<S> {
    pub fn new(storage: Arc<S>, owner: Identity, policy: ChainPolicy) -> Self {
        SupplyChain {
            storage,
            owner,
            policy,
        }
    }

    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    pub fn policy(&self) -> ChainPolicy {
        self.policy
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    // ── Snapshot plumbing ────────────────────────────────────────────────────

    /// Commit on success, abort on failure.
    async fn finish<T>(
        &self,
        snapshot: S::Snapshot,
        staged: Result<T, SupplyChainError>,
    ) -> Result<T, SupplyChainError> {
        match staged {
            Ok(value) => {
                self.storage.commit_snapshot(snapshot).await?;
                Ok(value)
            }
            Err(e) => {
                self.abort(snapshot).await;
                Err(e)
            }
        }
    }

    async fn abort(&self, snapshot: S::Snapshot) {
        if let Err(e) = self.storage.abort_snapshot(snapshot).await {
            warn!(error = %e, "snapshot abort failed");
        }
    }

    // ── Registry ─────────────────────────────────────────────────────────────

    /// `addParticipant`: owner-only grant of `role` to `identity`.
    pub async fn add_participant(
        &self,
        caller: &Identity,
        identity: &Identity,
        role: Role,
    ) -> Result<ParticipantRecord, SupplyChainError> {
        let result = self.add_participant_inner(caller, identity, role).await;
        match &result {
            Ok(record) => info!(
                caller = %caller,
                identity = %identity,
                role = %role,
                sequence = record.sequence,
                "participant registered"
            ),
            Err(e) => warn!(
                caller = %caller,
                identity = %identity,
                kind = e.code(),
                "participant registration rejected: {e}"
            ),
        }
        result
    }

    async fn add_participant_inner(
        &self,
        caller: &Identity,
        identity: &Identity,
        role: Role,
    ) -> Result<ParticipantRecord, SupplyChainError> {
        require_owner(&self.owner, caller, "addParticipant")?;

        let mut attempt = 1;
        loop {
            let mut snapshot = self.storage.begin_snapshot().await?;
            let record = match self.stage_grant(&mut snapshot, identity, role).await {
                Ok(record) => record,
                Err(e) => {
                    self.abort(snapshot).await;
                    return Err(e);
                }
            };
            match self.storage.commit_snapshot(snapshot).await {
                Ok(()) => return Ok(record),
                Err(StorageError::RoleConflict { .. }) if attempt < MAX_ATTEMPTS => {
                    debug!(
                        identity = %identity,
                        attempt,
                        "role changed concurrently, retrying grant"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Check the re-registration policy against the snapshot's view of
    /// `identity`, then stage the grant.
    async fn stage_grant(
        &self,
        snapshot: &mut S::Snapshot,
        identity: &Identity,
        role: Role,
    ) -> Result<ParticipantRecord, SupplyChainError> {
        let existing = self
            .storage
            .get_participant_for_update(snapshot, identity)
            .await?
            .map(|record| record.role);
        self.policy.re_registration.check(identity, existing, role)?;
        Ok(self.storage.put_participant(snapshot, identity, role).await?)
    }

    /// `checkRole`: the role `identity` currently holds, if any.
    pub async fn check_role(
        &self,
        identity: &Identity,
    ) -> Result<Option<Role>, SupplyChainError> {
        match self.storage.get_participant(identity).await {
            Ok(record) => Ok(Some(record.role)),
            Err(StorageError::ParticipantNotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// `checkRole` as clients see it: a display name or `"none"`.
    pub async fn check_role_name(
        &self,
        identity: &Identity,
    ) -> Result<&'static str, SupplyChainError> {
        Ok(role_name(self.check_role(identity).await?))
    }

    pub async fn list_participants(
        &self,
        role_filter: Option<Role>,
    ) -> Result<Vec<ParticipantRecord>, SupplyChainError> {
        debug!(role = ?role_filter, "listing participants");
        Ok(self.storage.list_participants(role_filter).await?)
    }

    async fn actor(&self, identity: &Identity) -> Result<Actor, SupplyChainError> {
        match self.storage.get_participant(identity).await {
            Ok(record) => Ok(actor_of(record)),
            Err(StorageError::ParticipantNotFound { .. }) => {
                Ok(Actor::unregistered(identity.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Items ────────────────────────────────────────────────────────────────

    /// `addColdDrink`: owner-only creation of a new item at `Created`.
    ///
    /// `draft.ingredients_permitted` must already hold the classifier's
    /// verdict; see [`admit_cold_drink`](Self::admit_cold_drink).
    pub async fn add_cold_drink(
        &self,
        caller: &Identity,
        draft: ColdDrinkDraft,
    ) -> Result<u64, SupplyChainError> {
        let result = self.add_cold_drink_inner(caller, draft).await;
        match &result {
            Ok(id) => info!(caller = %caller, item_id = *id, "cold drink added"),
            Err(e) => warn!(caller = %caller, kind = e.code(), "cold drink rejected: {e}"),
        }
        result
    }

    async fn add_cold_drink_inner(
        &self,
        caller: &Identity,
        draft: ColdDrinkDraft,
    ) -> Result<u64, SupplyChainError> {
        require_owner(&self.owner, caller, "addColdDrink")?;
        draft.validate()?;

        let mut snapshot = self.storage.begin_snapshot().await?;
        let staged = self
            .storage
            .insert_item(&mut snapshot, draft)
            .await
            .map(|record| record.item.id)
            .map_err(SupplyChainError::from);
        self.finish(snapshot, staged).await
    }

    /// Classify `label_text`, then add the cold drink with the verdict.
    ///
    /// Classification happens before the item snapshot opens; a classifier
    /// failure adds nothing.
    pub async fn admit_cold_drink(
        &self,
        caller: &Identity,
        name: &str,
        description: &str,
        label_text: &str,
        classifier: &dyn IngredientClassifier,
    ) -> Result<Admission, SupplyChainError> {
        require_owner(&self.owner, caller, "addColdDrink")?;
        let classification = classifier.classify(label_text).await.inspect_err(|e| {
            warn!(classifier = classifier.classifier_id(), "classification failed: {e}")
        })?;
        debug!(
            classifier = classifier.classifier_id(),
            status = %classification.status,
            alerts = classification.alerts.len(),
            "label classified"
        );
        let draft = ColdDrinkDraft::new(name, description, classification.is_permitted());
        let id = self.add_cold_drink(caller, draft).await?;
        Ok(Admission { id, classification })
    }

    pub async fn get_item(&self, item_id: u64) -> Result<ColdDrink, SupplyChainError> {
        debug!(item_id, "reading cold drink");
        self.storage
            .get_item(item_id)
            .await
            .map(|record| record.item)
            .map_err(|e| item_not_found(e, item_id))
    }

    pub async fn list_items(
        &self,
        stage_filter: Option<Stage>,
    ) -> Result<Vec<ColdDrink>, SupplyChainError> {
        debug!(stage = ?stage_filter, "listing cold drinks");
        Ok(self
            .storage
            .list_items(stage_filter)
            .await?
            .into_iter()
            .map(|record| record.item)
            .collect())
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    pub async fn supply_raw_materials(
        &self,
        caller: &Identity,
        item_id: u64,
    ) -> Result<ColdDrink, SupplyChainError> {
        self.advance(caller, item_id, Transition::SupplyRawMaterials).await
    }

    pub async fn manufacture_cold_drink(
        &self,
        caller: &Identity,
        item_id: u64,
    ) -> Result<ColdDrink, SupplyChainError> {
        self.advance(caller, item_id, Transition::Manufacture).await
    }

    pub async fn distribute_cold_drink(
        &self,
        caller: &Identity,
        item_id: u64,
    ) -> Result<ColdDrink, SupplyChainError> {
        self.advance(caller, item_id, Transition::Distribute).await
    }

    pub async fn retail_cold_drink(
        &self,
        caller: &Identity,
        item_id: u64,
    ) -> Result<ColdDrink, SupplyChainError> {
        self.advance(caller, item_id, Transition::Retail).await
    }

    pub async fn sell_cold_drink(
        &self,
        caller: &Identity,
        item_id: u64,
    ) -> Result<ColdDrink, SupplyChainError> {
        self.advance(caller, item_id, Transition::Sell).await
    }

    /// Apply one transition on behalf of `caller` and record it in history.
    ///
    /// Losing a race against a concurrent transition on the same item is
    /// reported as `InvalidStage` with the stage the winner committed.
    pub async fn advance(
        &self,
        caller: &Identity,
        item_id: u64,
        transition: Transition,
    ) -> Result<ColdDrink, SupplyChainError> {
        let span = info_span!(
            "advance",
            item_id,
            caller = %caller,
            transition = transition.wire_name()
        );
        async move {
            let result = self.advance_inner(caller, item_id, transition).await;
            match &result {
                Ok(item) => info!(stage = %item.stage, "transition committed"),
                Err(e) => warn!(kind = e.code(), "transition rejected: {e}"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn advance_inner(
        &self,
        caller: &Identity,
        item_id: u64,
        transition: Transition,
    ) -> Result<ColdDrink, SupplyChainError> {
        let mut attempt = 1;
        loop {
            let mut snapshot = self.storage.begin_snapshot().await?;
            let item = match self
                .stage_transition(&mut snapshot, caller, item_id, transition)
                .await
            {
                Ok(item) => item,
                Err(e) => {
                    self.abort(snapshot).await;
                    return Err(e);
                }
            };

            match self.storage.commit_snapshot(snapshot).await {
                Ok(()) => return Ok(item),
                Err(StorageError::ConcurrentConflict { .. }) => {
                    return Err(self.lost_race(item_id, transition).await)
                }
                Err(StorageError::RoleConflict { .. }) if attempt < MAX_ATTEMPTS => {
                    debug!(attempt, "caller role changed concurrently, retrying transition");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn stage_transition(
        &self,
        snapshot: &mut S::Snapshot,
        caller: &Identity,
        item_id: u64,
        transition: Transition,
    ) -> Result<ColdDrink, SupplyChainError> {
        let actor = match self.storage.get_participant_for_update(snapshot, caller).await? {
            Some(record) => actor_of(record),
            None => Actor::unregistered(caller.clone()),
        };
        let current = self
            .storage
            .get_item_for_update(snapshot, item_id)
            .await
            .map_err(|e| item_not_found(e, item_id))?;
        let from_version = current.version;
        let mut item = current.item;
        let change = item.apply(transition, &actor, self.policy.sell)?;

        let to_version = match self.storage.update_item(snapshot, from_version, &item).await {
            Ok(version) => version,
            Err(StorageError::ConcurrentConflict { .. }) => {
                return Err(self.lost_race(item_id, transition).await)
            }
            Err(e) => return Err(e.into()),
        };

        let prev_digest = self
            .storage
            .latest_transition(snapshot, item_id)
            .await?
            .map(|t| t.digest)
            .unwrap_or_else(|| GENESIS_DIGEST.to_string());
        let record = history::seal(
            TransitionRecord {
                item_id,
                transition,
                actor: actor.identity.clone(),
                actor_sequence: change.actor_sequence,
                from_stage: change.from,
                to_stage: change.to,
                from_version,
                to_version,
                recorded_at: timestamp_now(),
                prev_digest: String::new(),
                digest: String::new(),
            },
            &prev_digest,
        );
        self.storage.insert_transition(snapshot, record).await?;
        Ok(item)
    }

    async fn lost_race(&self, item_id: u64, transition: Transition) -> SupplyChainError {
        match self.storage.get_item(item_id).await {
            Ok(committed) => ChainError::InvalidStage {
                id: item_id,
                operation: transition.wire_name().to_string(),
                expected: transition.from(),
                actual: committed.item.stage,
            }
            .into(),
            Err(e) => item_not_found(e, item_id),
        }
    }

    // ── History ──────────────────────────────────────────────────────────────

    /// Committed transitions of an item, oldest first.
    pub async fn history(&self, item_id: u64) -> Result<Vec<TransitionRecord>, SupplyChainError> {
        self.get_item(item_id).await?;
        Ok(self.storage.list_transitions(item_id).await?)
    }

    /// Recompute the digest chain of an item's history.
    pub async fn verify_history(
        &self,
        item_id: u64,
    ) -> Result<HistoryVerification, SupplyChainError> {
        let records = self.history(item_id).await?;
        let verification = history::verify_chain(item_id, &records);
        if let Some(broken) = &verification.broken {
            warn!(item_id, index = broken.index, field = broken.field, "history chain broken");
        }
        Ok(verification)
    }

    // ── Action space ─────────────────────────────────────────────────────────

    /// What `identity` can do right now, and what it is blocked from.
    pub async fn action_space(
        &self,
        identity: &Identity,
    ) -> Result<ActionSpace, SupplyChainError> {
        let actor = self.actor(identity).await?;
        let items = self.list_items(None).await?;
        Ok(action_space::compute_action_space(
            &actor,
            &items,
            actor.identity == self.owner,
            self.policy.sell,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldchain_storage::MemoryStorage;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    fn chain() -> SupplyChain<MemoryStorage> {
        SupplyChain::new(Arc::new(MemoryStorage::new()), id("owner"), ChainPolicy::default())
    }

    #[tokio::test]
    async fn rejected_transition_records_no_history() {
        let chain = chain();
        let owner = id("owner");
        let item = chain
            .add_cold_drink(&owner, ColdDrinkDraft::new("Cola", "fizzy", true))
            .await
            .unwrap();
        let err = chain.supply_raw_materials(&id("stranger"), item).await.unwrap_err();
        assert_eq!(err.code(), "unauthorized");
        assert!(chain.history(item).await.unwrap().is_empty());
        assert_eq!(chain.get_item(item).await.unwrap().stage, Stage::Created);
    }

    #[tokio::test]
    async fn history_links_each_transition_to_the_last() {
        let chain = chain();
        let owner = id("owner");
        chain
            .add_participant(&owner, &id("rms"), Role::RawMaterialSupplier)
            .await
            .unwrap();
        chain
            .add_participant(&owner, &id("man"), Role::Manufacturer)
            .await
            .unwrap();
        let item = chain
            .add_cold_drink(&owner, ColdDrinkDraft::new("Cola", "fizzy", true))
            .await
            .unwrap();
        chain.supply_raw_materials(&id("rms"), item).await.unwrap();
        chain.manufacture_cold_drink(&id("man"), item).await.unwrap();

        let history = chain.history(item).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].prev_digest, GENESIS_DIGEST);
        assert_eq!(history[1].prev_digest, history[0].digest);
        assert_eq!(history[1].from_version, 1);
        assert!(chain.verify_history(item).await.unwrap().is_intact());
    }

    #[tokio::test]
    async fn unknown_item_is_not_found() {
        let chain = chain();
        let err = chain.get_item(3).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
        let err = chain.supply_raw_materials(&id("owner"), 3).await.unwrap_err();
        assert_eq!(err.code(), "not_found");
        assert_eq!(chain.history(3).await.unwrap_err().code(), "not_found");
    }
}
