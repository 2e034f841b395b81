//! Participant registry table: identity → role, plus per-role sequence
//! numbers used to stamp an item's role-id fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::identity::Identity;
use crate::item::Actor;
use crate::role::Role;

/// Fail with `Unauthorized` unless `caller` is the registry owner.
pub fn require_owner(
    owner: &Identity,
    caller: &Identity,
    operation: &str,
) -> Result<(), ChainError> {
    if caller != owner {
        return Err(ChainError::Unauthorized {
            caller: caller.to_string(),
            operation: operation.to_string(),
            required: "registry owner".to_string(),
        });
    }
    Ok(())
}

/// In-memory registry state.
///
/// Sequence numbers are allocated from one counter per role, starting at 1.
/// An identity keeps the number it was first given under a role for good,
/// so re-granting a role after a change reuses it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    roles: BTreeMap<Identity, Role>,
    sequences: BTreeMap<Identity, BTreeMap<Role, u64>>,
    counters: BTreeMap<Role, u64>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role_of(&self, identity: &Identity) -> Option<Role> {
        self.roles.get(identity).copied()
    }

    pub fn sequence_of(&self, identity: &Identity, role: Role) -> Option<u64> {
        self.sequences.get(identity)?.get(&role).copied()
    }

    pub fn sequences_of(&self, identity: &Identity) -> BTreeMap<Role, u64> {
        self.sequences.get(identity).cloned().unwrap_or_default()
    }

    /// Number of sequence numbers handed out under `role` so far.
    pub fn counter(&self, role: Role) -> u64 {
        self.counters.get(&role).copied().unwrap_or(0)
    }

    /// Take the next sequence number under `role`.
    pub fn reserve_sequence(&mut self, role: Role) -> u64 {
        let counter = self.counters.entry(role).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Grant `role` to `identity`, allocating a sequence number if this is
    /// the first time the identity is registered under that role.
    /// Returns the identity's sequence number within `role`.
    pub fn assign(&mut self, identity: Identity, role: Role) -> u64 {
        if let Some(existing) = self.sequence_of(&identity, role) {
            self.roles.insert(identity, role);
            return existing;
        }
        let sequence = self.reserve_sequence(role);
        self.record(identity, role, sequence)
    }

    /// Grant `role` with a sequence number reserved earlier.
    ///
    /// If the identity already has a number under `role` that one is kept
    /// and the reserved number is left unused. Returns the effective number.
    pub fn record(&mut self, identity: Identity, role: Role, sequence: u64) -> u64 {
        let effective = *self
            .sequences
            .entry(identity.clone())
            .or_default()
            .entry(role)
            .or_insert(sequence);
        self.roles.insert(identity, role);
        effective
    }

    /// Resolve `identity` into an [`Actor`] for a transition check.
    pub fn actor(&self, identity: &Identity) -> Actor {
        let role = self.role_of(identity);
        Actor {
            identity: identity.clone(),
            role,
            sequence: role.and_then(|r| self.sequence_of(identity, r)),
        }
    }

    pub fn participants(&self) -> impl Iterator<Item = (&Identity, Role)> {
        self.roles.iter().map(|(id, role)| (id, *role))
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    #[test]
    fn owner_check() {
        let owner = id("owner");
        assert!(require_owner(&owner, &owner, "addParticipant").is_ok());
        let err = require_owner(&owner, &id("mallory"), "addParticipant").unwrap_err();
        assert!(matches!(err, ChainError::Unauthorized { .. }));
    }

    #[test]
    fn sequences_are_per_role() {
        let mut reg = Registry::new();
        assert_eq!(reg.assign(id("r1"), Role::Retailer), 1);
        assert_eq!(reg.assign(id("m1"), Role::Manufacturer), 1);
        assert_eq!(reg.assign(id("r2"), Role::Retailer), 2);
        assert_eq!(reg.counter(Role::Retailer), 2);
        assert_eq!(reg.counter(Role::Distributor), 0);
    }

    #[test]
    fn re_adding_same_role_keeps_sequence() {
        let mut reg = Registry::new();
        reg.assign(id("r1"), Role::Retailer);
        assert_eq!(reg.assign(id("r1"), Role::Retailer), 1);
        assert_eq!(reg.counter(Role::Retailer), 1);
    }

    #[test]
    fn overwrite_then_regrant_reuses_number() {
        let mut reg = Registry::new();
        reg.assign(id("x"), Role::Distributor);
        reg.assign(id("y"), Role::Distributor);
        assert_eq!(reg.assign(id("x"), Role::Retailer), 1);
        assert_eq!(reg.role_of(&id("x")), Some(Role::Retailer));
        assert_eq!(reg.assign(id("x"), Role::Distributor), 1);
        assert_eq!(reg.counter(Role::Distributor), 2);
    }

    #[test]
    fn actor_carries_sequence_of_current_role() {
        let mut reg = Registry::new();
        reg.assign(id("a"), Role::Manufacturer);
        reg.assign(id("b"), Role::Manufacturer);
        let actor = reg.actor(&id("b"));
        assert_eq!(actor.role, Some(Role::Manufacturer));
        assert_eq!(actor.sequence, Some(2));

        let stranger = reg.actor(&id("c"));
        assert_eq!(stranger.role, None);
        assert_eq!(stranger.sequence, None);
    }

    #[test]
    fn record_keeps_earlier_number() {
        let mut reg = Registry::new();
        reg.assign(id("a"), Role::Retailer);
        let reserved = reg.reserve_sequence(Role::Retailer);
        assert_eq!(reserved, 2);
        assert_eq!(reg.record(id("a"), Role::Retailer, reserved), 1);
    }
}
