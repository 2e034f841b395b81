//! The tracked cold drink and the single pure step of its state machine.

use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::identity::Identity;
use crate::policy::SellPolicy;
use crate::role::Role;
use crate::stage::Stage;
use crate::transition::Transition;

/// Creation parameters for `addColdDrink`.
///
/// `ingredients_permitted` is the already-resolved classifier verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColdDrinkDraft {
    pub name: String,
    pub description: String,
    pub ingredients_permitted: bool,
}

impl ColdDrinkDraft {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        ingredients_permitted: bool,
    ) -> Self {
        ColdDrinkDraft {
            name: name.into(),
            description: description.into(),
            ingredients_permitted,
        }
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.name.trim().is_empty() {
            return Err(ChainError::invalid_argument("name must not be empty"));
        }
        if self.description.trim().is_empty() {
            return Err(ChainError::invalid_argument("description must not be empty"));
        }
        Ok(())
    }
}

/// A tracked cold drink.
///
/// The four role-id fields hold the acting participant's sequence number
/// within its role, never the raw identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColdDrink {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub ingredients_permitted: bool,
    pub stage: Stage,
    pub supplier_id: Option<u64>,
    pub manufacturer_id: Option<u64>,
    pub distributor_id: Option<u64>,
    pub retailer_id: Option<u64>,
}

/// The participant attempting a transition, as resolved from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub identity: Identity,
    pub role: Option<Role>,
    /// Sequence number within `role`.
    pub sequence: Option<u64>,
}

impl Actor {
    pub fn unregistered(identity: Identity) -> Self {
        Actor {
            identity,
            role: None,
            sequence: None,
        }
    }
}

/// What a successful [`ColdDrink::apply`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageChange {
    pub transition: Transition,
    pub from: Stage,
    pub to: Stage,
    pub actor_sequence: u64,
}

impl ColdDrink {
    /// A new item at `Created` with no role ids stamped.
    pub fn new(id: u64, draft: ColdDrinkDraft) -> Result<Self, ChainError> {
        if id == 0 {
            return Err(ChainError::invalid_argument("cold drink ids start at 1"));
        }
        draft.validate()?;
        Ok(ColdDrink {
            id,
            name: draft.name,
            description: draft.description,
            ingredients_permitted: draft.ingredients_permitted,
            stage: Stage::Created,
            supplier_id: None,
            manufacturer_id: None,
            distributor_id: None,
            retailer_id: None,
        })
    }

    pub fn role_id(&self, role: Role) -> Option<u64> {
        match role {
            Role::RawMaterialSupplier => self.supplier_id,
            Role::Manufacturer => self.manufacturer_id,
            Role::Distributor => self.distributor_id,
            Role::Retailer => self.retailer_id,
        }
    }

    fn role_id_slot(&mut self, role: Role) -> &mut Option<u64> {
        match role {
            Role::RawMaterialSupplier => &mut self.supplier_id,
            Role::Manufacturer => &mut self.manufacturer_id,
            Role::Distributor => &mut self.distributor_id,
            Role::Retailer => &mut self.retailer_id,
        }
    }

    /// Check every precondition of `transition` for `actor` without mutating.
    ///
    /// Order: stage, then role, then sell policy. A stage mismatch is
    /// reported whoever the caller is.
    pub fn check(
        &self,
        transition: Transition,
        actor: &Actor,
        sell_policy: SellPolicy,
    ) -> Result<u64, ChainError> {
        if self.stage != transition.from() {
            return Err(ChainError::InvalidStage {
                id: self.id,
                operation: transition.wire_name().to_string(),
                expected: transition.from(),
                actual: self.stage,
            });
        }

        let required = transition.required_role();
        let unauthorized = |required: String| ChainError::Unauthorized {
            caller: actor.identity.to_string(),
            operation: transition.wire_name().to_string(),
            required,
        };
        let sequence = match (actor.role, actor.sequence) {
            (Some(role), Some(seq)) if role == required => seq,
            _ => return Err(unauthorized(format!("role {}", required))),
        };

        if transition == Transition::Sell
            && sell_policy == SellPolicy::RetailingRetailer
            && self.retailer_id != Some(sequence)
        {
            return Err(unauthorized(
                "the retailer that retailed this cold drink".to_string(),
            ));
        }

        if let Some(role) = transition.stamps() {
            if self.role_id(role).is_some() {
                return Err(ChainError::InvalidStage {
                    id: self.id,
                    operation: transition.wire_name().to_string(),
                    expected: transition.from(),
                    actual: self.stage,
                });
            }
        }

        Ok(sequence)
    }

    /// Apply `transition` on behalf of `actor`: advance one stage and stamp
    /// the actor's sequence number. Either everything changes or nothing does.
    pub fn apply(
        &mut self,
        transition: Transition,
        actor: &Actor,
        sell_policy: SellPolicy,
    ) -> Result<StageChange, ChainError> {
        let sequence = self.check(transition, actor, sell_policy)?;
        if let Some(role) = transition.stamps() {
            *self.role_id_slot(role) = Some(sequence);
        }
        let from = self.stage;
        self.stage = transition.to();
        Ok(StageChange {
            transition,
            from,
            to: self.stage,
            actor_sequence: sequence,
        })
    }
}
