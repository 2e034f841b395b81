//! Action space extraction: the transitions an identity can perform right now.

use coldchain_core::{Actor, ChainError, ColdDrink, Identity, Role, SellPolicy, Stage, Transition};
use serde::Serialize;

/// A transition the identity may apply to an item now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub item_id: u64,
    pub transition: Transition,
    pub from: Stage,
    pub to: Stage,
}

/// A transition that is the item's next step but that this identity may not perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedAction {
    pub item_id: u64,
    pub transition: Transition,
    pub reason: BlockedReason,
}

/// Why an action is blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum BlockedReason {
    RoleNotHeld { required: Role },
    /// Sale is restricted to the retailer stamped by `retailColdDrink`.
    NotRetailingRetailer,
}

/// The complete action space for one identity at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionSpace {
    pub identity: Identity,
    pub role: Option<Role>,
    pub actions: Vec<Action>,
    pub blocked: Vec<BlockedAction>,
    pub can_add_participants: bool,
    pub can_add_cold_drinks: bool,
}

/// Compute the action space of `actor` over `items`.
///
/// Pure function. Every item not yet sold contributes exactly one entry,
/// either an action or a blocked action, for the transition leaving its
/// current stage.
pub fn compute_action_space(
    actor: &Actor,
    items: &[ColdDrink],
    is_owner: bool,
    sell_policy: SellPolicy,
) -> ActionSpace {
    let mut actions = Vec::new();
    let mut blocked = Vec::new();

    for item in items {
        let Some(transition) = Transition::for_source(item.stage) else {
            continue;
        };
        match item.check(transition, actor, sell_policy) {
            Ok(_) => actions.push(Action {
                item_id: item.id,
                transition,
                from: transition.from(),
                to: transition.to(),
            }),
            Err(ChainError::Unauthorized { .. }) => {
                let required = transition.required_role();
                let reason = if actor.role == Some(required) {
                    BlockedReason::NotRetailingRetailer
                } else {
                    BlockedReason::RoleNotHeld { required }
                };
                blocked.push(BlockedAction {
                    item_id: item.id,
                    transition,
                    reason,
                });
            }
            // A stamped slot at the source stage cannot come out of the
            // state machine; there is nothing to offer.
            Err(_) => {}
        }
    }

    ActionSpace {
        identity: actor.identity.clone(),
        role: actor.role,
        actions,
        blocked,
        can_add_participants: is_owner,
        can_add_cold_drinks: is_owner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldchain_core::ColdDrinkDraft;

    fn item(id: u64, stage: Stage, retailer_id: Option<u64>) -> ColdDrink {
        let mut item = ColdDrink::new(id, ColdDrinkDraft::new("Cola", "fizzy", true)).unwrap();
        item.stage = stage;
        item.retailer_id = retailer_id;
        item
    }

    fn actor(role: Option<Role>, sequence: Option<u64>) -> Actor {
        Actor {
            identity: Identity::new("0xactor").unwrap(),
            role,
            sequence,
        }
    }

    #[test]
    fn manufacturer_sees_only_supplied_items() {
        let items = vec![
            item(1, Stage::Created, None),
            item(2, Stage::RawMaterialSupply, None),
            item(3, Stage::Sold, Some(1)),
        ];
        let space = compute_action_space(
            &actor(Some(Role::Manufacturer), Some(1)),
            &items,
            false,
            SellPolicy::AnyRetailer,
        );
        assert_eq!(space.actions.len(), 1);
        assert_eq!(space.actions[0].item_id, 2);
        assert_eq!(space.actions[0].transition, Transition::Manufacture);
        assert_eq!(
            space.blocked,
            vec![BlockedAction {
                item_id: 1,
                transition: Transition::SupplyRawMaterials,
                reason: BlockedReason::RoleNotHeld {
                    required: Role::RawMaterialSupplier
                },
            }]
        );
        assert!(!space.can_add_cold_drinks);
    }

    #[test]
    fn other_retailer_blocked_under_strict_sale() {
        let items = vec![item(1, Stage::Retail, Some(1))];
        let other = actor(Some(Role::Retailer), Some(2));
        let space = compute_action_space(&other, &items, false, SellPolicy::RetailingRetailer);
        assert!(space.actions.is_empty());
        assert_eq!(space.blocked[0].reason, BlockedReason::NotRetailingRetailer);

        let space = compute_action_space(&other, &items, false, SellPolicy::AnyRetailer);
        assert_eq!(space.actions.len(), 1);
    }

    #[test]
    fn unregistered_owner_can_only_administer() {
        let space = compute_action_space(
            &actor(None, None),
            &[item(1, Stage::Created, None)],
            true,
            SellPolicy::AnyRetailer,
        );
        assert!(space.actions.is_empty());
        assert_eq!(space.blocked.len(), 1);
        assert!(space.can_add_participants && space.can_add_cold_drinks);
        let json = serde_json::to_value(&space).unwrap();
        assert_eq!(json["blocked"][0]["reason"]["type"], "RoleNotHeld");
        assert_eq!(json["role"], serde_json::Value::Null);
    }
}
