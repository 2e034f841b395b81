//! The transition table: which role may move an item out of which stage.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::role::Role;
use crate::stage::Stage;

/// One arrow of the custody chain
/// `Created → RawMaterialSupply → Manufacture → Distribution → Retail → Sold`.
///
/// Serialized under the operation names clients invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Transition {
    #[serde(rename = "supplyRawMaterials")]
    SupplyRawMaterials,
    #[serde(rename = "manufactureColdDrink")]
    Manufacture,
    #[serde(rename = "distributeColdDrink")]
    Distribute,
    #[serde(rename = "retailColdDrink")]
    Retail,
    #[serde(rename = "sellColdDrink")]
    Sell,
}

impl Transition {
    pub const ALL: [Transition; 5] = [
        Transition::SupplyRawMaterials,
        Transition::Manufacture,
        Transition::Distribute,
        Transition::Retail,
        Transition::Sell,
    ];

    pub fn wire_name(&self) -> &'static str {
        match self {
            Transition::SupplyRawMaterials => "supplyRawMaterials",
            Transition::Manufacture => "manufactureColdDrink",
            Transition::Distribute => "distributeColdDrink",
            Transition::Retail => "retailColdDrink",
            Transition::Sell => "sellColdDrink",
        }
    }

    pub fn from_wire(name: &str) -> Option<Transition> {
        Transition::ALL.into_iter().find(|t| t.wire_name() == name)
    }

    /// Stage the item must be at for this transition to fire.
    pub fn from(&self) -> Stage {
        match self {
            Transition::SupplyRawMaterials => Stage::Created,
            Transition::Manufacture => Stage::RawMaterialSupply,
            Transition::Distribute => Stage::Manufacture,
            Transition::Retail => Stage::Distribution,
            Transition::Sell => Stage::Retail,
        }
    }

    pub fn to(&self) -> Stage {
        match self {
            Transition::SupplyRawMaterials => Stage::RawMaterialSupply,
            Transition::Manufacture => Stage::Manufacture,
            Transition::Distribute => Stage::Distribution,
            Transition::Retail => Stage::Retail,
            Transition::Sell => Stage::Sold,
        }
    }

    pub fn required_role(&self) -> Role {
        match self {
            Transition::SupplyRawMaterials => Role::RawMaterialSupplier,
            Transition::Manufacture => Role::Manufacturer,
            Transition::Distribute => Role::Distributor,
            Transition::Retail | Transition::Sell => Role::Retailer,
        }
    }

    /// The role whose id field this transition writes. `Sell` writes none.
    pub fn stamps(&self) -> Option<Role> {
        match self {
            Transition::Sell => None,
            other => Some(other.required_role()),
        }
    }

    /// The unique transition leaving `stage`, if any.
    pub fn for_source(stage: Stage) -> Option<Transition> {
        Transition::ALL.into_iter().find(|t| t.from() == stage)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}
