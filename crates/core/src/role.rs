//! The closed set of supply chain roles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChainError;

/// Name reported by `checkRole` for an identity that holds no role.
pub const NO_ROLE: &str = "none";

/// A custody role. The discriminants are the codes clients send when
/// registering a participant; there is deliberately no code 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    RawMaterialSupplier = 1,
    Manufacturer = 2,
    Distributor = 3,
    Retailer = 4,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::RawMaterialSupplier,
        Role::Manufacturer,
        Role::Distributor,
        Role::Retailer,
    ];

    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Result<Role, ChainError> {
        Role::ALL
            .into_iter()
            .find(|r| r.code() == code)
            .ok_or_else(|| {
                ChainError::invalid_argument(format!("role code {} is not in 1..=4", code))
            })
    }

    /// Human-readable name, as returned by `checkRole`.
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::RawMaterialSupplier => "Raw Material Supplier",
            Role::Manufacturer => "Manufacturer",
            Role::Distributor => "Distributor",
            Role::Retailer => "Retailer",
        }
    }

    pub fn snake_name(&self) -> &'static str {
        match self {
            Role::RawMaterialSupplier => "raw_material_supplier",
            Role::Manufacturer => "manufacturer",
            Role::Distributor => "distributor",
            Role::Retailer => "retailer",
        }
    }
}

/// `checkRole` result: the role's display name, or `"none"`.
pub fn role_name(role: Option<Role>) -> &'static str {
    role.map(|r| r.display_name()).unwrap_or(NO_ROLE)
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Accepts the numeric code, the snake_case name, the display name, or
/// the variant name (all case-insensitive, whitespace and `_` ignored).
impl FromStr for Role {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Role::from_code(code);
        }
        let folded: String = trimmed
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(|c| c.to_lowercase())
            .collect();
        Role::ALL
            .into_iter()
            .find(|r| {
                let candidate: String = r
                    .snake_name()
                    .chars()
                    .filter(|c| *c != '_')
                    .collect();
                candidate == folded
            })
            .ok_or_else(|| ChainError::invalid_argument(format!("unknown role '{}'", trimmed)))
    }
}
