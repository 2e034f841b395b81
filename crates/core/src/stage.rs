use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChainError;

/// Custody stage of a cold drink. Codes are fixed and strictly ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created = 0,
    RawMaterialSupply = 1,
    Manufacture = 2,
    Distribution = 3,
    Retail = 4,
    Sold = 5,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Created,
        Stage::RawMaterialSupply,
        Stage::Manufacture,
        Stage::Distribution,
        Stage::Retail,
        Stage::Sold,
    ];

    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Result<Stage, ChainError> {
        Stage::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or_else(|| {
                ChainError::invalid_argument(format!("stage code {} is not in 0..=5", code))
            })
    }

    /// The stage directly after this one; `None` for the terminal stage.
    pub fn next(&self) -> Option<Stage> {
        Stage::from_code(self.code() + 1).ok()
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Created => "Created",
            Stage::RawMaterialSupply => "RawMaterialSupply",
            Stage::Manufacture => "Manufacture",
            Stage::Distribution => "Distribution",
            Stage::Retail => "Retail",
            Stage::Sold => "Sold",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Stage {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Stage::from_code(code);
        }
        let folded: String = trimmed
            .chars()
            .filter(|c| *c != '_')
            .flat_map(|c| c.to_lowercase())
            .collect();
        Stage::ALL
            .into_iter()
            .find(|st| st.name().to_lowercase() == folded)
            .ok_or_else(|| ChainError::invalid_argument(format!("unknown stage '{}'", trimmed)))
    }
}
