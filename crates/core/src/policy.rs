//! Explicit answers to the two registration and sale questions the
//! chain leaves open. Both default to the permissive reading.

use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::identity::Identity;
use crate::role::Role;

/// What happens when the owner registers an identity that already holds a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReRegistrationPolicy {
    /// Last write wins.
    #[default]
    Overwrite,
    /// Re-granting the same role is a no-op; a different role is refused.
    Reject,
}

impl ReRegistrationPolicy {
    pub fn check(
        &self,
        identity: &Identity,
        existing: Option<Role>,
        requested: Role,
    ) -> Result<(), ChainError> {
        match (self, existing) {
            (ReRegistrationPolicy::Reject, Some(current)) if current != requested => {
                Err(ChainError::invalid_argument(format!(
                    "'{}' is already registered as {}",
                    identity, current
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Who may perform `sellColdDrink`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellPolicy {
    /// Any identity holding the Retailer role.
    #[default]
    AnyRetailer,
    /// Only the retailer whose sequence number was stamped by `retailColdDrink`.
    RetailingRetailer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChainPolicy {
    #[serde(default)]
    pub re_registration: ReRegistrationPolicy,
    #[serde(default)]
    pub sell: SellPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    #[test]
    fn overwrite_accepts_role_change() {
        let policy = ReRegistrationPolicy::Overwrite;
        assert!(policy
            .check(&id("0x1"), Some(Role::Manufacturer), Role::Retailer)
            .is_ok());
    }

    #[test]
    fn reject_refuses_only_a_different_role() {
        let policy = ReRegistrationPolicy::Reject;
        assert!(policy.check(&id("0x1"), None, Role::Retailer).is_ok());
        assert!(policy
            .check(&id("0x1"), Some(Role::Retailer), Role::Retailer)
            .is_ok());
        assert!(matches!(
            policy.check(&id("0x1"), Some(Role::Manufacturer), Role::Retailer),
            Err(ChainError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn policy_defaults_are_permissive() {
        let policy: ChainPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy.re_registration, ReRegistrationPolicy::Overwrite);
        assert_eq!(policy.sell, SellPolicy::AnyRetailer);
    }
}
