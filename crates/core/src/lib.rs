//! coldchain-core: the cold-drink custody state machine.
//!
//! Pure domain logic with no I/O: the closed [`Role`] set, the linear
//! [`Stage`] chain, the role-gated [`Transition`] table, the tracked
//! [`ColdDrink`], and the participant [`Registry`]. Storage backends and
//! the service layer build on these types; every host must apply
//! transitions through [`ColdDrink::apply`] so that the rules stay
//! identical everywhere.

pub mod error;
pub mod identity;
pub mod item;
pub mod policy;
pub mod registry;
pub mod role;
pub mod stage;
pub mod transition;

pub use error::{ChainError, ErrorKind};
pub use identity::Identity;
pub use item::{Actor, ColdDrink, ColdDrinkDraft, StageChange};
pub use policy::{ChainPolicy, ReRegistrationPolicy, SellPolicy};
pub use registry::{require_owner, Registry};
pub use role::{role_name, Role, NO_ROLE};
pub use stage::Stage;
pub use transition::Transition;
