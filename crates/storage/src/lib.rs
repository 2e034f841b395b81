pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStorage};
pub use record::{timestamp_now, ItemRecord, ParticipantRecord, TransitionRecord};
pub use traits::ChainStorage;
