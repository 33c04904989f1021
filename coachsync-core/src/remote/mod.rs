//! Remote store interface consumed by the action handlers

pub mod errors;
pub mod memory;
pub mod traits;

pub use errors::{RemoteError, RemoteResult};
pub use memory::{InMemoryRemoteStore, RemoteOp};
pub use traits::{
    MealDefinition, MealLog, RemoteStore, StoredMealLog, WeightRecord, WEIGHT_RECORD_TYPE,
};
