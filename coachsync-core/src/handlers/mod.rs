//! Action handlers
//!
//! One handler per [`ActionKind`](crate::model::ActionKind). Each turns an
//! offline action into remote writes and classifies failures so the sync
//! manager knows whether to keep, drop or quarantine the action.

pub mod add_custom_meal;
pub mod errors;
pub mod log_meal;
pub mod log_weight;
pub mod registry;
pub mod traits;

pub use add_custom_meal::AddCustomMealHandler;
pub use errors::{HandlerError, HandlerResult};
pub use log_meal::LogMealHandler;
pub use log_weight::LogWeightHandler;
pub use registry::HandlerRegistry;
pub use traits::{ActionHandler, ApplyOutcome};

use crate::model::{ActionKind, OfflineAction};

/// Error for an action routed to a handler of a different kind
pub(crate) fn wrong_payload(expected: ActionKind, action: &OfflineAction) -> HandlerError {
    HandlerError::Validation(format!(
        "action {} carries a {} payload, expected {}",
        action.id,
        action.kind(),
        expected
    ))
}
