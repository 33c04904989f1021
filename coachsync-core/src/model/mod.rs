//! Data model of the offline action queue

pub mod action;
pub mod types;

pub use action::{
    ActionKind, ActionPayload, AddCustomMealPayload, LogMealPayload, LogWeightPayload,
    OfflineAction, WeightUnit,
};
pub use types::{ActionId, MealId, MealPlanId, MealPlanItemId, UserId};
