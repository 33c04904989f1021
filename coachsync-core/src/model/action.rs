//! Offline actions
//!
//! An [`OfflineAction`] is a recorded intent to mutate remote state, captured
//! locally so it can be applied later. The payload is a tagged variant whose
//! discriminant ([`ActionKind`]) selects the handler that applies it.

use super::types::{ActionId, MealId, MealPlanId, MealPlanItemId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant of an action payload, used as the handler registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    LogWeight,
    LogMeal,
    AddCustomMeal,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::LogWeight => "log_weight",
            ActionKind::LogMeal => "log_meal",
            ActionKind::AddCustomMeal => "add_custom_meal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "log_weight" => Some(ActionKind::LogWeight),
            "log_meal" => Some(ActionKind::LogMeal),
            "add_custom_meal" => Some(ActionKind::AddCustomMeal),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unit a weight entry was recorded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    Kg,
    Lb,
}

impl WeightUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightUnit::Kg => "kg",
            WeightUnit::Lb => "lb",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "kg" => Some(WeightUnit::Kg),
            "lb" | "lbs" => Some(WeightUnit::Lb),
            _ => None,
        }
    }
}

impl Default for WeightUnit {
    fn default() -> Self {
        WeightUnit::Kg
    }
}

/// Body weight measurement for a given calendar date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogWeightPayload {
    pub value: f64,
    #[serde(default)]
    pub unit: WeightUnit,
    pub date: NaiveDate,
}

/// Consumed / not-consumed toggle for a meal plan item
///
/// The day the log belongs to is not part of the payload: it is derived from
/// the action's `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMealPayload {
    pub meal_plan_id: MealPlanId,
    pub meal_plan_item_id: MealPlanItemId,
    pub meal_name: String,
    pub consumed: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub actual_time: Option<DateTime<Utc>>,
}

/// A user-defined meal to be created and linked into a meal plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddCustomMealPayload {
    pub meal_id: MealId,
    pub meal_plan_id: MealPlanId,
    pub name: String,
    #[serde(default)]
    pub calories: Option<u32>,
    #[serde(default)]
    pub protein_g: Option<f64>,
    #[serde(default)]
    pub carbs_g: Option<f64>,
    #[serde(default)]
    pub fat_g: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Kind-specific data of an offline action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ActionPayload {
    LogWeight(LogWeightPayload),
    LogMeal(LogMealPayload),
    AddCustomMeal(AddCustomMealPayload),
}

impl ActionPayload {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionPayload::LogWeight(_) => ActionKind::LogWeight,
            ActionPayload::LogMeal(_) => ActionKind::LogMeal,
            ActionPayload::AddCustomMeal(_) => ActionKind::AddCustomMeal,
        }
    }

    /// Check the payload is something the remote store could ever accept
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ActionPayload::LogWeight(p) => {
                if !p.value.is_finite() || p.value <= 0.0 {
                    return Err(format!("weight must be a positive number, got {}", p.value));
                }
            }
            ActionPayload::LogMeal(p) => {
                if p.meal_plan_item_id.as_str().is_empty() {
                    return Err("meal plan item id is empty".to_string());
                }
            }
            ActionPayload::AddCustomMeal(p) => {
                if p.name.trim().is_empty() {
                    return Err("custom meal name is empty".to_string());
                }
                if p.meal_id.as_str().is_empty() {
                    return Err("custom meal id is empty".to_string());
                }
            }
        }
        Ok(())
    }
}

/// A domain mutation recorded while offline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineAction {
    /// Stable idempotency key, generated once per logical operation
    pub id: ActionId,
    pub user_id: UserId,
    /// When the user performed the action; date-sensitive handlers use this,
    /// never the time of synchronization
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: Option<u32>,
    pub payload: ActionPayload,
}

impl OfflineAction {
    /// Record a new action with a fresh id, stamped with the current time
    pub fn new(user_id: UserId, payload: ActionPayload) -> Self {
        Self {
            id: ActionId::generate(),
            user_id,
            created_at: Utc::now(),
            retry_count: None,
            payload,
        }
    }

    pub fn log_weight(user_id: UserId, value: f64, unit: WeightUnit, date: NaiveDate) -> Self {
        Self::new(
            user_id,
            ActionPayload::LogWeight(LogWeightPayload { value, unit, date }),
        )
    }

    pub fn log_meal(user_id: UserId, payload: LogMealPayload) -> Self {
        Self::new(user_id, ActionPayload::LogMeal(payload))
    }

    pub fn add_custom_meal(user_id: UserId, payload: AddCustomMealPayload) -> Self {
        Self::new(user_id, ActionPayload::AddCustomMeal(payload))
    }

    /// Override the creation timestamp (e.g. when restoring a recorded action)
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Override the generated id
    pub fn with_id(mut self, id: ActionId) -> Self {
        self.id = id;
        self
    }

    pub fn kind(&self) -> ActionKind {
        self.payload.kind()
    }
}
