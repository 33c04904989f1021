//! Remote Store trait
//!
//! The handful of remote operations the action handlers need. The concrete
//! client (REST, database SDK, ...) lives outside this crate.

use super::errors::RemoteResult;
use crate::model::{ActionId, MealId, MealPlanId, MealPlanItemId, UserId, WeightUnit};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Record type stored for body weight measurements
pub const WEIGHT_RECORD_TYPE: &str = "weight";

/// Body measurement row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRecord {
    pub user_id: UserId,
    pub record_type: String,
    pub value: f64,
    pub unit: WeightUnit,
    pub date: NaiveDate,
    /// Id of the offline action that produced the row; unique remotely
    pub client_action_id: ActionId,
}

/// Meal log contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealLog {
    pub user_id: UserId,
    pub meal_plan_id: MealPlanId,
    pub meal_plan_item_id: MealPlanItemId,
    pub meal_name: String,
    /// Day bucket; together with user and item this is the existence key
    pub date: NaiveDate,
    pub consumed: bool,
    pub notes: Option<String>,
    pub actual_time: Option<DateTime<Utc>>,
}

/// Meal log together with its remote id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMealLog {
    pub id: String,
    pub log: MealLog,
}

/// Meal definition row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealDefinition {
    /// Primary key; for custom meals it is generated on the client
    pub id: MealId,
    pub owner_id: UserId,
    pub name: String,
    pub calories: Option<u32>,
    pub protein_g: Option<f64>,
    pub carbs_g: Option<f64>,
    pub fat_g: Option<f64>,
    pub notes: Option<String>,
    pub is_custom: bool,
}

/// Remote data store used by the action handlers
///
/// Writes to different entities are independent: nothing here is
/// transactional across calls.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Weight row written by the given action, if any
    async fn find_weight_by_client_id(&self, id: &ActionId) -> RemoteResult<Option<WeightRecord>>;

    /// Insert a weight row.
    ///
    /// Fails with `UniqueViolation` if a row with the same
    /// `client_action_id` exists.
    async fn insert_weight(&self, record: &WeightRecord) -> RemoteResult<()>;

    /// Meal log for (user, item, day), if any
    async fn find_meal_log(
        &self,
        user_id: &UserId,
        item_id: &MealPlanItemId,
        date: NaiveDate,
    ) -> RemoteResult<Option<StoredMealLog>>;

    /// Insert a meal log, returning its remote id
    ///
    /// At most one log exists per (user, item, day); a second insert is a
    /// `UniqueViolation`.
    async fn insert_meal_log(&self, log: &MealLog) -> RemoteResult<String>;

    /// Replace the contents of an existing meal log
    async fn update_meal_log(&self, id: &str, log: &MealLog) -> RemoteResult<()>;

    /// Delete a meal log. Deleting a missing log fails with `NotFound`.
    async fn delete_meal_log(&self, id: &str) -> RemoteResult<()>;

    /// Insert a meal definition.
    ///
    /// Fails with `UniqueViolation` if the id is taken.
    async fn insert_meal(&self, meal: &MealDefinition) -> RemoteResult<()>;

    /// Meal ids currently linked into a plan
    async fn plan_meal_ids(&self, plan_id: &MealPlanId) -> RemoteResult<Vec<MealId>>;

    /// Append a meal to a plan's membership list (no duplicate check)
    async fn add_meal_to_plan(&self, plan_id: &MealPlanId, meal_id: &MealId) -> RemoteResult<()>;
}
